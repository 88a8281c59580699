use super::{parse_field, Collector};
use crate::{
    agent::AgentContext,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use once_cell::sync::Lazy;
use regex::Regex;

const PROCESS_LISTING: &str = "LC_ALL=C ps aux";

/// Summed per-process CPU% is capped here; on multi-core hosts it legitimately exceeds 100.
pub const MAX_CPU_LOAD: f64 = 100.0;

// USER PID %CPU %MEM ...
static PROCESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\S+\s+\d+\s+(?P<cpu>\d+(?:\.\d+)?)\s+(?P<mem>\d+(?:\.\d+)?)\s")
        .expect("ps line pattern")
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemLoad {
    /// Sum of %CPU over all processes, at most [`MAX_CPU_LOAD`]
    pub cpu: f64,
    /// Sum of %MEM over all processes, not capped
    pub memory: f64,
}

/// Sum the `%CPU` and `%MEM` columns of a `ps aux` listing.
///
/// The header and anything else that is not a process line is ignored. A
/// listing without a single process line is a parse error.
pub fn parse_process_load(lines: &[String]) -> Result<SystemLoad> {
    let mut cpu = 0.0;
    let mut memory = 0.0;
    let mut processes = 0usize;

    for line in lines {
        let Some(caps) = PROCESS_LINE.captures(line) else {
            continue;
        };
        cpu += parse_field::<f64>(&caps["cpu"], "%CPU")?;
        memory += parse_field::<f64>(&caps["mem"], "%MEM")?;
        processes += 1;
    }

    if processes == 0 {
        return Err(CoreError::parse("process listing contains no processes"));
    }

    Ok(SystemLoad {
        cpu: round2(cpu.min(MAX_CPU_LOAD)),
        memory: round2(memory),
    })
}

// Sums of two-decimal columns pick up float noise such as 14.600000000000001.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct SystemLoadCollector;

impl Collector for SystemLoadCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::SystemLoad
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let lines = ctx.executor.execute(PROCESS_LISTING)?;
        let load = parse_process_load(&lines)?;
        Ok(vec![
            Reading::number(Series::CpuLoad, load.cpu),
            Reading::number(Series::MemoryLoad, load.memory),
        ])
    }
}
