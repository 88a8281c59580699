use super::{parse_field, Collector};
use crate::{
    agent::AgentContext,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

const MEASURE_CLOCK_ARM: &str = "vcgencmd measure_clock arm";
const MEASURE_CLOCK_CORE: &str = "vcgencmd measure_clock core";
const GET_THROTTLED: &str = "vcgencmd get_throttled";

static CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r".*=(?P<freq>\d+)").expect("clock pattern"));
static HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0[xX](?P<bits>[0-9a-fA-F]+)").expect("hex pattern"));

/// Clock frequency in Hz from `frequency(48)=1500398464`.
pub fn parse_clock(output: &str) -> Result<u64> {
    let caps = CLOCK
        .captures(output)
        .ok_or_else(|| CoreError::parse(format!("no clock frequency in {output:?}")))?;
    parse_field(&caps["freq"], "clock frequency")
}

/// Throttling flags reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleFlags(pub u64);

impl ThrottleFlags {
    pub fn under_voltage(self) -> bool {
        self.0 & 0x1 != 0
    }

    pub fn throttled(self) -> bool {
        self.0 & 0x4 != 0
    }
}

impl fmt::Display for ThrottleFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Throttle bit field from `throttled=0x50005`.
pub fn parse_throttle(output: &str) -> Result<ThrottleFlags> {
    let caps = HEX
        .captures(output)
        .ok_or_else(|| CoreError::parse(format!("no throttle flags in {output:?}")))?;
    u64::from_str_radix(&caps["bits"], 16)
        .map(ThrottleFlags)
        .map_err(|e| CoreError::parse(format!("bad throttle flags {:?}: {e}", &caps[0])))
}

/// ARM and core clocks plus throttle flags. All three commands must succeed
/// for the cycle to produce anything.
pub struct ProcessorCollector;

impl Collector for ProcessorCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::ProcessorParameters
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let arm = parse_clock(&ctx.executor.execute_joined(MEASURE_CLOCK_ARM)?)?;
        let core = parse_clock(&ctx.executor.execute_joined(MEASURE_CLOCK_CORE)?)?;
        let throttle = parse_throttle(&ctx.executor.execute_joined(GET_THROTTLED)?)?;

        Ok(vec![
            Reading::number(Series::FreqArm, arm as f64),
            Reading::number(Series::FreqCore, core as f64),
            Reading::text(Series::Throttle, throttle),
        ])
    }
}
