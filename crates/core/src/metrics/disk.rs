use super::{parse_field, Collector};
use crate::{
    agent::AgentContext,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use once_cell::sync::Lazy;
use regex::Regex;

const DISK_USAGE: &str = "LC_ALL=C df --total";

static TOTAL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^total\s+(?P<all>\d+)\s+(?P<used>\d+)\s+(?P<avail>\d+)\s+(?P<pct>\d+)%")
        .expect("df total pattern")
});

/// Aggregate usage over all mounted filesystems, in 1K blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub all: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: u8,
}

/// Parse the `total` row that `df --total` prints last.
pub fn parse_disk_usage(lines: &[String]) -> Result<DiskUsage> {
    let caps = lines
        .iter()
        .rev()
        .find_map(|line| TOTAL_LINE.captures(line))
        .ok_or_else(|| CoreError::parse("df output has no total row"))?;

    Ok(DiskUsage {
        all: parse_field(&caps["all"], "total blocks")?,
        used: parse_field(&caps["used"], "used blocks")?,
        available: parse_field(&caps["avail"], "available blocks")?,
        usage_percent: parse_field(&caps["pct"], "usage percentage")?,
    })
}

pub struct DiskCollector;

impl Collector for DiskCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::DiskUsage
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let lines = ctx.executor.execute(DISK_USAGE)?;
        let usage = parse_disk_usage(&lines)?;
        Ok(vec![
            Reading::number(Series::AllSpace, usage.all as f64),
            Reading::number(Series::UsedSpace, usage.used as f64),
            Reading::number(Series::AvailableSpace, usage.available as f64),
            Reading::number(Series::DiskSpaceUsage, f64::from(usage.usage_percent)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_total_row() {
        let lines: Vec<String> = [
            "Filesystem     1K-blocks    Used Available Use% Mounted on",
            "/dev/root        1000000  400000    600000  40% /",
            "total            1000000  400000    600000  40% -",
        ]
        .iter()
        .map(|l| l.to_string())
        .collect();

        let usage = parse_disk_usage(&lines).unwrap();
        assert_eq!(
            usage,
            DiskUsage {
                all: 1_000_000,
                used: 400_000,
                available: 600_000,
                usage_percent: 40,
            }
        );
    }

    #[test]
    fn plain_df_without_total_fails() {
        let lines = vec!["/dev/root 1000 400 600 40% /".to_string()];
        assert!(matches!(parse_disk_usage(&lines), Err(CoreError::Parse(_))));
    }
}
