use super::Collector;
use crate::{
    agent::AgentContext,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use tracing::debug;

/// Readings the estimate is derived from, in formula order.
pub const POWER_INPUTS: [Series; 3] = [Series::Temperature, Series::CpuLoad, Series::MemoryLoad];

/// Estimated board draw in mW from temperature (°C) and CPU/memory load (%).
pub fn power_milliwatts(temp: f64, cpu_load: f64, mem_load: f64) -> f64 {
    1000.0 * (0.5 + 0.001 * temp + 0.0013 * cpu_load + 0.0005 * mem_load)
}

/// Derived power estimate. Runs no command of its own.
pub struct PowerCollector;

impl Collector for PowerCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::Power
    }

    fn prepare(&self, ctx: &AgentContext) -> bool {
        debug!("waiting for temperature and load readings");
        ctx.latest.wait_for(&POWER_INPUTS, &ctx.shutdown).is_some()
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let inputs = ctx
            .latest
            .get_all(&POWER_INPUTS)
            .ok_or_else(|| CoreError::parse("power inputs have not been sampled yet"))?;

        let power = power_milliwatts(inputs[0], inputs[1], inputs[2]);
        Ok(vec![Reading {
            series: Series::Power,
            value: format!("{power:.1}"),
            numeric: Some(power),
        }])
    }
}
