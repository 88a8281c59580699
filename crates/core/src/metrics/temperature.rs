use super::{first_float, Collector, Measured};
use crate::{
    agent::AgentContext,
    error::Result,
    model::{AgentKind, Reading, Series},
};

const MEASURE_TEMP: &str = "vcgencmd measure_temp";
const MEASURE_VOLTS: &str = "vcgencmd measure_volts";

/// SoC temperature in °C from `temp=48.3'C`.
pub fn parse_temperature(output: &str) -> Result<Measured> {
    first_float(output, "temperature")
}

/// Core voltage in V from `volt=1.2000V`.
pub fn parse_voltage(output: &str) -> Result<Measured> {
    first_float(output, "voltage")
}

pub struct TemperatureCollector;

impl Collector for TemperatureCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::Temperature
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let output = ctx.executor.execute_joined(MEASURE_TEMP)?;
        let temp = parse_temperature(&output)?;
        Ok(vec![temp.reading(Series::Temperature)])
    }
}

pub struct VoltageCollector;

impl Collector for VoltageCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::ProcessorVoltage
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let output = ctx.executor.execute_joined(MEASURE_VOLTS)?;
        let volts = parse_voltage(&output)?;
        Ok(vec![volts.reading(Series::ProcessorVoltage)])
    }
}
