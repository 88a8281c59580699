pub mod disk;
pub mod load;
pub mod network;
pub mod power;
pub mod processor;
pub mod temperature;

pub use disk::DiskCollector;
pub use load::SystemLoadCollector;
pub use network::{NetworkIdentityCollector, NetworkThroughputCollector};
pub use power::PowerCollector;
pub use processor::ProcessorCollector;
pub use temperature::{TemperatureCollector, VoltageCollector};

use crate::{
    agent::AgentContext,
    config::Config,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

/// One metric family: how to obtain this cycle's readings.
pub trait Collector: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Runs once before the first cycle. Returning `false` stops the agent.
    fn prepare(&self, _ctx: &AgentContext) -> bool {
        true
    }

    /// Execute, parse, and return the readings for one cycle.
    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>>;
}

/// Build the collector for one agent.
pub fn collector_for(kind: AgentKind, config: &Config) -> Box<dyn Collector> {
    match kind {
        AgentKind::Temperature => Box::new(TemperatureCollector),
        AgentKind::ProcessorVoltage => Box::new(VoltageCollector),
        AgentKind::SystemLoad => Box::new(SystemLoadCollector),
        AgentKind::ProcessorParameters => Box::new(ProcessorCollector),
        AgentKind::Power => Box::new(PowerCollector),
        AgentKind::NetworkIdentity => {
            Box::new(NetworkIdentityCollector::new(&config.network_interface))
        }
        AgentKind::NetworkThroughput => {
            Box::new(NetworkThroughputCollector::new(&config.network_interface))
        }
        AgentKind::DiskUsage => Box::new(DiskCollector),
    }
}

/// A number together with the text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Measured {
    pub raw: String,
    pub value: f64,
}

impl Measured {
    pub(crate) fn parse(raw: &str, what: &str) -> Result<Self> {
        Ok(Self {
            raw: raw.to_string(),
            value: parse_field(raw, what)?,
        })
    }

    pub fn reading(&self, series: Series) -> Reading {
        Reading::measured(series, self.raw.clone(), self.value)
    }
}

static FLOAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+").expect("float pattern"));

/// First decimal number in `output`, as printed by `vcgencmd measure_*`.
pub(crate) fn first_float(output: &str, what: &str) -> Result<Measured> {
    let token = FLOAT
        .find(output)
        .ok_or_else(|| CoreError::parse(format!("no {what} in {output:?}")))?;
    Measured::parse(token.as_str(), what)
}

pub(crate) fn parse_field<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| CoreError::parse(format!("{what} is not a number: {raw:?}")))
}
