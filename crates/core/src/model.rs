use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp layout written into every sample, local wall-clock time.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Every series the collector knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Series {
    Temperature,
    ProcessorVoltage,
    FreqArm,
    FreqCore,
    CpuLoad,
    MemoryLoad,
    Throttle,
    RxKb,
    TxKb,
    GatewayIp,
    DeviceIp,
    DeviceMetric,
    AllSpace,
    UsedSpace,
    AvailableSpace,
    DiskSpaceUsage,
    Power,
}

impl Series {
    pub const ALL: [Series; 17] = [
        Series::Temperature,
        Series::ProcessorVoltage,
        Series::FreqArm,
        Series::FreqCore,
        Series::CpuLoad,
        Series::MemoryLoad,
        Series::Throttle,
        Series::RxKb,
        Series::TxKb,
        Series::GatewayIp,
        Series::DeviceIp,
        Series::DeviceMetric,
        Series::AllSpace,
        Series::UsedSpace,
        Series::AvailableSpace,
        Series::DiskSpaceUsage,
        Series::Power,
    ];

    /// Key of the series in the persisted document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temp",
            Self::ProcessorVoltage => "processor_voltage",
            Self::FreqArm => "freq_arm",
            Self::FreqCore => "freq_core",
            Self::CpuLoad => "cpu_load",
            Self::MemoryLoad => "memory_load",
            Self::Throttle => "throttle",
            Self::RxKb => "rxkB",
            Self::TxKb => "txkB",
            Self::GatewayIp => "gateway_ip",
            Self::DeviceIp => "device_ip",
            Self::DeviceMetric => "device_metric",
            Self::AllSpace => "all_space",
            Self::UsedSpace => "used_space",
            Self::AvailableSpace => "available_space",
            Self::DiskSpaceUsage => "disk_space_usage",
            Self::Power => "power",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub time: String,
    pub value: String,
}

impl Sample {
    pub fn new<T: Into<String>, V: Into<String>>(time: T, value: V) -> Self {
        Self {
            time: time.into(),
            value: value.into(),
        }
    }

    /// Sample stamped with the current local time
    pub fn now<V: Into<String>>(value: V) -> Self {
        Self::new(Local::now().format(TIME_FORMAT).to_string(), value)
    }
}

/// Complete persisted state of all series at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    series: BTreeMap<String, Vec<Sample>>,
}

impl Snapshot {
    /// Snapshot with every known series present and empty
    pub fn empty() -> Self {
        let series = Series::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), Vec::new()))
            .collect();
        Self { series }
    }

    pub fn push(&mut self, series: Series, sample: Sample) {
        self.series
            .entry(series.as_str().to_string())
            .or_default()
            .push(sample);
    }

    pub fn series(&self, series: Series) -> &[Sample] {
        self.get(series.as_str())
    }

    /// Lookup by raw key, for documents that carry series this build does not know.
    pub fn get(&self, name: &str) -> &[Sample] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, series: Series) -> Option<&Sample> {
        self.series(series).last()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn total_samples(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

/// Metric families, one agent each
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Temperature,
    ProcessorVoltage,
    SystemLoad,
    ProcessorParameters,
    Power,
    NetworkIdentity,
    NetworkThroughput,
    DiskUsage,
}

impl AgentKind {
    pub const ALL: [AgentKind; 8] = [
        AgentKind::Temperature,
        AgentKind::ProcessorVoltage,
        AgentKind::SystemLoad,
        AgentKind::ProcessorParameters,
        AgentKind::Power,
        AgentKind::NetworkIdentity,
        AgentKind::NetworkThroughput,
        AgentKind::DiskUsage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::ProcessorVoltage => "processor_voltage",
            Self::SystemLoad => "system_load",
            Self::ProcessorParameters => "processor_parameters",
            Self::Power => "power",
            Self::NetworkIdentity => "network_identity",
            Self::NetworkThroughput => "network_throughput",
            Self::DiskUsage => "disk_usage",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value produced by one agent cycle, before it is stamped and stored
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub series: Series,
    pub value: String,
    /// Numeric form, published to the latest-values table when present.
    pub numeric: Option<f64>,
}

impl Reading {
    pub fn number(series: Series, value: f64) -> Self {
        Self {
            series,
            value: value.to_string(),
            numeric: Some(value),
        }
    }

    /// A number kept exactly as the tool printed it.
    pub fn measured(series: Series, raw: impl Into<String>, value: f64) -> Self {
        Self {
            series,
            value: raw.into(),
            numeric: Some(value),
        }
    }

    pub fn text<V: ToString>(series: Series, value: V) -> Self {
        Self {
            series,
            value: value.to_string(),
            numeric: None,
        }
    }
}
