use super::{parse_field, Collector, Measured};
use crate::{
    agent::AgentContext,
    error::{CoreError, Result},
    model::{AgentKind, Reading, Series},
};
use regex::Regex;
use std::net::IpAddr;

const DEVICE_STATISTICS: &str = "LC_ALL=C sar -n DEV 1 1";
const ROUTING_TABLE: &str = "ip r";

/// Zero-based positions of rxkB/s and txkB/s in a `sar -n DEV` row.
const RX_FIELD: usize = 4;
const TX_FIELD: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Throughput {
    pub rx_kb: Measured,
    pub tx_kb: Measured,
}

/// Receive and transmit rates for `interface` from a `sar -n DEV` dump.
///
/// sar prints a sample row and an `Average:` row per interface; the last row
/// naming the interface wins.
pub fn parse_throughput(lines: &[String], interface: &str) -> Result<Throughput> {
    let mut found = None;

    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if !fields.contains(&interface) || fields.len() <= TX_FIELD {
            continue;
        }
        found = Some(Throughput {
            rx_kb: Measured::parse(fields[RX_FIELD], "rxkB/s")?,
            tx_kb: Measured::parse(fields[TX_FIELD], "txkB/s")?,
        });
    }

    found.ok_or_else(|| CoreError::parse(format!("no statistics for {interface}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub gateway: IpAddr,
    pub device_ip: IpAddr,
    pub metric: u32,
}

/// Default gateway, source address and metric of `interface` from `ip r`.
pub fn parse_route(lines: &[String], interface: &str) -> Result<Route> {
    let pattern = Regex::new(&format!(
        r"\bvia\s+(?P<gateway>\S+)\s+dev\s+{}\s.*?\bsrc\s+(?P<ip>\S+).*?\bmetric\s+(?P<metric>\d+)",
        regex::escape(interface)
    ))
    .map_err(|e| CoreError::parse(format!("bad interface name {interface:?}: {e}")))?;

    let caps = lines
        .iter()
        .find_map(|line| pattern.captures(line))
        .ok_or_else(|| CoreError::parse(format!("no route via {interface}")))?;

    Ok(Route {
        gateway: parse_field(&caps["gateway"], "gateway address")?,
        device_ip: parse_field(&caps["ip"], "device address")?,
        metric: parse_field(&caps["metric"], "route metric")?,
    })
}

pub struct NetworkThroughputCollector {
    interface: String,
}

impl NetworkThroughputCollector {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
        }
    }
}

impl Collector for NetworkThroughputCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::NetworkThroughput
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let lines = ctx.executor.execute(DEVICE_STATISTICS)?;
        let rates = parse_throughput(&lines, &self.interface)?;
        Ok(vec![
            rates.rx_kb.reading(Series::RxKb),
            rates.tx_kb.reading(Series::TxKb),
        ])
    }
}

pub struct NetworkIdentityCollector {
    interface: String,
}

impl NetworkIdentityCollector {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
        }
    }
}

impl Collector for NetworkIdentityCollector {
    fn kind(&self) -> AgentKind {
        AgentKind::NetworkIdentity
    }

    fn collect(&self, ctx: &AgentContext) -> Result<Vec<Reading>> {
        let lines = ctx.executor.execute(ROUTING_TABLE)?;
        let route = parse_route(&lines, &self.interface)?;
        Ok(vec![
            Reading::text(Series::GatewayIp, route.gateway),
            Reading::text(Series::DeviceIp, route.device_ip),
            Reading::number(Series::DeviceMetric, f64::from(route.metric)),
        ])
    }
}
