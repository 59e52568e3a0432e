use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One engine statistics record, as much of it as the sampler reads.
///
/// The engine omits or nulls several counters (first sample, cgroup v2),
/// so everything is optional and defaults to zero.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RawSample {
    pub read: Option<String>,
    pub cpu_stats: CpuStats,
    pub precpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
    pub networks: Option<BTreeMap<String, NetworkStats>>,
    pub blkio_stats: Value,
    pub pids_stats: PidsStats,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CpuUsage {
    pub total_usage: Option<u64>,
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct PidsStats {
    pub current: Option<u64>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkCounters {
    pub rx: u64,
    pub tx: u64,
}

/// Figures derived from two consecutive samples.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_usage_mb: u64,
    pub memory_limit_mb: u64,
    pub network: BTreeMap<String, NetworkCounters>,
}

/// JSON payload of one usage frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UsagePayload {
    pub timestamp: Option<String>,
    pub cpu_percent: f64,
    pub memory_mb: MemoryPayload,
    pub network: BTreeMap<String, NetworkCounters>,
    pub block_io: Value,
    pub pids: u64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MemoryPayload {
    pub usage: u64,
    pub limit: u64,
    pub percent: f64,
}
