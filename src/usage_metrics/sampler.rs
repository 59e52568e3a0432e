use serde_json::{json, Value};

use super::types::*;
use crate::error_handling::types::StreamError;

const MIB: u64 = 1024 * 1024;

impl RawSample {
    /// The sample immediately preceding this one, rebuilt from the
    /// `precpu_stats` snapshot the engine embeds in every record.
    pub fn previous(&self) -> RawSample {
        RawSample {
            cpu_stats: self.precpu_stats.clone(),
            ..RawSample::default()
        }
    }

    fn online_cpus(&self) -> u64 {
        match self.cpu_stats.online_cpus {
            Some(n) => n,
            None => self
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map_or(0, |per_cpu| per_cpu.len() as u64),
        }
    }
}

fn delta(current: Option<u64>, previous: Option<u64>) -> i128 {
    current.unwrap_or(0) as i128 - previous.unwrap_or(0) as i128
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure function of two consecutive samples. Percentages are never
/// negative: a counter reset or an empty interval yields `0.0`.
pub fn derive(current: &RawSample, previous: &RawSample) -> UsageMetrics {
    let cpu_delta = delta(
        current.cpu_stats.cpu_usage.total_usage,
        previous.cpu_stats.cpu_usage.total_usage,
    );
    let system_delta = delta(
        current.cpu_stats.system_cpu_usage,
        previous.cpu_stats.system_cpu_usage,
    );

    let mut cpu_percent = 0.0;
    if cpu_delta > 0 && system_delta > 0 {
        let online = current.online_cpus();
        if online > 0 {
            cpu_percent = (cpu_delta as f64 / system_delta as f64) * online as f64 * 100.0;
        }
    }

    let usage = current.memory_stats.usage.unwrap_or(0);
    let limit = current.memory_stats.limit.unwrap_or(0);
    let memory_percent = if limit > 0 {
        (usage as f64 / limit as f64) * 100.0
    } else {
        0.0
    };

    let network = current
        .networks
        .iter()
        .flatten()
        .map(|(name, stats)| {
            (
                name.clone(),
                NetworkCounters {
                    rx: stats.rx_bytes,
                    tx: stats.tx_bytes,
                },
            )
        })
        .collect();

    UsageMetrics {
        cpu_percent,
        memory_percent,
        memory_usage_mb: usage / MIB,
        memory_limit_mb: limit / MIB,
        network,
    }
}

impl UsagePayload {
    pub fn from_sample(sample: &RawSample) -> Self {
        let metrics = derive(sample, &sample.previous());
        let block_io = match &sample.blkio_stats {
            Value::Null => json!({}),
            other => other.clone(),
        };

        UsagePayload {
            timestamp: sample.read.clone(),
            cpu_percent: round2(metrics.cpu_percent),
            memory_mb: MemoryPayload {
                usage: metrics.memory_usage_mb,
                limit: metrics.memory_limit_mb,
                percent: round2(metrics.memory_percent),
            },
            network: metrics.network,
            block_io,
            pids: sample.pids_stats.current.unwrap_or(0),
        }
    }
}

/// Converts one raw engine stats record into the client payload.
pub fn sample_to_payload(raw: Value) -> Result<Value, StreamError> {
    let sample: RawSample =
        serde_json::from_value(raw).map_err(|e| StreamError::Malformed(e.to_string()))?;
    serde_json::to_value(UsagePayload::from_sample(&sample))
        .map_err(|e| StreamError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(total: u64, system: u64, online: Option<u64>) -> CpuStats {
        CpuStats {
            cpu_usage: CpuUsage {
                total_usage: Some(total),
                percpu_usage: None,
            },
            system_cpu_usage: Some(system),
            online_cpus: online,
        }
    }

    fn sample(current: CpuStats, previous: CpuStats) -> RawSample {
        RawSample {
            cpu_stats: current,
            precpu_stats: previous,
            ..RawSample::default()
        }
    }

    #[test]
    fn two_cpus_half_of_interval_is_one_hundred_percent() {
        let current = sample(cpu(1000, 5000, Some(2)), CpuStats::default());
        let previous = sample(cpu(900, 4800, None), CpuStats::default());

        let metrics = derive(&current, &previous);
        assert_eq!(metrics.cpu_percent, 100.0);
    }

    #[test]
    fn counter_reset_gives_zero_not_negative() {
        let current = sample(cpu(100, 5000, Some(4)), CpuStats::default());
        let previous = sample(cpu(900, 4800, Some(4)), CpuStats::default());
        assert_eq!(derive(&current, &previous).cpu_percent, 0.0);

        let stalled = sample(cpu(1000, 4800, Some(4)), CpuStats::default());
        assert_eq!(derive(&stalled, &previous).cpu_percent, 0.0);
    }

    #[test]
    fn online_cpus_falls_back_to_per_core_counters() {
        let mut current = cpu(1000, 5000, None);
        current.cpu_usage.percpu_usage = Some(vec![250, 250, 250, 250]);
        let raw = sample(current, cpu(900, 4800, None));

        let metrics = derive(&raw, &raw.previous());
        assert_eq!(metrics.cpu_percent, 200.0);
    }

    #[test]
    fn zero_memory_limit_gives_zero_percent() {
        let mut raw = RawSample::default();
        raw.memory_stats.usage = Some(64 * MIB);
        raw.memory_stats.limit = Some(0);

        let metrics = derive(&raw, &raw.previous());
        assert_eq!(metrics.memory_percent, 0.0);
        assert_eq!(metrics.memory_usage_mb, 64);
    }

    #[test]
    fn engine_record_becomes_client_payload() {
        let raw = json!({
            "read": "2024-05-01T10:00:00.000000000Z",
            "pids_stats": { "current": 7 },
            "networks": { "eth0": { "rx_bytes": 1200, "tx_bytes": 800, "rx_packets": 3 } },
            "blkio_stats": { "io_service_bytes_recursive": null },
            "cpu_stats": {
                "cpu_usage": { "total_usage": 1000, "percpu_usage": null },
                "system_cpu_usage": 5000,
                "online_cpus": 2
            },
            "precpu_stats": {
                "cpu_usage": { "total_usage": 900 },
                "system_cpu_usage": 4800
            },
            "memory_stats": { "usage": 157286400u64, "limit": 1073741824u64 }
        });

        let payload = sample_to_payload(raw).unwrap();
        assert_eq!(payload["timestamp"], "2024-05-01T10:00:00.000000000Z");
        assert_eq!(payload["cpu_percent"], 100.0);
        assert_eq!(payload["memory_mb"]["usage"], 150);
        assert_eq!(payload["memory_mb"]["limit"], 1024);
        assert_eq!(payload["memory_mb"]["percent"], 14.65);
        assert_eq!(payload["network"]["eth0"], json!({ "rx": 1200, "tx": 800 }));
        assert_eq!(payload["pids"], 7);
    }

    #[test]
    fn first_sample_without_counters_is_all_zero() {
        let payload = sample_to_payload(json!({ "precpu_stats": {}, "memory_stats": {} })).unwrap();
        assert_eq!(payload["cpu_percent"], 0.0);
        assert_eq!(payload["memory_mb"]["percent"], 0.0);
        assert_eq!(payload["block_io"], json!({}));
        assert_eq!(payload["network"], json!({}));
        assert_eq!(payload["pids"], 0);
    }

    #[test]
    fn non_object_record_is_malformed() {
        let result = sample_to_payload(json!("not a sample"));
        assert!(matches!(result, Err(StreamError::Malformed(_))));
    }
}
