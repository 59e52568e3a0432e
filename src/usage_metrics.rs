//! CPU, memory and network figures derived from engine stats records.

pub mod sampler;
pub mod types;

pub use sampler::{derive, sample_to_payload};
pub use types::{RawSample, UsageMetrics, UsagePayload};
