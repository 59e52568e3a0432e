//! Remote Docker engine access: connection descriptors, the liveness probe
//! and the event sources behind the streaming endpoints.

pub mod descriptor;
pub mod prober;
pub mod sources;

pub use descriptor::{derive_endpoint, EngineDescriptor};
pub use prober::{EngineProber, PingProber};
pub use sources::{EventSource, OpenedSource};
