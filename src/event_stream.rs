//! Lazy `data: <json>\n\n` event streams over remote engine sources.

pub mod adapter;
pub mod frame;

pub use adapter::open;
pub use frame::{StreamFrame, StreamKind};
