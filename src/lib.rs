pub mod certificate_store;
pub mod configuration;
pub mod container_engine;
pub mod controller;
pub mod error_handling;
pub mod event_stream;
pub mod session_management;
pub mod terminal;
pub mod usage_metrics;
pub mod web_interface;

pub use controller::Controller;
