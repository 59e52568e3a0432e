//! On-disk TLS credential bundles, one directory per session.

pub mod cert_store;
pub mod types;

pub use cert_store::CertificateStore;
pub use types::{BundlePaths, CertificateMaterial};
