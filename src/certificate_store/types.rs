use std::fmt;
use std::path::{Path, PathBuf};

pub const CA_FILE: &str = "ca.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// PEM text supplied by the user when connecting in encrypted mode.
#[derive(Clone, PartialEq)]
pub struct CertificateMaterial {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("ca_cert", &format_args!("<{} bytes>", self.ca_cert.len()))
            .field("client_cert", &format_args!("<{} bytes>", self.client_cert.len()))
            .field("client_key", &"<redacted>")
            .finish()
    }
}

/// Location of a complete bundle on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    pub dir: PathBuf,
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl BundlePaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ca: dir.join(CA_FILE),
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        }
    }

    /// File name and path of each artifact, in write order.
    pub fn files(&self) -> [(&'static str, &Path); 3] {
        [
            (CA_FILE, self.ca.as_path()),
            (CERT_FILE, self.cert.as_path()),
            (KEY_FILE, self.key.as_path()),
        ]
    }
}
