use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A monitored device, identified by its transport handle name
/// (e.g. `txpaa1` for `/dev/txpaa1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(String);

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Filesystem path of the device handle.
    ///
    /// Absolute names are used verbatim; anything else is looked up under
    /// `device_dir`.
    pub fn path_in(&self, device_dir: &Path) -> PathBuf {
        let own = Path::new(&self.0);
        if own.is_absolute() {
            own.to_path_buf()
        } else {
            device_dir.join(own)
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_name_joins_device_dir() {
        let device = Device::new("txpaa1");
        assert_eq!(device.path_in(Path::new("/dev")), PathBuf::from("/dev/txpaa1"));
    }

    #[test]
    fn absolute_name_is_used_verbatim() {
        let device = Device::new("/dev/serial/by-id/usb-amp-0");
        assert_eq!(
            device.path_in(Path::new("/dev")),
            PathBuf::from("/dev/serial/by-id/usb-amp-0")
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Device::new("txpaa2")).expect("serialize");
        assert_eq!(json, "\"txpaa2\"");
    }
}
