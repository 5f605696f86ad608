use serde::{Deserialize, Serialize};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    enumerate::DeviceSignature,
    error::{Error, Result},
    frame::{RequestFrame, MAX_RESPONSE_LEN},
};

/// Everything the protocol client needs to know about the mouse.
///
/// Fixed for the life of the process once loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProtocolConfig {
    pub signature: DeviceSignature,
    pub request: RequestFrame,
    /// Hex tag that a battery reply must contain
    pub marker: String,
    /// Byte offset of the battery value in the reply
    pub value_offset: usize,
    /// Maximum number of bytes read back per poll
    pub read_len: usize,
    pub read_timeout_ms: Option<u64>,
    pub sysfs_class_dir: PathBuf,
    pub dev_dir: PathBuf,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            signature: DeviceSignature::default(),
            request: RequestFrame::BATTERY,
            marker: "5102".to_string(),
            value_offset: 66,
            read_len: 128,
            read_timeout_ms: None,
            sysfs_class_dir: PathBuf::from("/sys/class/hidraw"),
            dev_dir: PathBuf::from("/dev"),
        }
    }
}

impl ProtocolConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn from_json(path: &Path, json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|err| Error::Config {
            path: path.to_owned(),
            message: err.to_string(),
        })?;

        if !(1..=MAX_RESPONSE_LEN).contains(&config.read_len) {
            return Err(Error::Config {
                path: path.to_owned(),
                message: format!("read-len must be within 1..={}", MAX_RESPONSE_LEN),
            });
        }
        if config.value_offset >= MAX_RESPONSE_LEN {
            return Err(Error::Config {
                path: path.to_owned(),
                message: format!("value-offset must be below {}", MAX_RESPONSE_LEN),
            });
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|err| Error::Config {
            path: path.to_owned(),
            message: err.to_string(),
        })?;
        Self::from_json(path, &json)
    }

    /// Load `path` if given, else the per-user config file if it exists,
    /// else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(json) => Self::from_json(&path, &json),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
                Err(err) => Err(Error::Config {
                    path,
                    message: err.to_string(),
                }),
            },
            None => Ok(Self::default()),
        }
    }
}

fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
        Some(dir.into())
    } else if let Ok(dir) = env::var("HOME") {
        let mut path = PathBuf::from(dir);
        path.push(".config");
        Some(path)
    } else {
        None
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let mut path = config_dir()?;
    path.push("hyperx-battery");
    path.push("config.json");
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        let config = ProtocolConfig::from_json(Path::new("test.json"), "{}").unwrap();
        assert_eq!(config, ProtocolConfig::default());
        assert_eq!(config.read_timeout(), None);
    }

    #[test]
    fn partial_override() {
        let json = r#"{
            "signature": { "hid-id": "000003F0:0000048E", "interface": "input3" },
            "value-offset": 8,
            "read-timeout-ms": 3000
        }"#;
        let config = ProtocolConfig::from_json(Path::new("test.json"), json).unwrap();
        assert_eq!(config.signature.hid_id, "000003F0:0000048E");
        assert_eq!(config.signature.interface, "input3");
        assert_eq!(config.value_offset, 8);
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.marker, "5102");
        assert_eq!(config.request, RequestFrame::BATTERY);
    }

    #[test]
    fn rejects_short_request() {
        let err = ProtocolConfig::from_json(Path::new("test.json"), r#"{ "request": "5002" }"#)
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn rejects_out_of_bounds_lengths() {
        for json in [
            r#"{ "value-offset": 18446744073709551615 }"#,
            r#"{ "value-offset": 128 }"#,
            r#"{ "read-len": 0 }"#,
            r#"{ "read-len": 4096 }"#,
        ] {
            let err = ProtocolConfig::from_json(Path::new("test.json"), json).unwrap_err();
            assert!(matches!(err, Error::Config { .. }), "{}: {:?}", json, err);
        }
        let config =
            ProtocolConfig::from_json(Path::new("test.json"), r#"{ "read-len": 128 }"#).unwrap();
        assert_eq!(config.read_len, 128);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::Builder::new()
            .prefix("hyperx-test-")
            .tempdir()
            .unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "marker": "5103" }"#).unwrap();
        assert_eq!(ProtocolConfig::load(&path).unwrap().marker, "5103");
        assert!(ProtocolConfig::load(&tmp.path().join("missing.json")).is_err());
    }
}
