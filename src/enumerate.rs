use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const HYPERX_HID_ID: &str = "000003F0:00000F98";
const HYPERX_INTERFACE: &str = "input2";

/// Identifies the HID node to talk to.
///
/// Both strings are matched as plain substrings of the device's uevent text,
/// `hid_id` against `HID_ID=` and `interface` against `HID_PHYS=`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceSignature {
    pub hid_id: String,
    pub interface: String,
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self {
            hid_id: HYPERX_HID_ID.to_string(),
            interface: HYPERX_INTERFACE.to_string(),
        }
    }
}

impl DeviceSignature {
    pub fn matches(&self, metadata: &str) -> bool {
        metadata.contains(&self.hid_id) && metadata.contains(&self.interface)
    }
}

/// One hidraw node seen during a scan
#[derive(Clone, Debug)]
pub struct CandidateDevice {
    pub devnode: PathBuf,
    pub metadata: String,
}

impl CandidateDevice {
    /// Value of a `KEY=value` line in the metadata
    pub fn property(&self, key: &str) -> Option<&str> {
        self.metadata.lines().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            if k == key {
                Some(v)
            } else {
                None
            }
        })
    }
}

/// First candidate, in the order given, whose metadata matches.
pub fn first_match<I>(candidates: I, signature: &DeviceSignature) -> Option<PathBuf>
where
    I: IntoIterator<Item = CandidateDevice>,
{
    candidates
        .into_iter()
        .find(|candidate| signature.matches(&candidate.metadata))
        .map(|candidate| candidate.devnode)
}

pub trait Locate {
    fn locate(&self, signature: &DeviceSignature) -> Option<PathBuf>;
}

/// Scans `/sys/class/hidraw` directly.
#[derive(Clone, Debug)]
pub struct SysfsLocator {
    class_dir: PathBuf,
    dev_dir: PathBuf,
}

impl Default for SysfsLocator {
    fn default() -> Self {
        Self::new("/sys/class/hidraw", "/dev")
    }
}

fn hidraw_index(name: &str) -> Option<u32> {
    let index = name.strip_prefix("hidraw")?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

impl SysfsLocator {
    pub fn new(class_dir: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            class_dir: class_dir.into(),
            dev_dir: dev_dir.into(),
        }
    }

    fn candidate(&self, entry: &Path) -> Option<CandidateDevice> {
        let name = entry.file_name()?.to_str()?;
        let index = match hidraw_index(name) {
            Some(index) => index,
            None => {
                tracing::debug!("skipping {}: no hidraw index", name);
                return None;
            }
        };

        let uevent = entry.join("device").join("uevent");
        let metadata = match fs::read_to_string(&uevent) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!("skipping {}: {}", uevent.display(), err);
                return None;
            }
        };

        Some(CandidateDevice {
            devnode: self.dev_dir.join(format!("hidraw{}", index)),
            metadata,
        })
    }

    /// Lazily yields every readable hidraw entry, in directory order.
    pub fn scan(&self) -> io::Result<impl Iterator<Item = CandidateDevice> + '_> {
        Ok(fs::read_dir(&self.class_dir)?
            .flatten()
            .filter_map(move |entry| self.candidate(&entry.path())))
    }

    pub fn candidates(&self) -> io::Result<Vec<CandidateDevice>> {
        Ok(self.scan()?.collect())
    }
}

impl Locate for SysfsLocator {
    fn locate(&self, signature: &DeviceSignature) -> Option<PathBuf> {
        match self.scan() {
            Ok(candidates) => first_match(candidates, signature),
            Err(err) => {
                tracing::warn!(
                    "error while scanning {}: {}",
                    self.class_dir.display(),
                    err
                );
                None
            }
        }
    }
}

/// Same matching as [`SysfsLocator`], with the metadata taken from udev.
#[cfg(feature = "udev")]
#[derive(Clone, Copy, Debug, Default)]
pub struct UdevLocator;

#[cfg(feature = "udev")]
impl UdevLocator {
    fn candidate(device: &udev::Device) -> Option<CandidateDevice> {
        let hid_device = device.parent_with_subsystem("hid").ok()??;
        let mut metadata = String::new();
        for key in ["HID_ID", "HID_NAME", "HID_PHYS", "HID_UNIQ"] {
            if let Some(value) = hid_device.property_value(key).and_then(|x| x.to_str()) {
                metadata.push_str(&format!("{}={}\n", key, value));
            }
        }
        let devnode = device.devnode()?;
        Some(CandidateDevice {
            devnode: devnode.to_owned(),
            metadata,
        })
    }

    pub fn candidates(&self) -> io::Result<Vec<CandidateDevice>> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_subsystem("hidraw")?;
        Ok(enumerator
            .scan_devices()?
            .into_iter()
            .filter_map(|device| Self::candidate(&device))
            .collect())
    }
}

#[cfg(feature = "udev")]
impl Locate for UdevLocator {
    fn locate(&self, signature: &DeviceSignature) -> Option<PathBuf> {
        match self.candidates() {
            Ok(candidates) => first_match(candidates, signature),
            Err(err) => {
                tracing::warn!("failed to list hidraw devices: {}", err);
                None
            }
        }
    }
}
