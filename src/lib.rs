//! Battery level of HyperX wireless mice, read over Linux hidraw.
//!
//! [`ProtocolClient::read_battery_percent`] locates the mouse's hidraw node,
//! writes a fixed 64-byte query and extracts the percentage from the reply.

mod client;
pub use client::{BatteryReading, ProtocolClient};
mod config;
pub use config::{default_config_path, ProtocolConfig};
mod enumerate;
#[cfg(feature = "udev")]
pub use enumerate::UdevLocator;
pub use enumerate::{first_match, CandidateDevice, DeviceSignature, Locate, SysfsLocator};
mod error;
pub use error::{Error, Result};
pub mod frame;
pub use frame::{RequestFrame, ResponseFrame};
mod hid;
pub use hid::{Hid, HidrawOpener, Open};
