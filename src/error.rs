//! Battery query error types

use std::{io, path::PathBuf};

use thiserror::Error;

/// Everything that can go wrong while querying the mouse.
///
/// [`crate::ProtocolClient::read_battery_percent`] folds all of these into
/// [`crate::BatteryReading::Unavailable`]; the kind only reaches the log.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no hidraw device matches {hid_id} / {interface}")]
    DeviceNotFound { hid_id: String, interface: String },

    #[error("I/O error on {}: {source}", .path.display())]
    DeviceIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("empty response from {}", .path.display())]
    EmptyResponse { path: PathBuf },

    #[error("response does not contain marker {marker}, hex={hex}")]
    ProtocolMismatch { marker: String, hex: String },

    #[error("response too short for offset (len={len}, need end={needed}), hex={hex}")]
    FrameTooShort {
        len: usize,
        needed: usize,
        hex: String,
    },

    #[error("failed to parse hex '{value}'")]
    InvalidValue { value: String },

    #[error("invalid battery value {value} from hex '{value_hex}', hex={hex}")]
    ValueOutOfRange {
        value: u32,
        value_hex: String,
        hex: String,
    },

    #[error("config error in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::DeviceIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
