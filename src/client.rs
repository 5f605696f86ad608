use std::{
    fmt,
    io::{self, Read, Write},
    path::Path,
};

use crate::{
    config::ProtocolConfig,
    enumerate::{Locate, SysfsLocator},
    error::{Error, Result},
    frame::{self, ResponseFrame, MAX_RESPONSE_LEN},
    hid::{HidrawOpener, Open},
};

/// Outcome of one poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatteryReading {
    /// Always within 1..=100
    Percent(u8),
    Unavailable,
}

impl BatteryReading {
    pub fn percent(self) -> Option<u8> {
        match self {
            Self::Percent(percent) => Some(percent),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for BatteryReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(percent) => write!(f, "{}%", percent),
            Self::Unavailable => write!(f, "?%"),
        }
    }
}

// `{"percent":75}` or `{"percent":null}`
impl serde::Serialize for BatteryReading {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Json {
            percent: Option<u8>,
        }
        Json {
            percent: self.percent(),
        }
        .serialize(serializer)
    }
}

/// Queries the mouse for its battery level, one round trip per call.
///
/// Not meant to be called concurrently with itself; the device handle lives
/// only for the duration of a single call.
pub struct ProtocolClient<L = SysfsLocator, O = HidrawOpener> {
    config: ProtocolConfig,
    locator: L,
    opener: O,
}

impl ProtocolClient {
    pub fn from_config(config: ProtocolConfig) -> Self {
        let locator = SysfsLocator::new(config.sysfs_class_dir.clone(), config.dev_dir.clone());
        let opener = HidrawOpener {
            read_timeout: config.read_timeout(),
        };
        Self::new(config, locator, opener)
    }
}

impl<L: Locate, O: Open> ProtocolClient<L, O> {
    pub fn new(config: ProtocolConfig, locator: L, opener: O) -> Self {
        Self {
            config,
            locator,
            opener,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Never fails; the reason for an `Unavailable` result is logged.
    pub fn read_battery_percent(&self) -> BatteryReading {
        match self.try_read_battery_percent() {
            Ok(percent) => BatteryReading::Percent(percent),
            Err(err) => {
                tracing::warn!("{}", err);
                BatteryReading::Unavailable
            }
        }
    }

    pub fn try_read_battery_percent(&self) -> Result<u8> {
        let signature = &self.config.signature;
        let path = self
            .locator
            .locate(signature)
            .ok_or_else(|| Error::DeviceNotFound {
                hid_id: signature.hid_id.clone(),
                interface: signature.interface.clone(),
            })?;
        tracing::debug!("using {}", path.display());

        let mut device = self.opener.open(&path).map_err(|err| Error::io(&path, err))?;
        let response = self.round_trip(&mut device, &path)?;
        tracing::debug!("response from {}: {}", path.display(), response.to_hex());

        frame::parse_battery(&response, &self.config.marker, self.config.value_offset)
    }

    fn round_trip<D: Read + Write>(&self, device: &mut D, path: &Path) -> Result<ResponseFrame> {
        // One write is one report; a short write is not retried
        let request = self.config.request.as_bytes();
        let written = device.write(request).map_err(|err| Error::io(path, err))?;
        if written != request.len() {
            return Err(Error::io(
                path,
                io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", written, request.len()),
                ),
            ));
        }
        device.flush().map_err(|err| Error::io(path, err))?;

        let mut data = vec![0; self.config.read_len.min(MAX_RESPONSE_LEN)];
        let len = device.read(&mut data).map_err(|err| Error::io(path, err))?;
        if len == 0 {
            return Err(Error::EmptyResponse {
                path: path.to_owned(),
            });
        }
        data.truncate(len);

        Ok(ResponseFrame::new(data))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        fs,
        path::PathBuf,
        rc::Rc,
    };

    use super::*;
    use crate::{enumerate::DeviceSignature, frame::REQUEST_LEN};

    struct FixedLocator(Option<PathBuf>);

    impl Locate for FixedLocator {
        fn locate(&self, _signature: &DeviceSignature) -> Option<PathBuf> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Log {
        opened: Vec<PathBuf>,
        writes: Vec<Vec<u8>>,
        open_handles: usize,
    }

    struct FakeDevice {
        log: Rc<RefCell<Log>>,
        response: io::Cursor<Vec<u8>>,
        fail_write: bool,
        write_limit: Option<usize>,
    }

    impl Drop for FakeDevice {
        fn drop(&mut self) {
            self.log.borrow_mut().open_handles -= 1;
        }
    }

    impl Read for FakeDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.response.read(buf)
        }
    }

    impl Write for FakeDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_write {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"));
            }
            let len = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
            self.log.borrow_mut().writes.push(buf[..len].to_vec());
            Ok(len)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOpener {
        log: Rc<RefCell<Log>>,
        response: Vec<u8>,
        fail_open: bool,
        fail_write: bool,
        write_limit: Option<usize>,
        opens: Cell<usize>,
    }

    impl Open for FakeOpener {
        type Device = FakeDevice;

        fn open(&self, path: &Path) -> io::Result<FakeDevice> {
            self.opens.set(self.opens.get() + 1);
            if self.fail_open {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "permission denied",
                ));
            }
            let mut log = self.log.borrow_mut();
            log.opened.push(path.to_owned());
            log.open_handles += 1;
            Ok(FakeDevice {
                log: self.log.clone(),
                response: io::Cursor::new(self.response.clone()),
                fail_write: self.fail_write,
                write_limit: self.write_limit,
            })
        }
    }

    fn battery_response(len: usize, value: u8) -> Vec<u8> {
        let mut data = vec![0; len];
        data[0] = 0x51;
        data[1] = 0x02;
        if len > 66 {
            data[66] = value;
        }
        data
    }

    fn fake_client(opener: FakeOpener) -> ProtocolClient<FixedLocator, FakeOpener> {
        ProtocolClient::new(
            ProtocolConfig::default(),
            FixedLocator(Some(PathBuf::from("/dev/hidraw4"))),
            opener,
        )
    }

    fn read(response: Vec<u8>) -> BatteryReading {
        fake_client(FakeOpener {
            response,
            ..Default::default()
        })
        .read_battery_percent()
    }

    #[test]
    fn reads_percent() {
        assert_eq!(read(battery_response(67, 0x32)), BatteryReading::Percent(50));
        assert_eq!(read(battery_response(70, 0x4b)), BatteryReading::Percent(75));
        assert_eq!(read(battery_response(128, 0x64)), BatteryReading::Percent(100));
    }

    #[test]
    fn unavailable_on_bad_response() {
        // no marker
        let mut data = vec![0; 70];
        data[66] = 0x32;
        assert_eq!(read(data), BatteryReading::Unavailable);
        // too short
        assert_eq!(read(battery_response(66, 0)), BatteryReading::Unavailable);
        // out of range
        assert_eq!(read(battery_response(70, 0x00)), BatteryReading::Unavailable);
        assert_eq!(read(battery_response(70, 0x65)), BatteryReading::Unavailable);
        // empty
        assert_eq!(read(Vec::new()), BatteryReading::Unavailable);
    }

    #[test]
    fn reads_at_most_read_len() {
        let mut data = battery_response(200, 0x32);
        data[150] = 0x51;
        let client = fake_client(FakeOpener {
            response: data,
            ..Default::default()
        });
        assert_eq!(client.config().read_len, 128);
        assert_eq!(client.read_battery_percent(), BatteryReading::Percent(50));
    }

    #[test]
    fn writes_same_request_every_poll() {
        let client = fake_client(FakeOpener {
            response: battery_response(70, 0x4b),
            ..Default::default()
        });
        assert_eq!(client.read_battery_percent(), BatteryReading::Percent(75));
        assert_eq!(client.read_battery_percent(), BatteryReading::Percent(75));

        let log = client.opener.log.borrow();
        assert_eq!(log.opened, vec![PathBuf::from("/dev/hidraw4"); 2]);
        assert_eq!(log.writes.len(), 2);
        for write in &log.writes {
            assert_eq!(write.len(), REQUEST_LEN);
            assert_eq!(write.as_slice(), &log.writes[0][..]);
            assert_eq!(&write[..2], &[0x50, 0x02]);
        }
        assert_eq!(log.open_handles, 0);
    }

    #[test]
    fn short_write_is_not_retried() {
        let client = fake_client(FakeOpener {
            response: battery_response(70, 0x4b),
            write_limit: Some(60),
            ..Default::default()
        });
        match client.try_read_battery_percent() {
            Err(Error::DeviceIo { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::WriteZero)
            }
            res => panic!("unexpected result: {:?}", res),
        }
        assert_eq!(client.read_battery_percent(), BatteryReading::Unavailable);

        let log = client.opener.log.borrow();
        let partial = client.config().request.as_bytes()[..60].to_vec();
        assert_eq!(log.writes, vec![partial; 2]);
        assert_eq!(log.open_handles, 0);
    }

    #[test]
    fn oversized_read_len_is_capped() {
        let mut config = ProtocolConfig::default();
        config.read_len = usize::MAX;
        let client = ProtocolClient::new(
            config,
            FixedLocator(Some(PathBuf::from("/dev/hidraw4"))),
            FakeOpener {
                response: battery_response(200, 0x32),
                ..Default::default()
            },
        );
        assert_eq!(client.read_battery_percent(), BatteryReading::Percent(50));
    }

    #[test]
    fn not_found_skips_open() {
        let client = ProtocolClient::new(
            ProtocolConfig::default(),
            FixedLocator(None),
            FakeOpener::default(),
        );
        assert!(matches!(
            client.try_read_battery_percent(),
            Err(Error::DeviceNotFound { .. })
        ));
        assert_eq!(client.read_battery_percent(), BatteryReading::Unavailable);
        assert_eq!(client.opener.opens.get(), 0);
    }

    #[test]
    fn io_failures_are_unavailable() {
        let client = fake_client(FakeOpener {
            fail_open: true,
            ..Default::default()
        });
        assert!(matches!(
            client.try_read_battery_percent(),
            Err(Error::DeviceIo { .. })
        ));

        let client = fake_client(FakeOpener {
            fail_write: true,
            response: battery_response(70, 0x4b),
            ..Default::default()
        });
        assert!(matches!(
            client.try_read_battery_percent(),
            Err(Error::DeviceIo { .. })
        ));
        assert_eq!(client.read_battery_percent(), BatteryReading::Unavailable);
        // handle released on the failure path too
        assert_eq!(client.opener.log.borrow().open_handles, 0);
    }

    #[test]
    fn locates_through_sysfs() {
        let tmp = tempfile::Builder::new()
            .prefix("hyperx-test-")
            .tempdir()
            .unwrap();
        let device = tmp.path().join("hidraw3").join("device");
        fs::create_dir_all(&device).unwrap();
        fs::write(
            device.join("uevent"),
            "HID_ID=0003:000003F0:00000F98\nHID_PHYS=usb-0000:00:14.0-2/input2\n",
        )
        .unwrap();

        let opener = FakeOpener {
            response: battery_response(70, 0x4b),
            ..Default::default()
        };
        let client = ProtocolClient::new(
            ProtocolConfig::default(),
            SysfsLocator::new(tmp.path(), "/dev"),
            opener,
        );
        assert_eq!(client.read_battery_percent(), BatteryReading::Percent(75));
        assert_eq!(
            client.opener.log.borrow().opened,
            vec![PathBuf::from("/dev/hidraw3")]
        );
    }

    #[test]
    fn display_and_json() {
        assert_eq!(BatteryReading::Percent(75).to_string(), "75%");
        assert_eq!(BatteryReading::Unavailable.to_string(), "?%");
        assert_eq!(
            serde_json::to_string(&BatteryReading::Percent(75)).unwrap(),
            r#"{"percent":75}"#
        );
        assert_eq!(
            serde_json::to_string(&BatteryReading::Unavailable).unwrap(),
            r#"{"percent":null}"#
        );
    }
}
