use nix::{
    errno::Errno,
    fcntl::{self, OFlag},
    poll::{poll, PollFd, PollFlags},
    sys::stat::Mode,
};
use std::{
    io::{self, Read, Write},
    os::unix::io::{AsRawFd, RawFd},
    path::Path,
    time::Duration,
};

// TODO: Use `OwnedFd` once the nix version in use accepts it
/// Raw HID node, closed on drop.
pub struct Hid {
    fd: RawFd,
    read_timeout: Option<Duration>,
}

impl Drop for Hid {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.fd);
    }
}

impl AsRawFd for Hid {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Hid {
    pub fn open(path: &Path) -> io::Result<Self> {
        let fd = fcntl::open(path, OFlag::O_RDWR | OFlag::O_CLOEXEC, Mode::empty())?;
        Ok(Self {
            fd,
            read_timeout: None,
        })
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<()> {
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        loop {
            let fd = PollFd::new(self.fd, PollFlags::POLLIN);
            match poll(&mut [fd], millis) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "timed out waiting for HID response",
                    ))
                }
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Read for Hid {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(timeout) = self.read_timeout {
            self.wait_readable(timeout)?;
        }
        loop {
            match nix::unistd::read(self.fd, buf) {
                Err(Errno::EINTR) => {}
                res => return Ok(res?),
            }
        }
    }
}

impl Write for Hid {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(self.fd, buf) {
                Err(Errno::EINTR) => {}
                res => return Ok(res?),
            }
        }
    }

    // hidraw writes go straight to the device
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens a device node for one round trip.
pub trait Open {
    type Device: Read + Write;

    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HidrawOpener {
    pub read_timeout: Option<Duration>,
}

impl Open for HidrawOpener {
    type Device = Hid;

    fn open(&self, path: &Path) -> io::Result<Hid> {
        let mut hid = Hid::open(path)?;
        hid.set_read_timeout(self.read_timeout);
        Ok(hid)
    }
}
