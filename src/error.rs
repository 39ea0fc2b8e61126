//! Error type shared by every peripheral
//!
//! Sysfs failures nearly always come down to "which file did we touch", so
//! [`Error::Io`] carries the path alongside the OS error.

use std::io;
use std::path::{Path, PathBuf};

/// Errors returned by boneio operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pin registry has no entry for the given name or key
    #[error("no GPIO with name or key '{0}' found")]
    PinNotFound(String),

    /// The pin exists but has no ADC channel
    #[error("pin '{0}' is not an analog input")]
    NotAnalogPin(String),

    /// Open, read or write failure on a control, attribute or device file
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// No directory with the expected prefix exists under `root`
    #[error("no directory starting with '{prefix}' under {}", .root.display())]
    PathNotFound { root: PathBuf, prefix: String },

    /// Overlay unload found no matching slot (only with `MissingOverlay::Error`)
    #[error("overlay '{0}' is not in the slot listing")]
    NotFoundInListing(String),

    /// epoll registration or wait failure
    #[error("edge notification failed: {0}")]
    Notification(#[source] io::Error),

    /// Argument rejected before touching the hardware
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// spidev accepted a mode write but reads back something else
    #[error("could not set SPI mode {requested:#04x} (device reports {actual:#04x})")]
    ModeMismatch { requested: u8, actual: u8 },

    /// Serial port configuration failure
    #[cfg(feature = "serial")]
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The underlying OS error kind, if this is an I/O failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io { source, .. } | Error::Notification(source) => Some(source.kind()),
            _ => None,
        }
    }
}

/// Attach a path to a `std::io::Result`
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
