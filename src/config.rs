//! Filesystem roots and policy knobs
//!
//! Every path the crate touches hangs off one of the roots here, so tests can
//! point the whole crate at a temporary directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default sysfs GPIO class directory
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Default root searched for the cape manager and the ocp bus
pub const DEFAULT_DEVICES_ROOT: &str = "/sys/devices";

/// Default directory holding i2c and spidev device nodes
pub const DEFAULT_DEV_ROOT: &str = "/dev";

/// Directory prefix of the cape manager under the devices root
pub const DEFAULT_CAPEMGR_PREFIX: &str = "bone_capemgr";

/// Directory prefix of the on-chip peripheral bus under the devices root
pub const DEFAULT_OCP_PREFIX: &str = "ocp";

/// Grace period after writing an overlay name to the slots file
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// What `OverlayController::unload` does when no slot matches the name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingOverlay {
    /// Treat the overlay as already unloaded
    #[default]
    Ignore,
    /// Return `Error::NotFoundInListing`
    Error,
}

/// Paths and policies shared by all peripherals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// sysfs GPIO class directory (holds `export`, `unexport`, `gpioN/`)
    pub gpio_root: PathBuf,
    /// Root searched for the cape manager and ocp directories
    pub devices_root: PathBuf,
    /// Directory holding `i2c-N` and `spidevB.C`
    pub dev_root: PathBuf,
    /// Cape manager directory prefix
    pub capemgr_prefix: String,
    /// ocp directory prefix
    pub ocp_prefix: String,
    /// Sleep after a successful overlay load
    pub settle_delay: Duration,
    /// Unload behavior for names missing from the slot listing
    pub missing_overlay: MissingOverlay,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(DEFAULT_GPIO_ROOT),
            devices_root: PathBuf::from(DEFAULT_DEVICES_ROOT),
            dev_root: PathBuf::from(DEFAULT_DEV_ROOT),
            capemgr_prefix: DEFAULT_CAPEMGR_PREFIX.to_string(),
            ocp_prefix: DEFAULT_OCP_PREFIX.to_string(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            missing_overlay: MissingOverlay::default(),
        }
    }
}

impl Config {
    /// Configuration for the real sysfs tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the GPIO class directory
    pub fn with_gpio_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.gpio_root = path.into();
        self
    }

    /// Set the devices root
    pub fn with_devices_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.devices_root = path.into();
        self
    }

    /// Set the device node directory
    pub fn with_dev_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.dev_root = path.into();
        self
    }

    /// Set the cape manager directory prefix
    pub fn with_capemgr_prefix(mut self, prefix: &str) -> Self {
        self.capemgr_prefix = prefix.to_string();
        self
    }

    /// Set the post-load settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the unload policy for missing overlays
    pub fn with_missing_overlay(mut self, policy: MissingOverlay) -> Self {
        self.missing_overlay = policy;
        self
    }

    /// Point every root at subdirectories of `base`
    ///
    /// Lays out `base/class/gpio`, `base/devices` and `base/dev`, mirroring
    /// the real hierarchy. Used to drive the crate against a fake tree.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            gpio_root: base.join("class/gpio"),
            devices_root: base.join("devices"),
            dev_root: base.join("dev"),
            ..Self::default()
        }
    }

    /// Directory of an exported GPIO line
    pub fn gpio_dir(&self, line: u32) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", line))
    }
}
