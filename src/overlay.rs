//! Device-tree overlay management through the cape manager
//!
//! The cape manager exposes a single `slots` file shared by the whole system:
//!
//! ```text
//!  0: 54:PF---
//!  4: ff:P-O-L Bone-LT-eMMC-2G,00A0,Texas Instrument,BB-BONE-EMMC-2G
//!  7: ff:P-O-L Override Board Name,00A0,Override Manuf,ADAFRUIT-UART1
//! ```
//!
//! Writing an overlay name loads it; writing `-<slot>` unloads that slot.
//!
//! # Usage
//!
//! ```no_run
//! use boneio::{Config, OverlayController};
//!
//! let config = Config::default();
//! let overlays = OverlayController::new(&config)?;
//! overlays.ensure_loaded("cape-bone-iio")?;
//! // ... use the ADC ...
//! overlays.unload("cape-bone-iio")?;
//! # Ok::<(), boneio::Error>(())
//! ```

use crate::config::{Config, MissingOverlay};
use crate::error::{Error, Result};
use crate::sysfs;
use log::{debug, info};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Access to the overlay control file
pub trait ControlFile: Send + Sync {
    /// Read the complete slot listing
    fn read_listing(&self) -> Result<String>;

    /// Write one directive (an overlay name, or `-<slot>`)
    fn write_directive(&self, directive: &str) -> Result<()>;
}

/// The cape manager `slots` file in sysfs
#[derive(Debug, Clone)]
pub struct SlotsFile {
    path: PathBuf,
}

impl SlotsFile {
    /// Use a known slots file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locate `<devices_root>/<capemgr_prefix*>/slots`
    pub fn discover(config: &Config) -> Result<Self> {
        let dir = sysfs::find_prefixed_dir(&config.devices_root, &config.capemgr_prefix)?;
        Ok(Self::new(dir.join("slots")))
    }

    /// Path of the slots file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlFile for SlotsFile {
    fn read_listing(&self) -> Result<String> {
        sysfs::read_attr(&self.path)
    }

    fn write_directive(&self, directive: &str) -> Result<()> {
        sysfs::write_attr(&self.path, directive)
    }
}

/// One parsed line of the slot listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Slot identifier (text before the first colon, trimmed)
    pub id: String,
    /// Everything after the first colon
    pub description: String,
}

impl Slot {
    /// Parse `<id>: <description>`; lines without a colon are not slots
    pub fn parse(line: &str) -> Option<Self> {
        let (id, description) = line.split_once(':')?;
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            description: description.trim().to_string(),
        })
    }
}

/// Loads and unloads named overlays
///
/// Construct one per process and share it by reference (or `Arc`) with every
/// peripheral that needs an overlay. Calls are serialized internally.
pub struct OverlayController<F: ControlFile = SlotsFile> {
    control: F,
    settle_delay: Duration,
    missing: MissingOverlay,
    /// Names this controller has seen loaded
    loaded: Mutex<HashSet<String>>,
}

impl OverlayController<SlotsFile> {
    /// Discover the cape manager under the configured devices root
    pub fn new(config: &Config) -> Result<Self> {
        let slots = SlotsFile::discover(config)?;
        debug!("cape manager slots at {}", slots.path().display());
        Ok(Self::with_control(slots, config))
    }
}

impl<F: ControlFile> OverlayController<F> {
    /// Use an explicit control file
    pub fn with_control(control: F, config: &Config) -> Self {
        Self {
            control,
            settle_delay: config.settle_delay,
            missing: config.missing_overlay,
            loaded: Mutex::new(HashSet::new()),
        }
    }

    /// The underlying control file
    pub fn control(&self) -> &F {
        &self.control
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load an overlay unless the listing already mentions it
    pub fn load(&self, name: &str) -> Result<()> {
        let mut loaded = self.lock();
        self.load_locked(name, &mut loaded)
    }

    /// Load an overlay at most once per controller
    ///
    /// Once a name has been loaded (or found already loaded) through this
    /// controller, later calls return without reading the slots file.
    pub fn ensure_loaded(&self, name: &str) -> Result<()> {
        let mut loaded = self.lock();
        if loaded.contains(name) {
            return Ok(());
        }
        self.load_locked(name, &mut loaded)
    }

    fn load_locked(&self, name: &str, loaded: &mut HashSet<String>) -> Result<()> {
        let listing = self.control.read_listing()?;
        if listing.contains(name) {
            debug!("overlay {} already loaded", name);
            loaded.insert(name.to_string());
            return Ok(());
        }

        self.control.write_directive(name)?;
        info!("loaded overlay {}", name);
        thread::sleep(self.settle_delay);
        loaded.insert(name.to_string());
        Ok(())
    }

    /// Unload the first slot whose description mentions `name`
    ///
    /// When no slot matches, the outcome depends on the configured
    /// [`MissingOverlay`] policy.
    pub fn unload(&self, name: &str) -> Result<()> {
        let mut loaded = self.lock();
        let listing = self.control.read_listing()?;

        let slot = listing
            .lines()
            .filter_map(Slot::parse)
            .find(|slot| slot.description.contains(name));

        match slot {
            Some(slot) => {
                self.control.write_directive(&format!("-{}", slot.id))?;
                info!("unloaded overlay {} from slot {}", name, slot.id);
                loaded.remove(name);
                Ok(())
            }
            None => match self.missing {
                MissingOverlay::Ignore => {
                    debug!("overlay {} not in slot listing, nothing to unload", name);
                    loaded.remove(name);
                    Ok(())
                }
                MissingOverlay::Error => Err(Error::NotFoundInListing(name.to_string())),
            },
        }
    }

    /// Parse the current slot listing
    pub fn slots(&self) -> Result<Vec<Slot>> {
        Ok(self
            .control
            .read_listing()?
            .lines()
            .filter_map(Slot::parse)
            .collect())
    }

    /// Whether the listing currently mentions `name`
    pub fn is_loaded(&self, name: &str) -> Result<bool> {
        Ok(self.control.read_listing()?.contains(name))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory cape manager used by the overlay, ADC, PWM and UART tests

    use super::*;

    #[derive(Default)]
    struct State {
        slots: Vec<(u32, String)>,
        next_id: u32,
        writes: Vec<String>,
    }

    /// Behaves like the kernel's slots file and records every write
    #[derive(Default)]
    pub struct FakeCapemgr {
        state: Mutex<State>,
    }

    impl FakeCapemgr {
        pub fn with_slots(names: &[&str]) -> Self {
            let fake = Self::default();
            {
                let mut state = fake.state.lock().unwrap();
                for name in names {
                    let id = state.next_id;
                    state.slots.push((id, name.to_string()));
                    state.next_id += 1;
                }
            }
            fake
        }

        pub fn writes(&self) -> Vec<String> {
            self.state.lock().unwrap().writes.clone()
        }
    }

    impl ControlFile for FakeCapemgr {
        fn read_listing(&self) -> Result<String> {
            let state = self.state.lock().unwrap();
            Ok(state
                .slots
                .iter()
                .map(|(id, name)| format!("{}: {}\n", id, name))
                .collect())
        }

        fn write_directive(&self, directive: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.writes.push(directive.to_string());
            if let Some(id) = directive.strip_prefix('-') {
                let id: u32 = id.parse().expect("numeric slot id");
                state.slots.retain(|(slot, _)| *slot != id);
            } else {
                let id = state.next_id;
                state.slots.push((id, directive.to_string()));
                state.next_id += 1;
            }
            Ok(())
        }
    }
}
