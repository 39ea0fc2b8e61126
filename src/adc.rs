//! Analog inputs through the `cape-bone-iio` helper
//!
//! The helper device exposes one text file per channel (`AIN0`..`AIN6`)
//! holding the last conversion in millivolts. Full scale is 1.8 V.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::overlay::{ControlFile, OverlayController};
use crate::pins::PinRegistry;
use crate::sysfs;
use log::debug;
use std::path::{Path, PathBuf};

/// Overlay that enables the ADC helper
pub const ADC_OVERLAY: &str = "cape-bone-iio";

/// Directory prefix of the helper device under the ocp bus
const HELPER_PREFIX: &str = "helper";

/// Highest ADC channel on the AM335x
pub const MAX_CHANNEL: u32 = 6;

/// Full-scale input voltage
pub const FULL_SCALE_VOLTS: f32 = 1.8;

/// Handle to the ADC helper directory
#[derive(Debug, Clone)]
pub struct Adc {
    helper_dir: PathBuf,
}

impl Adc {
    /// Load the ADC overlay (once per controller) and locate the helper
    pub fn setup<F: ControlFile>(overlays: &OverlayController<F>, config: &Config) -> Result<Self> {
        overlays.ensure_loaded(ADC_OVERLAY)?;

        let ocp = sysfs::find_prefixed_dir(&config.devices_root, &config.ocp_prefix)?;
        let helper_dir = sysfs::find_prefixed_dir(&ocp, HELPER_PREFIX)?;
        debug!("adc helper at {}", helper_dir.display());
        Ok(Self { helper_dir })
    }

    /// Use an already-located helper directory
    pub fn with_helper_dir(helper_dir: impl Into<PathBuf>) -> Self {
        Self {
            helper_dir: helper_dir.into(),
        }
    }

    pub fn helper_dir(&self) -> &Path {
        &self.helper_dir
    }

    fn channel_path(&self, ain: u32) -> Result<PathBuf> {
        if ain > MAX_CHANNEL {
            return Err(Error::InvalidArgument(format!(
                "ADC channel {} out of range 0..={}",
                ain, MAX_CHANNEL
            )));
        }
        Ok(self.helper_dir.join(format!("AIN{}", ain)))
    }

    /// Raw reading in millivolts, as reported by the helper
    pub fn read_raw(&self, ain: u32) -> Result<f32> {
        let path = self.channel_path(ain)?;
        let text = sysfs::read_attr(&path)?;
        text.trim().parse::<f32>().map_err(|e| {
            Error::InvalidArgument(format!("{}: unreadable sample '{}': {}", path.display(), text.trim(), e))
        })
    }

    /// Reading in volts
    pub fn read_voltage(&self, ain: u32) -> Result<f32> {
        Ok(self.read_raw(ain)? / 1000.0)
    }

    /// Reading as a fraction of full scale, clamped to `0.0..=1.0`
    pub fn read_normalized(&self, ain: u32) -> Result<f32> {
        Ok((self.read_voltage(ain)? / FULL_SCALE_VOLTS).clamp(0.0, 1.0))
    }

    /// Voltage on a header pin
    pub fn read_pin<R>(&self, registry: &R, name_or_key: &str) -> Result<f32>
    where
        R: PinRegistry + ?Sized,
    {
        let pin = registry
            .resolve(name_or_key)
            .ok_or_else(|| Error::PinNotFound(name_or_key.to_string()))?;
        let ain = pin
            .ain
            .ok_or_else(|| Error::NotAnalogPin(name_or_key.to_string()))?;
        self.read_voltage(ain)
    }

    /// Unload the ADC overlay
    pub fn cleanup<F: ControlFile>(overlays: &OverlayController<F>) -> Result<()> {
        overlays.unload(ADC_OVERLAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::fake::FakeCapemgr;
    use crate::pins::BeagleBoneBlack;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_setup_loads_overlay_once() {
        let dir = tempdir().unwrap();
        let config = Config::rooted_at(dir.path()).with_settle_delay(Duration::ZERO);
        let helper = config.devices_root.join("ocp.3/helper.15");
        fs::create_dir_all(&helper).unwrap();

        let overlays = OverlayController::with_control(FakeCapemgr::default(), &config);
        let adc = Adc::setup(&overlays, &config).unwrap();
        Adc::setup(&overlays, &config).unwrap();

        assert_eq!(adc.helper_dir(), helper.as_path());
        assert_eq!(overlays.control().writes(), vec![ADC_OVERLAY]);

        Adc::cleanup(&overlays).unwrap();
        assert!(!overlays.is_loaded(ADC_OVERLAY).unwrap());
    }

    #[test]
    fn test_read_scaling() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("AIN0"), "900\n").unwrap();
        fs::write(dir.path().join("AIN1"), "1900\n").unwrap();
        let adc = Adc::with_helper_dir(dir.path());

        assert_eq!(adc.read_raw(0).unwrap(), 900.0);
        assert!((adc.read_voltage(0).unwrap() - 0.9).abs() < 1e-6);
        assert!((adc.read_normalized(0).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(adc.read_normalized(1).unwrap(), 1.0);
    }

    #[test]
    fn test_read_pin() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("AIN0"), "1200").unwrap();
        let adc = Adc::with_helper_dir(dir.path());

        assert!((adc.read_pin(&BeagleBoneBlack, "P9_39").unwrap() - 1.2).abs() < 1e-6);
        assert!(matches!(
            adc.read_pin(&BeagleBoneBlack, "P9_12"),
            Err(Error::NotAnalogPin(_))
        ));
    }

    #[test]
    fn test_channel_range() {
        let adc = Adc::with_helper_dir("/nonexistent");
        assert!(matches!(adc.read_raw(7), Err(Error::InvalidArgument(_))));
        assert!(matches!(adc.read_raw(3), Err(Error::Io { .. })));
    }
}
