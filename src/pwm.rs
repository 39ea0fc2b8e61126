//! PWM outputs through the `bone_pwm_<KEY>` overlays
//!
//! Each overlay creates a `pwm_test_<KEY>.<n>` directory under the ocp bus
//! with `period` and `duty` (nanoseconds) and `polarity` (0 or 1).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::overlay::{ControlFile, OverlayController};
use crate::sysfs;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Overlay that enables the PWM subsystem
pub const PWM_SUBSYSTEM_OVERLAY: &str = "am33xx_pwm";

const NANOS_PER_SEC: f64 = 1e9;

/// Output polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    fn as_str(&self) -> &'static str {
        match self {
            Polarity::Normal => "0",
            Polarity::Inversed => "1",
        }
    }
}

/// Period in nanoseconds for a frequency in Hz
pub fn period_ns(frequency: f32) -> u64 {
    (NANOS_PER_SEC / frequency as f64) as u64
}

/// Duty time in nanoseconds for a period and a percentage
pub fn duty_ns(period_ns: u64, duty_cycle: f32) -> u64 {
    (period_ns as f64 * duty_cycle as f64 * 0.01) as u64
}

/// Attribute writes for a period change, in the order they must happen
///
/// The driver rejects any write that leaves duty above period, so when the
/// old duty does not fit under the new period the duty goes first.
pub fn frequency_writes(
    current: Option<(u64, u64)>,
    period: u64,
    duty: Option<u64>,
) -> Vec<(&'static str, u64)> {
    let mut writes = vec![("period", period)];
    if let Some(duty) = duty {
        match current {
            Some((_, old_duty)) if old_duty > period => writes.insert(0, ("duty", duty)),
            _ => writes.push(("duty", duty)),
        }
    }
    writes
}

/// One PWM output
#[derive(Debug)]
pub struct Pwm {
    key: String,
    dir: PathBuf,
    frequency: f32,
    duty_cycle: f32,
    polarity: Polarity,
}

/// Overlay name for a header key
pub fn overlay_name(key: &str) -> String {
    format!("bone_pwm_{}", key)
}

impl Pwm {
    /// Enable PWM on `key` and apply frequency, polarity and duty cycle
    ///
    /// If anything after the per-pin overlay load fails, the overlay is
    /// unloaded again before the error is returned.
    pub fn new<F: ControlFile>(
        overlays: &OverlayController<F>,
        config: &Config,
        key: &str,
        duty_cycle: f32,
        frequency: f32,
        polarity: Polarity,
    ) -> Result<Self> {
        overlays.ensure_loaded(PWM_SUBSYSTEM_OVERLAY)?;
        overlays.load(&overlay_name(key))?;

        let result = Self::locate(config, key).and_then(|dir| {
            let mut pwm = Self::with_dir(key, dir);
            pwm.configure(duty_cycle, frequency, polarity)?;
            Ok(pwm)
        });

        if result.is_err() {
            if let Err(e) = overlays.unload(&overlay_name(key)) {
                warn!("could not unload {} after failed setup: {}", overlay_name(key), e);
            }
        }
        result
    }

    fn locate(config: &Config, key: &str) -> Result<PathBuf> {
        let ocp = sysfs::find_prefixed_dir(&config.devices_root, &config.ocp_prefix)?;
        let dir = sysfs::find_prefixed_dir(&ocp, &format!("pwm_test_{}", key))?;
        debug!("pwm {} at {}", key, dir.display());
        Ok(dir)
    }

    /// Wrap an already-present `pwm_test_*` directory without touching overlays
    ///
    /// Frequency, duty cycle and polarity start out unknown, so the first
    /// setter call always writes.
    pub fn with_dir(key: &str, dir: impl Into<PathBuf>) -> Self {
        Self {
            key: key.to_string(),
            dir: dir.into(),
            frequency: 0.0,
            duty_cycle: -1.0,
            polarity: Polarity::Normal,
        }
    }

    fn configure(&mut self, duty_cycle: f32, frequency: f32, polarity: Polarity) -> Result<()> {
        self.set_frequency(frequency)?;
        self.write_polarity(polarity)?;
        self.set_duty_cycle(duty_cycle)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn duty_cycle(&self) -> f32 {
        self.duty_cycle.max(0.0)
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Set the frequency in Hz, keeping the duty percentage
    pub fn set_frequency(&mut self, frequency: f32) -> Result<()> {
        if !(frequency > 0.0) || !frequency.is_finite() {
            return Err(Error::InvalidArgument(format!("invalid frequency: {}", frequency)));
        }
        if frequency == self.frequency {
            return Ok(());
        }

        let current = self.current_times();
        let period = period_ns(frequency);
        let duty = (self.duty_cycle >= 0.0).then(|| duty_ns(period, self.duty_cycle));
        for (attr, value) in frequency_writes(current, period, duty) {
            sysfs::write_attr(&self.dir.join(attr), &value.to_string())?;
        }
        self.frequency = frequency;
        Ok(())
    }

    /// (period, duty) in nanoseconds as last written, if known
    fn current_times(&self) -> Option<(u64, u64)> {
        if self.frequency <= 0.0 || self.duty_cycle < 0.0 {
            return None;
        }
        let period = period_ns(self.frequency);
        Some((period, duty_ns(period, self.duty_cycle)))
    }

    /// Set the duty cycle in percent (0-100)
    pub fn set_duty_cycle(&mut self, duty_cycle: f32) -> Result<()> {
        if !(0.0..=100.0).contains(&duty_cycle) {
            return Err(Error::InvalidArgument(format!("invalid duty cycle: {}", duty_cycle)));
        }
        if duty_cycle == self.duty_cycle {
            return Ok(());
        }
        if self.frequency <= 0.0 {
            return Err(Error::InvalidArgument("duty cycle set before frequency".to_string()));
        }

        let duty = duty_ns(period_ns(self.frequency), duty_cycle);
        sysfs::write_attr(&self.dir.join("duty"), &duty.to_string())?;
        self.duty_cycle = duty_cycle;
        Ok(())
    }

    pub fn set_polarity(&mut self, polarity: Polarity) -> Result<()> {
        if polarity == self.polarity {
            return Ok(());
        }
        self.write_polarity(polarity)
    }

    fn write_polarity(&mut self, polarity: Polarity) -> Result<()> {
        sysfs::write_attr(&self.dir.join("polarity"), polarity.as_str())?;
        self.polarity = polarity;
        Ok(())
    }

    /// Unload this pin's overlay
    pub fn close<F: ControlFile>(self, overlays: &OverlayController<F>) -> Result<()> {
        overlays.unload(&overlay_name(&self.key))
    }

    /// Unload the PWM subsystem overlay
    pub fn cleanup<F: ControlFile>(overlays: &OverlayController<F>) -> Result<()> {
        overlays.unload(PWM_SUBSYSTEM_OVERLAY)
    }
}
