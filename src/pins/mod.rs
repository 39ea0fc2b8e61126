//! Header pin registry
//!
//! Maps a symbolic pin (`"P9_12"`, `"GPIO1_28"`, `"USR0"`) to the kernel GPIO
//! line number and, for analog inputs, the ADC channel. The BeagleBone Black
//! table ships built in; any other board can provide its own table through
//! [`PinRegistry`].

pub mod beaglebone;

pub use beaglebone::{BeagleBoneBlack, BBB_PINS};

use serde::{Deserialize, Serialize};

/// One header pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInfo {
    /// Signal name (e.g. "GPIO1_28", "EHRPWM1A", "AIN0")
    pub name: String,
    /// Header key (e.g. "P9_12")
    pub key: String,
    /// Kernel GPIO line number, if the pin can be a GPIO
    pub gpio: Option<u32>,
    /// ADC channel, if the pin is an analog input
    pub ain: Option<u32>,
}

impl PinInfo {
    /// A digital pin
    pub fn gpio(name: &str, key: &str, gpio: u32) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            gpio: Some(gpio),
            ain: None,
        }
    }

    /// An analog-only pin
    pub fn analog(name: &str, key: &str, ain: u32) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            gpio: None,
            ain: Some(ain),
        }
    }

    /// Whether `name_or_key` refers to this pin (case-insensitive)
    pub fn matches(&self, name_or_key: &str) -> bool {
        self.key.eq_ignore_ascii_case(name_or_key) || self.name.eq_ignore_ascii_case(name_or_key)
    }
}

/// Resolves symbolic pin identifiers
pub trait PinRegistry {
    /// Look up a pin by header key or signal name
    fn resolve(&self, name_or_key: &str) -> Option<&PinInfo>;

    /// GPIO line number of a pin, if it exists and is a GPIO
    fn gpio_line(&self, name_or_key: &str) -> Option<u32> {
        self.resolve(name_or_key).and_then(|p| p.gpio)
    }

    /// ADC channel of a pin, if it exists and is analog
    fn ain_channel(&self, name_or_key: &str) -> Option<u32> {
        self.resolve(name_or_key).and_then(|p| p.ain)
    }
}

impl PinRegistry for [PinInfo] {
    fn resolve(&self, name_or_key: &str) -> Option<&PinInfo> {
        self.iter().find(|p| p.matches(name_or_key))
    }
}

impl PinRegistry for Vec<PinInfo> {
    fn resolve(&self, name_or_key: &str) -> Option<&PinInfo> {
        self.as_slice().resolve(name_or_key)
    }
}
