//! BeagleBone Black header pins
//!
//! P8/P9 expansion headers plus the four user LEDs. GPIO numbers are the
//! kernel line numbers (`32 * bank + bit`).

use super::{PinInfo, PinRegistry};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// (name, key, gpio) for every digital pin
const DIGITAL: &[(&str, &str, u32)] = &[
    // User LEDs
    ("USR0", "USR0", 53),
    ("USR1", "USR1", 54),
    ("USR2", "USR2", 55),
    ("USR3", "USR3", 56),
    // P8 header
    ("GPIO1_6", "P8_3", 38),
    ("GPIO1_7", "P8_4", 39),
    ("GPIO1_2", "P8_5", 34),
    ("GPIO1_3", "P8_6", 35),
    ("TIMER4", "P8_7", 66),
    ("TIMER7", "P8_8", 67),
    ("TIMER5", "P8_9", 69),
    ("TIMER6", "P8_10", 68),
    ("GPIO1_13", "P8_11", 45),
    ("GPIO1_12", "P8_12", 44),
    ("EHRPWM2B", "P8_13", 23),
    ("GPIO0_26", "P8_14", 26),
    ("GPIO1_15", "P8_15", 47),
    ("GPIO1_14", "P8_16", 46),
    ("GPIO0_27", "P8_17", 27),
    ("GPIO2_1", "P8_18", 65),
    ("EHRPWM2A", "P8_19", 22),
    ("GPIO1_31", "P8_20", 63),
    ("GPIO1_30", "P8_21", 62),
    ("GPIO1_5", "P8_22", 37),
    ("GPIO1_4", "P8_23", 36),
    ("GPIO1_1", "P8_24", 33),
    ("GPIO1_0", "P8_25", 32),
    ("GPIO1_29", "P8_26", 61),
    ("GPIO2_22", "P8_27", 86),
    ("GPIO2_24", "P8_28", 88),
    ("GPIO2_23", "P8_29", 87),
    ("GPIO2_25", "P8_30", 89),
    ("UART5_CTSN", "P8_31", 10),
    ("UART5_RTSN", "P8_32", 11),
    ("UART4_RTSN", "P8_33", 9),
    ("UART3_RTSN", "P8_34", 81),
    ("UART4_CTSN", "P8_35", 8),
    ("UART3_CTSN", "P8_36", 80),
    ("UART5_TXD", "P8_37", 78),
    ("UART5_RXD", "P8_38", 79),
    ("GPIO2_12", "P8_39", 76),
    ("GPIO2_13", "P8_40", 77),
    ("GPIO2_10", "P8_41", 74),
    ("GPIO2_11", "P8_42", 75),
    ("GPIO2_8", "P8_43", 72),
    ("GPIO2_9", "P8_44", 73),
    ("GPIO2_6", "P8_45", 70),
    ("GPIO2_7", "P8_46", 71),
    // P9 header
    ("UART4_RXD", "P9_11", 30),
    ("GPIO1_28", "P9_12", 60),
    ("UART4_TXD", "P9_13", 31),
    ("EHRPWM1A", "P9_14", 50),
    ("GPIO1_16", "P9_15", 48),
    ("EHRPWM1B", "P9_16", 51),
    ("I2C1_SCL", "P9_17", 5),
    ("I2C1_SDA", "P9_18", 4),
    ("I2C2_SCL", "P9_19", 13),
    ("I2C2_SDA", "P9_20", 12),
    ("UART2_TXD", "P9_21", 3),
    ("UART2_RXD", "P9_22", 2),
    ("GPIO1_17", "P9_23", 49),
    ("UART1_TXD", "P9_24", 15),
    ("GPIO3_21", "P9_25", 117),
    ("UART1_RXD", "P9_26", 14),
    ("GPIO3_19", "P9_27", 115),
    ("SPI1_CS0", "P9_28", 113),
    ("SPI1_D0", "P9_29", 111),
    ("SPI1_D1", "P9_30", 112),
    ("SPI1_SCLK", "P9_31", 110),
    ("CLKOUT2", "P9_41", 20),
    ("GPIO0_7", "P9_42", 7),
];

/// (name, key, channel) for the analog inputs
const ANALOG: &[(&str, &str, u32)] = &[
    ("AIN4", "P9_33", 4),
    ("AIN6", "P9_35", 6),
    ("AIN5", "P9_36", 5),
    ("AIN2", "P9_37", 2),
    ("AIN3", "P9_38", 3),
    ("AIN0", "P9_39", 0),
    ("AIN1", "P9_40", 1),
];

/// Every BeagleBone Black pin
pub static BBB_PINS: Lazy<Vec<PinInfo>> = Lazy::new(|| {
    DIGITAL
        .iter()
        .map(|(name, key, gpio)| PinInfo::gpio(name, key, *gpio))
        .chain(ANALOG.iter().map(|(name, key, ain)| PinInfo::analog(name, key, *ain)))
        .collect()
});

/// Upper-cased name and key -> index into `BBB_PINS`
static INDEX: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for (i, pin) in BBB_PINS.iter().enumerate() {
        m.insert(pin.key.to_ascii_uppercase(), i);
        m.insert(pin.name.to_ascii_uppercase(), i);
    }
    m
});

/// The built-in BeagleBone Black registry
#[derive(Debug, Clone, Copy, Default)]
pub struct BeagleBoneBlack;

impl PinRegistry for BeagleBoneBlack {
    fn resolve(&self, name_or_key: &str) -> Option<&PinInfo> {
        INDEX
            .get(name_or_key.to_ascii_uppercase().as_str())
            .map(|&i| &BBB_PINS[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_key_and_name() {
        let bbb = BeagleBoneBlack;
        assert_eq!(bbb.gpio_line("P9_12"), Some(60));
        assert_eq!(bbb.gpio_line("GPIO1_28"), Some(60));
        assert_eq!(bbb.gpio_line("p8_10"), Some(68));
        assert_eq!(bbb.gpio_line("USR3"), Some(56));
    }

    #[test]
    fn test_analog_pins() {
        let bbb = BeagleBoneBlack;
        assert_eq!(bbb.ain_channel("P9_39"), Some(0));
        assert_eq!(bbb.ain_channel("AIN6"), Some(6));
        assert_eq!(bbb.gpio_line("P9_39"), None);
        assert_eq!(bbb.ain_channel("P9_12"), None);
    }

    #[test]
    fn test_unknown_pin() {
        assert!(BeagleBoneBlack.resolve("P10_1").is_none());
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<&str> = BBB_PINS.iter().map(|p| p.key.as_str()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
