//! UART ports enabled by the `ADAFRUIT-UARTn` overlays
//!
//! Loading the overlay for UARTn exposes `/dev/ttyOn`. With the `serial`
//! feature, [`port`] opens that tty through `serialport`.

#[cfg(feature = "serial")]
pub mod port;

#[cfg(feature = "serial")]
pub use port::{PortConfig, SerialConnection};

use crate::config::Config;
use crate::error::Result;
use crate::overlay::{ControlFile, OverlayController};
use log::{info, warn};
use std::fmt;
use std::path::PathBuf;

/// A hardware UART that can be routed to the headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UartPort {
    Uart1,
    Uart2,
    Uart3,
    Uart4,
    Uart5,
}

impl UartPort {
    pub const ALL: [UartPort; 5] = [
        UartPort::Uart1,
        UartPort::Uart2,
        UartPort::Uart3,
        UartPort::Uart4,
        UartPort::Uart5,
    ];

    pub fn number(self) -> u8 {
        match self {
            UartPort::Uart1 => 1,
            UartPort::Uart2 => 2,
            UartPort::Uart3 => 3,
            UartPort::Uart4 => 4,
            UartPort::Uart5 => 5,
        }
    }

    /// Overlay that routes this UART
    pub fn overlay(self) -> String {
        format!("ADAFRUIT-UART{}", self.number())
    }

    /// tty the kernel creates once the overlay is loaded
    pub fn tty_path(self, config: &Config) -> PathBuf {
        config.dev_root.join(format!("ttyO{}", self.number()))
    }
}

impl fmt::Display for UartPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UART{}", self.number())
    }
}

/// UART overlay management
pub struct Uart;

impl Uart {
    /// Load the overlay for `port` and return its tty path
    pub fn setup<F: ControlFile>(
        overlays: &OverlayController<F>,
        config: &Config,
        port: UartPort,
    ) -> Result<PathBuf> {
        overlays.load(&port.overlay())?;
        let tty = port.tty_path(config);
        info!("{} ready on {}", port, tty.display());
        Ok(tty)
    }

    /// Unload every UART overlay
    ///
    /// All five are attempted; the first failure is returned.
    pub fn cleanup<F: ControlFile>(overlays: &OverlayController<F>) -> Result<()> {
        let mut first_error = None;
        for port in UartPort::ALL {
            if let Err(e) = overlays.unload(&port.overlay()) {
                warn!("could not unload {}: {}", port.overlay(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingOverlay;
    use crate::overlay::fake::FakeCapemgr;
    use std::time::Duration;

    fn config() -> Config {
        Config::default().with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_names() {
        assert_eq!(UartPort::Uart4.overlay(), "ADAFRUIT-UART4");
        assert_eq!(
            UartPort::Uart1.tty_path(&Config::default()),
            PathBuf::from("/dev/ttyO1")
        );
        assert_eq!(UartPort::Uart2.to_string(), "UART2");
    }

    #[test]
    fn test_setup_and_cleanup() {
        let config = config();
        let overlays =
            OverlayController::with_control(FakeCapemgr::with_slots(&["BB-BONELT-HDMI"]), &config);

        let tty = Uart::setup(&overlays, &config, UartPort::Uart2).unwrap();
        assert_eq!(tty, PathBuf::from("/dev/ttyO2"));
        Uart::setup(&overlays, &config, UartPort::Uart2).unwrap();
        Uart::setup(&overlays, &config, UartPort::Uart5).unwrap();
        assert_eq!(
            overlays.control().writes(),
            vec!["ADAFRUIT-UART2", "ADAFRUIT-UART5"]
        );

        Uart::cleanup(&overlays).unwrap();
        assert!(!overlays.is_loaded("ADAFRUIT-UART2").unwrap());
        assert!(!overlays.is_loaded("ADAFRUIT-UART5").unwrap());
        assert!(overlays.is_loaded("BB-BONELT-HDMI").unwrap());
    }

    #[test]
    fn test_cleanup_reports_missing_under_strict_policy() {
        let config = config().with_missing_overlay(MissingOverlay::Error);
        let overlays = OverlayController::with_control(FakeCapemgr::default(), &config);
        Uart::setup(&overlays, &config, UartPort::Uart1).unwrap();

        assert!(Uart::cleanup(&overlays).is_err());
        // the loaded one is still removed
        assert!(!overlays.is_loaded("ADAFRUIT-UART1").unwrap());
    }
}
