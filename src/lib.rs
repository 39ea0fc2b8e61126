//! boneio
//!
//! Pin and peripheral control for BeagleBone-class boards through the Linux
//! sysfs and device-tree overlay interfaces.
//!
//! # Features
//!
//! - **Overlays**: idempotent load and name-matched unload through the cape
//!   manager slots file ([`OverlayController`])
//! - **GPIO**: export, direction, level, and edge detection delivered as a
//!   cancellable stream ([`gpio`])
//! - **Peripherals**: [`adc`], [`pwm`], [`i2c`] (SMBus), [`spi`] (spidev) and
//!   [`uart`] (serial port configuration with the `serial` feature)
//!
//! Every filesystem root is taken from [`Config`], so the whole crate can be
//! pointed at a fake tree under a temporary directory.
//!
//! # Usage
//!
//! ```no_run
//! use boneio::{Config, OverlayController};
//! use boneio::pwm::{Polarity, Pwm};
//!
//! let config = Config::default();
//! let overlays = OverlayController::new(&config)?;
//! let mut servo = Pwm::new(&overlays, &config, "P9_14", 7.5, 50.0, Polarity::Normal)?;
//! servo.set_duty_cycle(10.0)?;
//! servo.close(&overlays)?;
//! # Ok::<(), boneio::Error>(())
//! ```

pub mod adc;
pub mod config;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod overlay;
pub mod pins;
pub mod pwm;
pub mod spi;
pub mod sysfs;
pub mod uart;

pub use config::{Config, MissingOverlay};
pub use error::{Error, Result};
pub use gpio::{Direction, Edge, EdgeEvents, GpioPin};
pub use overlay::{ControlFile, OverlayController, SlotsFile};
pub use pins::{BeagleBoneBlack, PinInfo, PinRegistry};
