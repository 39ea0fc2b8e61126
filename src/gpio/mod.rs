//! GPIO access through the sysfs class interface
//!
//! This module provides:
//! - Exporting and unexporting lines ([`GpioPin`])
//! - Direction and level control
//! - Edge detection as a stream of level events ([`EdgeEvents`])
//!
//! # Usage
//!
//! ```no_run
//! use boneio::gpio::{Direction, Edge, GpioPin};
//! use boneio::pins::BeagleBoneBlack;
//! use boneio::Config;
//!
//! let config = Config::default();
//! let mut led = GpioPin::export(&config, &BeagleBoneBlack, "P9_12")?;
//! led.set_direction(Direction::Out)?;
//! led.set_value(true)?;
//!
//! let mut button = GpioPin::export(&config, &BeagleBoneBlack, "P8_12")?;
//! let pressed = button.blocking_wait_for_edge(Edge::Falling)?;
//! # let _ = pressed;
//! # Ok::<(), boneio::Error>(())
//! ```

pub mod edge;
mod epoll;
pub mod pin;

pub use edge::{EdgeEvents, EdgeWatcher, LevelSource, TryRecvError};
pub use pin::GpioPin;

use crate::error::Error;
use std::fmt;
use std::str::FromStr;

/// Logic high
pub const HIGH: bool = true;
/// Logic low
pub const LOW: bool = false;

/// Line direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// sysfs token
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            other => Err(Error::InvalidArgument(format!("unknown direction '{}'", other))),
        }
    }
}

/// Which transitions raise an edge event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// sysfs token
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Edge {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" => Ok(Edge::None),
            "rising" => Ok(Edge::Rising),
            "falling" => Ok(Edge::Falling),
            "both" => Ok(Edge::Both),
            other => Err(Error::InvalidArgument(format!("unknown edge '{}'", other))),
        }
    }
}
