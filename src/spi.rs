//! spidev access on `/dev/spidev<bus>.<cs>`
//!
//! Settings are read and written through the `SPI_IOC_*` ioctls. The mode
//! byte carries the clock mode in its two low bits and the remaining
//! [`SpiFlags`] above them; changing either rewrites the whole byte and
//! reads it back.

use crate::config::Config;
use crate::error::{Error, IoContext, Result};
use bitflags::bitflags;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const SPI_IOC_RD_MODE: u32 = 0x8001_6b01;
const SPI_IOC_WR_MODE: u32 = 0x4001_6b01;
const SPI_IOC_RD_BITS_PER_WORD: u32 = 0x8001_6b03;
const SPI_IOC_WR_BITS_PER_WORD: u32 = 0x4001_6b03;
const SPI_IOC_RD_MAX_SPEED_HZ: u32 = 0x8004_6b04;
const SPI_IOC_WR_MAX_SPEED_HZ: u32 = 0x4004_6b04;
/// `SPI_IOC_MESSAGE(1)`
const SPI_IOC_MESSAGE_1: u32 = 0x4020_6b00;

bitflags! {
    /// Bits of the spidev mode byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SpiFlags: u8 {
        /// Clock phase
        const CPHA = 0x01;
        /// Clock polarity
        const CPOL = 0x02;
        /// Chip select active high
        const CS_HIGH = 0x04;
        /// Least significant bit first on the wire
        const LSB_FIRST = 0x08;
        /// SI/SO share one line
        const THREE_WIRE = 0x10;
        /// Loopback
        const LOOP = 0x20;
        /// One device per bus, no chip select
        const NO_CS = 0x40;
        /// Slave pulls low to pause
        const READY = 0x80;
    }
}

/// Clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SpiMode {
    #[default]
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

impl SpiMode {
    /// Clock mode encoded in the low bits of a mode byte
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => SpiMode::Mode0,
            1 => SpiMode::Mode1,
            2 => SpiMode::Mode2,
            _ => SpiMode::Mode3,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Replace the clock mode in `current`, keeping every other flag
pub fn merge_mode(current: u8, mode: SpiMode) -> u8 {
    (current & !(SpiFlags::CPHA | SpiFlags::CPOL).bits()) | mode.bits()
}

/// Set or clear `flag` in `current`
pub fn merge_flag(current: u8, flag: SpiFlags, on: bool) -> u8 {
    let mut flags = SpiFlags::from_bits_retain(current);
    flags.set(flag, on);
    flags.bits()
}

/// `struct spi_ioc_transfer`
#[repr(C)]
#[allow(dead_code)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

/// An open spidev device
#[derive(Debug)]
pub struct Spi {
    file: File,
    path: PathBuf,
}

impl Spi {
    /// Open `spidev<bus>.<cs>` under the configured device root
    pub fn open(config: &Config, bus: u32, cs: u32) -> Result<Self> {
        let path = config.dev_root.join(format!("spidev{}.{}", bus, cs));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .at(&path)?;
        debug!("opened {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: u32, arg: &mut T) -> Result<()> {
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg as *mut T) };
        if rc < 0 {
            return Err(Error::io(&self.path, io::Error::last_os_error()));
        }
        Ok(())
    }

    fn read_mode_byte(&self) -> Result<u8> {
        let mut mode = 0u8;
        self.ioctl(SPI_IOC_RD_MODE, &mut mode)?;
        Ok(mode)
    }

    /// Write the full mode byte and confirm the device took it
    fn write_mode_byte(&self, mut mode: u8) -> Result<()> {
        let requested = mode;
        self.ioctl(SPI_IOC_WR_MODE, &mut mode)?;
        let actual = self.read_mode_byte()?;
        if actual != requested {
            return Err(Error::ModeMismatch { requested, actual });
        }
        Ok(())
    }

    pub fn mode(&self) -> Result<SpiMode> {
        Ok(SpiMode::from_bits(self.read_mode_byte()?))
    }

    /// Change the clock mode; other flags are left as they are
    pub fn set_mode(&self, mode: SpiMode) -> Result<()> {
        let current = self.read_mode_byte()?;
        self.write_mode_byte(merge_mode(current, mode))
    }

    pub fn flags(&self) -> Result<SpiFlags> {
        Ok(SpiFlags::from_bits_retain(self.read_mode_byte()?))
    }

    pub fn set_flag(&self, flag: SpiFlags, on: bool) -> Result<()> {
        let current = self.read_mode_byte()?;
        self.write_mode_byte(merge_flag(current, flag, on))
    }

    pub fn bits_per_word(&self) -> Result<u8> {
        let mut bits = 0u8;
        self.ioctl(SPI_IOC_RD_BITS_PER_WORD, &mut bits)?;
        Ok(bits)
    }

    pub fn set_bits_per_word(&self, mut bits: u8) -> Result<()> {
        self.ioctl(SPI_IOC_WR_BITS_PER_WORD, &mut bits)
    }

    pub fn max_speed_hz(&self) -> Result<u32> {
        let mut speed = 0u32;
        self.ioctl(SPI_IOC_RD_MAX_SPEED_HZ, &mut speed)?;
        Ok(speed)
    }

    pub fn set_max_speed_hz(&self, mut speed: u32) -> Result<()> {
        self.ioctl(SPI_IOC_WR_MAX_SPEED_HZ, &mut speed)
    }

    /// Half-duplex read
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).at(&self.path)
    }

    /// Half-duplex write
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.file.write(data).at(&self.path)
    }

    /// Clock `tx` out while clocking the same number of bytes in
    pub fn transfer(&self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut rx = vec![0u8; tx.len()];
        if tx.is_empty() {
            return Ok(rx);
        }
        let len = u32::try_from(tx.len())
            .map_err(|_| Error::InvalidArgument(format!("transfer of {} bytes", tx.len())))?;
        let mut transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len,
            ..Default::default()
        };
        self.ioctl(SPI_IOC_MESSAGE_1, &mut transfer)?;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;
    use tempfile::tempdir;

    #[test]
    fn test_transfer_layout() {
        assert_eq!(mem::size_of::<SpiIocTransfer>(), 32);
        // _IOW('k', 0, char[32])
        assert_eq!((SPI_IOC_MESSAGE_1 >> 16) & 0x3fff, 32);
    }

    #[test]
    fn test_request_encoding() {
        let dir_bits = |req: u32| req >> 30;
        let size = |req: u32| (req >> 16) & 0x3fff;
        assert_eq!(dir_bits(SPI_IOC_RD_MODE), 2);
        assert_eq!(dir_bits(SPI_IOC_WR_MODE), 1);
        assert_eq!(size(SPI_IOC_RD_BITS_PER_WORD), 1);
        assert_eq!(size(SPI_IOC_WR_MAX_SPEED_HZ), 4);
        assert_eq!(SPI_IOC_RD_MAX_SPEED_HZ & 0xff, 4);
    }

    #[test]
    fn test_merge_mode_keeps_flags() {
        let current = (SpiFlags::CS_HIGH | SpiFlags::CPOL).bits();
        let merged = merge_mode(current, SpiMode::Mode1);
        assert_eq!(merged, (SpiFlags::CS_HIGH | SpiFlags::CPHA).bits());
        assert_eq!(SpiMode::from_bits(merged), SpiMode::Mode1);
        assert_eq!(merge_mode(0xff, SpiMode::Mode0), 0xfc);
    }

    #[test]
    fn test_merge_flag() {
        let on = merge_flag(SpiMode::Mode3.bits(), SpiFlags::LSB_FIRST, true);
        assert_eq!(on, 0x0b);
        assert_eq!(merge_flag(on, SpiFlags::LSB_FIRST, false), 0x03);
        assert_eq!(merge_flag(on, SpiFlags::LSB_FIRST, true), on);
    }

    #[test]
    fn test_open_path() {
        let dir = tempdir().unwrap();
        let config = Config::default().with_dev_root(dir.path());
        assert!(matches!(Spi::open(&config, 1, 0), Err(Error::Io { .. })));

        std::fs::write(dir.path().join("spidev1.0"), "").unwrap();
        let spi = Spi::open(&config, 1, 0).unwrap();
        assert_eq!(spi.path(), dir.path().join("spidev1.0"));

        // a regular file is not a spidev node
        assert!(matches!(spi.mode(), Err(Error::Io { .. })));
        assert!(spi.transfer(&[]).unwrap().is_empty());
    }
}
