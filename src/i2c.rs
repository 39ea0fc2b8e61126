//! SMBus transactions on `/dev/i2c-<bus>`
//!
//! Every transaction goes through the `I2C_SMBUS` ioctl with a 34-byte data
//! block: byte transfers use `block[0]`, words `block[0..2]` in host order,
//! and block transfers a length byte followed by up to 32 payload bytes.

use crate::config::Config;
use crate::error::{Error, IoContext, Result};
use byteorder::{ByteOrder, NativeEndian};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const I2C_SLAVE: u32 = 0x0703;
const I2C_SMBUS: u32 = 0x0720;

const SMBUS_WRITE: u8 = 0;
const SMBUS_READ: u8 = 1;

const SMBUS_QUICK: u32 = 0;
const SMBUS_BYTE: u32 = 1;
const SMBUS_BYTE_DATA: u32 = 2;
const SMBUS_WORD_DATA: u32 = 3;
const SMBUS_PROC_CALL: u32 = 4;
const SMBUS_BLOCK_DATA: u32 = 5;
const SMBUS_BLOCK_PROC_CALL: u32 = 7;

/// Longest SMBus block payload
pub const BLOCK_MAX: usize = 32;

/// `union i2c_smbus_data`: a length byte, 32 payload bytes and one spare
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SmbusData([u8; BLOCK_MAX + 2]);

impl SmbusData {
    fn empty() -> Self {
        Self([0; BLOCK_MAX + 2])
    }

    fn byte(value: u8) -> Self {
        let mut data = Self::empty();
        data.0[0] = value;
        data
    }

    fn word(value: u16) -> Self {
        let mut data = Self::empty();
        NativeEndian::write_u16(&mut data.0[..2], value);
        data
    }

    fn block(payload: &[u8]) -> Result<Self> {
        check_block_len(payload.len())?;
        let mut data = Self::empty();
        data.0[0] = payload.len() as u8;
        data.0[1..=payload.len()].copy_from_slice(payload);
        Ok(data)
    }

    fn as_byte(&self) -> u8 {
        self.0[0]
    }

    fn as_word(&self) -> u16 {
        NativeEndian::read_u16(&self.0[..2])
    }

    /// The payload the device returned; a bogus length is clamped
    fn as_block(&self) -> Vec<u8> {
        let len = (self.0[0] as usize).min(BLOCK_MAX);
        self.0[1..=len].to_vec()
    }
}

/// `struct i2c_smbus_ioctl_data`
#[repr(C)]
#[allow(dead_code)]
struct SmbusIoctl {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

fn check_block_len(len: usize) -> Result<()> {
    if len == 0 || len > BLOCK_MAX {
        return Err(Error::InvalidArgument(format!(
            "block length is {}, but must be in the range 1 to {}",
            len, BLOCK_MAX
        )));
    }
    Ok(())
}

/// An open SMBus adapter
#[derive(Debug)]
pub struct I2c {
    file: File,
    path: PathBuf,
    address: Option<u16>,
}

impl I2c {
    /// Open `/dev/i2c-<bus>` and select `address`
    pub fn open(config: &Config, bus: u32, address: u16) -> Result<Self> {
        let path = config.dev_root.join(format!("i2c-{}", bus));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .at(&path)?;
        let mut i2c = Self::from_file(file, path);
        i2c.set_address(address)?;
        debug!("opened {} at address {:#04x}", i2c.path.display(), address);
        Ok(i2c)
    }

    fn from_file(file: File, path: PathBuf) -> Self {
        Self {
            file,
            path,
            address: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Currently selected slave address
    pub fn address(&self) -> Option<u16> {
        self.address
    }

    /// Select the slave address; no ioctl if it is already selected
    pub fn set_address(&mut self, address: u16) -> Result<()> {
        if self.address == Some(address) {
            return Ok(());
        }
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SLAVE as _,
                address as libc::c_ulong,
            )
        };
        if rc < 0 {
            return Err(Error::io(&self.path, io::Error::last_os_error()));
        }
        self.address = Some(address);
        Ok(())
    }

    fn access(&self, read_write: u8, command: u8, size: u32, data: &mut SmbusData) -> Result<()> {
        let mut args = SmbusIoctl {
            read_write,
            command,
            size,
            data: data as *mut SmbusData,
        };
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_SMBUS as _,
                &mut args as *mut SmbusIoctl,
            )
        };
        if rc < 0 {
            return Err(Error::io(&self.path, io::Error::last_os_error()));
        }
        Ok(())
    }

    /// SMBus Quick: the R/W bit is the only payload
    pub fn write_quick(&self) -> Result<()> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_WRITE, 0, SMBUS_QUICK, &mut data)
    }

    pub fn read_byte(&self) -> Result<u8> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_READ, 0, SMBUS_BYTE, &mut data)?;
        Ok(data.as_byte())
    }

    pub fn read_i8(&self) -> Result<i8> {
        Ok(self.read_byte()? as i8)
    }

    /// SMBus Send Byte; the value travels in the command field
    pub fn write_byte(&self, value: u8) -> Result<()> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_WRITE, value, SMBUS_BYTE, &mut data)
    }

    pub fn read_byte_data(&self, command: u8) -> Result<u8> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_READ, command, SMBUS_BYTE_DATA, &mut data)?;
        Ok(data.as_byte())
    }

    pub fn read_i8_data(&self, command: u8) -> Result<i8> {
        Ok(self.read_byte_data(command)? as i8)
    }

    pub fn write_byte_data(&self, command: u8, value: u8) -> Result<()> {
        let mut data = SmbusData::byte(value);
        self.access(SMBUS_WRITE, command, SMBUS_BYTE_DATA, &mut data)
    }

    pub fn read_word_data(&self, command: u8) -> Result<u16> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_READ, command, SMBUS_WORD_DATA, &mut data)?;
        Ok(data.as_word())
    }

    pub fn read_i16_data(&self, command: u8) -> Result<i16> {
        Ok(self.read_word_data(command)? as i16)
    }

    pub fn write_word_data(&self, command: u8, value: u16) -> Result<()> {
        let mut data = SmbusData::word(value);
        self.access(SMBUS_WRITE, command, SMBUS_WORD_DATA, &mut data)
    }

    /// Send a word and read the device's word reply
    pub fn process_call(&self, command: u8, value: u16) -> Result<u16> {
        let mut data = SmbusData::word(value);
        self.access(SMBUS_WRITE, command, SMBUS_PROC_CALL, &mut data)?;
        Ok(data.as_word())
    }

    /// Send a block and read the device's block reply
    pub fn block_process_call(&self, command: u8, block: &[u8]) -> Result<Vec<u8>> {
        let mut data = SmbusData::block(block)?;
        self.access(SMBUS_WRITE, command, SMBUS_BLOCK_PROC_CALL, &mut data)?;
        Ok(data.as_block())
    }

    pub fn read_block_data(&self, command: u8) -> Result<Vec<u8>> {
        let mut data = SmbusData::empty();
        self.access(SMBUS_READ, command, SMBUS_BLOCK_DATA, &mut data)?;
        Ok(data.as_block())
    }

    pub fn write_block_data(&self, command: u8, block: &[u8]) -> Result<()> {
        let mut data = SmbusData::block(block)?;
        self.access(SMBUS_WRITE, command, SMBUS_BLOCK_DATA, &mut data)
    }
}
