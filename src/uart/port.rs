//! Serial connection to a UART tty

use crate::error::{Error, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Baud rates the AM335x UARTs handle reliably
pub const COMMON_BAUD_RATES: &[u32] = &[
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

pub const DEFAULT_BAUD: u32 = 115200;

/// Line settings for a UART tty
#[derive(Debug, Clone)]
pub struct PortConfig {
    pub path: PathBuf,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl PortConfig {
    /// 8N1 at 115200 baud with no flow control
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open UART
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(config.path.to_string_lossy(), config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()?;
        Ok(Self { port, config })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    fn path(&self) -> &Path {
        &self.config.path
    }

    /// Read whatever is available; a timeout reads as zero bytes
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(Error::io(self.path(), e)),
        }
    }

    /// Read up to a newline, dropping a trailing `\r`
    ///
    /// Returns `None` if the timeout expires before any byte arrives.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte)? {
                0 if line.is_empty() => return Ok(None),
                0 => break,
                _ if byte[0] == b'\n' => break,
                _ => line.push(byte[0]),
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let path = self.config.path.clone();
        self.port.write_all(data).map_err(|e| Error::io(path, e))
    }

    pub fn flush(&mut self) -> Result<()> {
        let path = self.config.path.clone();
        self.port.flush().map_err(|e| Error::io(path, e))
    }

    /// Discard both directions of buffered data
    pub fn clear_buffers(&mut self) -> Result<()> {
        Ok(self.port.clear(serialport::ClearBuffer::All)?)
    }

    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.port.set_baud_rate(baud_rate)?;
        self.config.baud_rate = baud_rate;
        Ok(())
    }

    /// Hold a break condition for `duration`
    pub fn send_break(&mut self, duration: Duration) -> Result<()> {
        self.port.set_break()?;
        std::thread::sleep(duration);
        Ok(self.port.clear_break()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::uart::UartPort;

    #[test]
    fn test_defaults() {
        let config = PortConfig::new("/dev/ttyO1");
        assert_eq!(config.baud_rate, DEFAULT_BAUD);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert!(COMMON_BAUD_RATES.contains(&config.baud_rate));
    }

    #[test]
    fn test_builder_for_uart_tty() {
        let tty = UartPort::Uart4.tty_path(&Config::default());
        let config = PortConfig::new(tty)
            .with_baud_rate(9600)
            .with_parity(Parity::Even)
            .with_stop_bits(StopBits::Two)
            .with_timeout(Duration::from_secs(1));

        assert_eq!(config.path, PathBuf::from("/dev/ttyO4"));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_open_missing_tty() {
        let dir = tempfile::tempdir().unwrap();
        let config = PortConfig::new(dir.path().join("ttyO9"));
        assert!(matches!(SerialConnection::open(config), Err(Error::Serial(_))));
    }
}
