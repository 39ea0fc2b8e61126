//! Exported GPIO line

use super::edge::{watch_ended, EdgeEvents, EdgeWatcher, LevelSource};
use super::{Direction, Edge};
use crate::config::Config;
use crate::error::{Error, IoContext, Result};
use crate::pins::PinRegistry;
use crate::sysfs;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// The value file as seen by the edge watcher thread
///
/// Reads are positional so the thread never moves the offset the pin
/// handle relies on.
struct ValueSource(File);

impl AsFd for ValueSource {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl LevelSource for ValueSource {
    fn read_level(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; 1];
        self.0.read_at(&mut buf, 0)?;
        Ok(buf[0] == b'1')
    }
}

/// A GPIO line exported through `/sys/class/gpio`
pub struct GpioPin {
    line: u32,
    gpio_root: PathBuf,
    dir: PathBuf,
    value_path: PathBuf,
    /// Opened on first access and kept for the life of the handle
    value: Option<File>,
    watcher: EdgeWatcher,
}

impl GpioPin {
    /// Resolve `name_or_key` and export its line
    pub fn export<R>(config: &Config, registry: &R, name_or_key: &str) -> Result<Self>
    where
        R: PinRegistry + ?Sized,
    {
        let line = registry
            .gpio_line(name_or_key)
            .ok_or_else(|| Error::PinNotFound(name_or_key.to_string()))?;
        Self::export_line(config, line)
    }

    /// Export a raw line number
    pub fn export_line(config: &Config, line: u32) -> Result<Self> {
        sysfs::write_attr(&config.gpio_root.join("export"), &line.to_string())?;
        info!("exported gpio{}", line);

        let dir = config.gpio_dir(line);
        Ok(Self {
            line,
            gpio_root: config.gpio_root.clone(),
            value_path: dir.join("value"),
            dir,
            value: None,
            watcher: EdgeWatcher::new(),
        })
    }

    /// Stop edge detection, close the value file and unexport the line
    pub fn unexport(mut self) -> Result<()> {
        self.watcher.detach();
        self.value = None;
        sysfs::write_attr(&self.gpio_root.join("unexport"), &self.line.to_string())?;
        info!("unexported gpio{}", self.line);
        Ok(())
    }

    /// Kernel line number
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current direction; anything other than `out` reads as input
    pub fn direction(&self) -> Result<Direction> {
        let path = self.dir.join("direction");
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .at(&path)?;
        let mut buf = [0u8; 3];
        let n = file.read(&mut buf).at(&path)?;
        if &buf[..n] == b"out" {
            Ok(Direction::Out)
        } else {
            Ok(Direction::In)
        }
    }

    pub fn set_direction(&self, direction: Direction) -> Result<()> {
        sysfs::write_attr(&self.dir.join("direction"), direction.as_str())
    }

    /// Write the edge trigger mode
    pub fn set_edge(&self, edge: Edge) -> Result<()> {
        sysfs::write_attr(&self.dir.join("edge"), edge.as_str())
    }

    /// Read the current level
    pub fn value(&mut self) -> Result<bool> {
        let file = open_value(&mut self.value, &self.value_path)?;
        file.seek(SeekFrom::Start(0)).at(&self.value_path)?;
        let mut buf = [0u8; 1];
        file.read(&mut buf).at(&self.value_path)?;
        Ok(buf[0] == b'1')
    }

    /// Drive the line (only meaningful as an output)
    pub fn set_value(&mut self, value: bool) -> Result<()> {
        let file = open_value(&mut self.value, &self.value_path)?;
        file.seek(SeekFrom::Start(0)).at(&self.value_path)?;
        let byte: &[u8] = if value { b"1" } else { b"0" };
        file.write_all(byte).at(&self.value_path)
    }

    /// Switch to input, arm `edge` and start streaming level samples
    ///
    /// Replaces any watch already running on this pin.
    pub fn add_edge_detect(&mut self, edge: Edge) -> Result<EdgeEvents> {
        let source = self.prepare_watch(edge)?;
        self.watcher.attach(source)
    }

    /// Stop edge detection; does nothing if none is running
    pub fn remove_edge_detect(&self) {
        self.watcher.detach();
    }

    /// Whether edge detection is running
    pub fn is_watching(&self) -> bool {
        self.watcher.is_attached()
    }

    /// Wait for one edge and return the level sampled after it
    ///
    /// Blocks the calling thread; inside an async runtime use
    /// [`wait_for_edge`](Self::wait_for_edge).
    pub fn blocking_wait_for_edge(&mut self, edge: Edge) -> Result<bool> {
        let source = self.prepare_watch(edge)?;
        self.watcher.wait_one(source)
    }

    /// Async form of [`blocking_wait_for_edge`](Self::blocking_wait_for_edge)
    pub async fn wait_for_edge(&mut self, edge: Edge) -> Result<bool> {
        let source = self.prepare_watch(edge)?;
        self.wait_with(source).await
    }

    async fn wait_with<S: LevelSource>(&self, source: S) -> Result<bool> {
        let mut events = self.watcher.attach(source)?;
        let value = events.recv().await;
        self.watcher.detach();
        value.ok_or_else(watch_ended)
    }

    /// Stop any running watch, switch to input, write `edge` and hand out a
    /// second handle on the value file for the delivery thread
    fn prepare_watch(&mut self, edge: Edge) -> Result<ValueSource> {
        self.arm(edge)?;
        let file = open_value(&mut self.value, &self.value_path)?;
        Ok(ValueSource(file.try_clone().at(&self.value_path)?))
    }

    fn arm(&mut self, edge: Edge) -> Result<()> {
        self.watcher.detach();
        self.set_direction(Direction::In)?;
        self.set_edge(edge)
    }
}

fn open_value<'a>(slot: &'a mut Option<File>, path: &Path) -> Result<&'a mut File> {
    let file = match slot.take() {
        Some(file) => file,
        None => OpenOptions::new().read(true).write(true).open(path).at(path)?,
    };
    Ok(slot.insert(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::edge::tests::{Driver, Pulser};
    use crate::pins::BeagleBoneBlack;
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// A fake gpio class directory with gpio60 already present
    fn fake_tree() -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let config = Config::rooted_at(dir.path());
        let gpio60 = config.gpio_dir(60);
        fs::create_dir_all(&gpio60).unwrap();
        fs::write(config.gpio_root.join("export"), "").unwrap();
        fs::write(config.gpio_root.join("unexport"), "").unwrap();
        fs::write(gpio60.join("direction"), "in\n").unwrap();
        fs::write(gpio60.join("value"), "0\n").unwrap();
        fs::write(gpio60.join("edge"), "none\n").unwrap();
        (dir, config)
    }

    #[test]
    fn test_export_writes_line_number() {
        let (_dir, config) = fake_tree();
        let pin = GpioPin::export(&config, &BeagleBoneBlack, "P9_12").unwrap();
        assert_eq!(pin.line(), 60);
        assert_eq!(fs::read_to_string(config.gpio_root.join("export")).unwrap(), "60");
    }

    #[test]
    fn test_export_unknown_pin() {
        let (_dir, config) = fake_tree();
        match GpioPin::export(&config, &BeagleBoneBlack, "P9_99") {
            Err(Error::PinNotFound(name)) => assert_eq!(name, "P9_99"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("export should fail"),
        }
        assert_eq!(fs::read_to_string(config.gpio_root.join("export")).unwrap(), "");
    }

    #[test]
    fn test_export_analog_only_pin() {
        let (_dir, config) = fake_tree();
        assert!(matches!(
            GpioPin::export(&config, &BeagleBoneBlack, "AIN0"),
            Err(Error::PinNotFound(_))
        ));
    }

    #[test]
    fn test_direction_round_trip() {
        let (_dir, config) = fake_tree();
        let pin = GpioPin::export_line(&config, 60).unwrap();
        assert_eq!(pin.direction().unwrap(), Direction::In);
        pin.set_direction(Direction::Out).unwrap();
        assert_eq!(pin.direction().unwrap(), Direction::Out);
        pin.set_direction(Direction::In).unwrap();
        assert_eq!(pin.direction().unwrap(), Direction::In);
    }

    #[test]
    fn test_value_round_trip() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        assert!(!pin.value().unwrap());
        pin.set_value(true).unwrap();
        assert!(pin.value().unwrap());
        pin.set_value(false).unwrap();
        assert!(!pin.value().unwrap());
    }

    #[test]
    fn test_value_file_is_cached() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_value(true).unwrap();

        // the open handle survives the directory entry going away
        fs::remove_file(config.gpio_dir(60).join("value")).unwrap();
        assert!(pin.value().unwrap());
    }

    #[test]
    fn test_set_edge() {
        let (_dir, config) = fake_tree();
        let pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_edge(Edge::Both).unwrap();
        assert_eq!(fs::read_to_string(config.gpio_dir(60).join("edge")).unwrap(), "both");
    }

    #[test]
    fn test_failed_edge_detect_leaves_no_watch() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_direction(Direction::Out).unwrap();

        // a regular file cannot be registered with epoll
        assert!(matches!(
            pin.add_edge_detect(Edge::Rising),
            Err(Error::Notification(_))
        ));
        assert!(!pin.is_watching());
        assert_eq!(pin.direction().unwrap(), Direction::In);
        assert_eq!(fs::read_to_string(config.gpio_dir(60).join("edge")).unwrap(), "rising");

        pin.remove_edge_detect();
        pin.remove_edge_detect();
    }

    #[test]
    fn test_unexport() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_value(true).unwrap();
        pin.unexport().unwrap();
        assert_eq!(fs::read_to_string(config.gpio_root.join("unexport")).unwrap(), "60");
    }

    /// Descriptors of this process currently open on `path`
    fn open_handles(path: &Path) -> usize {
        let target = fs::canonicalize(path).unwrap();
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| fs::read_link(entry.ok()?.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[test]
    fn test_blocking_wait_returns_first_edge() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_direction(Direction::Out).unwrap();

        let driver = Driver::new(false);
        let line = driver.line();
        let pulser = Pulser::start(driver, true);

        pin.arm(Edge::Rising).unwrap();
        assert!(matches!(pin.watcher.wait_one(line), Ok(true)));
        assert!(!pin.is_watching());
        assert_eq!(pin.direction().unwrap(), Direction::In);
        assert_eq!(fs::read_to_string(config.gpio_dir(60).join("edge")).unwrap(), "rising");

        // the delivery thread has released its source
        assert_eq!(pulser.stop().live_lines(), 0);
    }

    #[tokio::test]
    async fn test_async_wait_returns_first_edge() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();

        let driver = Driver::new(true);
        let line = driver.line();
        let pulser = Pulser::start(driver, false);

        pin.arm(Edge::Falling).unwrap();
        let level = tokio::time::timeout(Duration::from_secs(2), pin.wait_with(line))
            .await
            .unwrap();
        assert!(matches!(level, Ok(false)));
        assert!(!pin.is_watching());
        assert_eq!(pulser.stop().live_lines(), 0);
    }

    #[test]
    fn test_unexport_stops_running_watch() {
        let (_dir, config) = fake_tree();
        let value_path = config.gpio_dir(60).join("value");
        let mut pin = GpioPin::export_line(&config, 60).unwrap();
        pin.set_value(false).unwrap();
        assert_eq!(open_handles(&value_path), 1);

        let mut driver = Driver::new(false);
        pin.arm(Edge::Both).unwrap();
        let mut events = pin.watcher.attach(driver.line()).unwrap();
        assert!(pin.is_watching());
        driver.edge(true);
        assert_eq!(events.blocking_recv(), Some(true));

        pin.unexport().unwrap();
        assert_eq!(events.blocking_recv(), None);
        assert_eq!(driver.live_lines(), 0);
        assert_eq!(open_handles(&value_path), 0);
        assert_eq!(fs::read_to_string(config.gpio_root.join("unexport")).unwrap(), "60");
    }

    #[test]
    fn test_rearming_replaces_previous_watch() {
        let (_dir, config) = fake_tree();
        let mut pin = GpioPin::export_line(&config, 60).unwrap();

        let first_driver = Driver::new(false);
        pin.arm(Edge::Rising).unwrap();
        let mut first = pin.watcher.attach(first_driver.line()).unwrap();

        let mut second_driver = Driver::new(false);
        pin.arm(Edge::Falling).unwrap();
        assert_eq!(first.blocking_recv(), None);
        assert_eq!(first_driver.live_lines(), 0);

        let mut second = pin.watcher.attach(second_driver.line()).unwrap();
        second_driver.edge(false);
        assert_eq!(second.blocking_recv(), Some(false));
        pin.remove_edge_detect();
        assert!(!pin.is_watching());
    }
}
