//! Edge detection
//!
//! sysfs only offers "block until the value file becomes readable, then read
//! it". [`EdgeWatcher`] turns that into a stream of level samples:
//!
//! - registration fires once with the current state; that wake is consumed
//!   before the stream is handed out, so only real changes are delivered
//! - a dedicated thread owns the epoll instance and loops wait -> read -> send
//! - the watcher keeps the write end of a pipe whose read end sits in the same
//!   epoll set; dropping it hangs up the pipe, which wakes the thread and ends
//!   the loop even while it is blocked in the kernel
//!
//! At most one watch is live per watcher. Attaching again, detaching, or
//! dropping the watcher stops the previous delivery thread and joins it, so
//! an old stream never sees another event once any of those return.

use super::epoll::{self, Epoll, CANCEL_EVENTS, EDGE_EVENTS};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

pub use tokio::sync::mpsc::error::TryRecvError;

const SOURCE_TOKEN: u64 = 0;
const CANCEL_TOKEN: u64 = 1;

/// Something whose readiness signals a level change
///
/// The fd must report readiness immediately after it is added to an epoll
/// set, as sysfs attribute files do; that first report is discarded.
pub trait LevelSource: AsFd + Send + 'static {
    /// Sample the current level after a wake
    fn read_level(&mut self) -> io::Result<bool>;
}

/// Level samples from an attached watcher
///
/// The stream ends (`None`) once the watcher is detached and every sample
/// already delivered has been consumed.
#[derive(Debug)]
pub struct EdgeEvents {
    rx: mpsc::UnboundedReceiver<bool>,
}

impl EdgeEvents {
    /// Wait for the next sample
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }

    /// Block the current thread until the next sample
    ///
    /// Panics if called from within an async runtime; use [`recv`](Self::recv)
    /// there.
    pub fn blocking_recv(&mut self) -> Option<bool> {
        self.rx.blocking_recv()
    }

    /// Take a sample if one is already queued
    ///
    /// `Empty` means nothing is queued yet; `Disconnected` means the stream
    /// has ended.
    pub fn try_recv(&mut self) -> std::result::Result<bool, TryRecvError> {
        self.rx.try_recv()
    }
}

/// A running delivery thread
struct Watch {
    /// Dropping this hangs up the pipe the thread is also waiting on
    cancel: OwnedFd,
    thread: JoinHandle<()>,
}

impl Watch {
    fn stop(self) {
        drop(self.cancel);
        if self.thread.join().is_err() {
            warn!("edge delivery thread panicked");
        }
    }
}

/// Owns at most one delivery thread
#[derive(Default)]
pub struct EdgeWatcher {
    slot: Mutex<Option<Watch>>,
}

impl EdgeWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Watch>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a delivery thread is attached and still running
    ///
    /// Turns false once the thread has exited on its own (its receiver was
    /// dropped or the wait failed), even before `detach` is called.
    pub fn is_attached(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|watch| !watch.thread.is_finished())
    }

    /// Start delivering level samples from `source`
    ///
    /// Any previous watch is stopped first. On error nothing is left
    /// registered and no thread is running.
    pub fn attach<S: LevelSource>(&self, source: S) -> Result<EdgeEvents> {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            debug!("replacing existing edge watch");
            previous.stop();
        }

        let epoll = Epoll::new().map_err(Error::Notification)?;
        let (cancel_rx, cancel_tx) = epoll::pipe().map_err(Error::Notification)?;
        epoll
            .add(source.as_fd(), EDGE_EVENTS, SOURCE_TOKEN)
            .map_err(Error::Notification)?;
        epoll
            .add(cancel_rx.as_fd(), CANCEL_EVENTS, CANCEL_TOKEN)
            .map_err(Error::Notification)?;

        // the first wake reports the state at registration, not an edge
        let mut events = [epoll::empty_event(); 2];
        epoll.wait(&mut events).map_err(Error::Notification)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("boneio-edge".to_string())
            .spawn(move || deliver(epoll, cancel_rx, source, tx))
            .map_err(Error::Notification)?;

        *slot = Some(Watch {
            cancel: cancel_tx,
            thread,
        });
        debug!("edge watch armed");
        Ok(EdgeEvents { rx })
    }

    /// Attach, take the first level sample, then detach
    ///
    /// Blocks the calling thread until an edge arrives.
    pub fn wait_one<S: LevelSource>(&self, source: S) -> Result<bool> {
        let mut events = self.attach(source)?;
        let level = events.blocking_recv();
        self.detach();
        level.ok_or_else(watch_ended)
    }

    /// Stop the delivery thread, if any
    ///
    /// Idempotent; safe to call from any thread while samples are flowing.
    pub fn detach(&self) {
        // take under the lock, join outside it
        let watch = self.lock().take();
        if let Some(watch) = watch {
            watch.stop();
            debug!("edge watch stopped");
        }
    }
}

impl Drop for EdgeWatcher {
    fn drop(&mut self) {
        self.detach();
    }
}

pub(crate) fn watch_ended() -> Error {
    Error::Notification(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "edge watch ended before an edge arrived",
    ))
}

fn deliver<S: LevelSource>(
    epoll: Epoll,
    _cancel: OwnedFd,
    mut source: S,
    tx: mpsc::UnboundedSender<bool>,
) {
    let mut events = [epoll::empty_event(); 2];
    loop {
        let n = match epoll.wait(&mut events) {
            Ok(n) => n,
            Err(e) => {
                debug!("edge wait failed: {}", e);
                break;
            }
        };

        let cancelled = events[..n].iter().any(|event| {
            let token = event.u64;
            token == CANCEL_TOKEN
        });
        if cancelled {
            break;
        }

        match source.read_level() {
            Ok(level) => {
                if tx.send(level).is_err() {
                    // receiver dropped
                    break;
                }
            }
            Err(e) => debug!("edge level read failed: {}", e),
        }
    }
}
