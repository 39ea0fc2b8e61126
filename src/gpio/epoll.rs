//! Minimal epoll and pipe wrappers
//!
//! Every descriptor is an `OwnedFd`, so dropping a wrapper closes it exactly
//! once.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

/// Readiness bits for a sysfs value file
///
/// sysfs signals a change with `POLLPRI`; edge-triggered so a wake is only
/// reported once per change.
pub(crate) const EDGE_EVENTS: u32 = (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLET) as u32;

/// Readiness bits for the cancellation pipe (hang-up is always reported)
pub(crate) const CANCEL_EVENTS: u32 = libc::EPOLLIN as u32;

pub(crate) fn empty_event() -> libc::epoll_event {
    libc::epoll_event { events: 0, u64: 0 }
}

/// An epoll instance
pub(crate) struct Epoll {
    fd: OwnedFd,
}

impl Epoll {
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Register `fd`; `token` comes back in the event's `u64` field
    pub(crate) fn add(&self, fd: BorrowedFd<'_>, events: u32, token: u64) -> io::Result<()> {
        let mut event = libc::epoll_event { events, u64: token };
        let rc = unsafe {
            libc::epoll_ctl(
                self.fd.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                fd.as_raw_fd(),
                &mut event,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Block until at least one registered fd is ready; retries on EINTR
    pub(crate) fn wait(&self, events: &mut [libc::epoll_event]) -> io::Result<usize> {
        loop {
            let n = unsafe {
                libc::epoll_wait(
                    self.fd.as_raw_fd(),
                    events.as_mut_ptr(),
                    events.len() as libc::c_int,
                    -1,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

/// A close-on-exec pipe as (read end, write end)
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn test_closing_write_end_wakes_reader() {
        let epoll = Epoll::new().unwrap();
        let (rx, tx) = pipe().unwrap();
        epoll.add(rx.as_fd(), CANCEL_EVENTS, 7).unwrap();

        drop(tx);

        let mut events = [empty_event(); 1];
        let n = epoll.wait(&mut events).unwrap();
        assert_eq!(n, 1);
        let token = events[0].u64;
        let bits = events[0].events;
        assert_eq!(token, 7);
        assert_ne!(bits & libc::EPOLLHUP as u32, 0);
    }
}
