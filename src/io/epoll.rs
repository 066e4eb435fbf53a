// src/io/epoll.rs

//! This module provides a wrapper around `epoll` functionality using raw `libc`
//! FFI calls for managing and polling file descriptors for I/O events.
//! Timers are backed by `timerfd` descriptors owned by the monitor.

use bitflags::bitflags;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::io::event::{Poller, MAX_EVENTS};
use crate::io::source::{Interest, Token};

const EPOLL_CREATE_CLOEXEC: libc::c_int = libc::O_CLOEXEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EpollCtlOp {
    Add = libc::EPOLL_CTL_ADD,
    Mod = libc::EPOLL_CTL_MOD,
    Del = libc::EPOLL_CTL_DEL,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EpollFlags: u32 {
        const EPOLLIN = libc::EPOLLIN as u32;
        const EPOLLOUT = libc::EPOLLOUT as u32;
        const EPOLLONESHOT = libc::EPOLLONESHOT as u32;
    }
}

fn new_libc_epoll_event(flags: EpollFlags, token: Token) -> libc::epoll_event {
    libc::epoll_event {
        events: flags.bits(),
        u64: token as u64,
    }
}

fn duration_to_timespec(interval: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: interval.as_secs() as libc::time_t,
        tv_nsec: interval.subsec_nanos() as _,
    }
}

/// Creates a non-blocking monotonic timerfd that first expires after
/// `interval` and then every `interval`.
fn create_interval_timer(interval: Duration) -> io::Result<OwnedFd> {
    let raw = unsafe {
        libc::timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
        )
    };
    if raw == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: timerfd_create returned a fresh descriptor that nothing else owns.
    let timer = unsafe { OwnedFd::from_raw_fd(raw) };

    let period = duration_to_timespec(interval);
    let spec = libc::itimerspec {
        it_interval: period,
        it_value: period,
    };
    if unsafe { libc::timerfd_settime(timer.as_raw_fd(), 0, &spec, std::ptr::null_mut()) } == -1
    {
        return Err(io::Error::last_os_error());
    }
    Ok(timer)
}

/// Consumes the expiration counter so a level-triggered timerfd stops
/// reporting readiness until the next expiration.
fn drain_timer(timer: &OwnedFd) {
    let mut expirations = [0u8; 8];
    let n = unsafe {
        libc::read(
            timer.as_raw_fd(),
            expirations.as_mut_ptr() as *mut libc::c_void,
            expirations.len(),
        )
    };
    if n == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock {
            warn!("Failed to drain timerfd {}: {}", timer.as_raw_fd(), err);
        }
    } else {
        trace!(
            "timerfd {} expired {} time(s)",
            timer.as_raw_fd(),
            u64::from_ne_bytes(expirations)
        );
    }
}

#[derive(Debug)]
pub struct EventMonitor {
    epoll_fd: RawFd,
    event_buffer: [libc::epoll_event; MAX_EVENTS],
    timers: HashMap<Token, OwnedFd>,
}

impl EventMonitor {
    pub fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(EPOLL_CREATE_CLOEXEC) };
        if epoll_fd == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("EventMonitor created with epoll_fd: {}", epoll_fd);
        Ok(Self {
            epoll_fd,
            event_buffer: [unsafe { std::mem::zeroed() }; MAX_EVENTS],
            timers: HashMap::new(),
        })
    }

    fn ctl(&self, op: EpollCtlOp, fd: RawFd, token: Token, flags: EpollFlags) -> io::Result<()> {
        let mut event = new_libc_epoll_event(flags, token);
        if unsafe { libc::epoll_ctl(self.epoll_fd, op as libc::c_int, fd, &mut event) } == -1 {
            return Err(io::Error::last_os_error());
        }
        trace!(
            "epoll_ctl {:?} fd {} on epoll_fd {} with token {} and flags {:?}",
            op,
            fd,
            self.epoll_fd,
            token,
            flags
        );
        Ok(())
    }
}

impl Poller for EventMonitor {
    fn register(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        match interest {
            Interest::Readable(fd) => {
                self.ctl(EpollCtlOp::Add, fd.as_raw_fd(), token, EpollFlags::EPOLLIN)
            }
            Interest::Writable(fd) => self.ctl(
                EpollCtlOp::Add,
                fd.as_raw_fd(),
                token,
                EpollFlags::EPOLLOUT | EpollFlags::EPOLLONESHOT,
            ),
            Interest::Timer(interval) => {
                let timer = create_interval_timer(*interval)?;
                self.ctl(EpollCtlOp::Add, timer.as_raw_fd(), token, EpollFlags::EPOLLIN)?;
                debug!(
                    "Armed timerfd {} every {:?} (token {})",
                    timer.as_raw_fd(),
                    interval,
                    token
                );
                self.timers.insert(token, timer);
                Ok(())
            }
        }
    }

    fn rearm(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        match interest {
            Interest::Writable(fd) => self.ctl(
                EpollCtlOp::Mod,
                fd.as_raw_fd(),
                token,
                EpollFlags::EPOLLOUT | EpollFlags::EPOLLONESHOT,
            ),
            _ => Ok(()),
        }
    }

    fn deregister(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        match interest {
            Interest::Readable(fd) | Interest::Writable(fd) => {
                self.ctl(EpollCtlOp::Del, fd.as_raw_fd(), token, EpollFlags::empty())
            }
            Interest::Timer(_) => match self.timers.remove(&token) {
                Some(timer) => {
                    self.ctl(EpollCtlOp::Del, timer.as_raw_fd(), token, EpollFlags::empty())
                }
                None => Ok(()),
            },
        }
    }

    fn wait(&mut self, ready: &mut Vec<Token>) -> io::Result<()> {
        ready.clear();
        trace!("EventMonitor: waiting on epoll_fd {}", self.epoll_fd);

        let num_events = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.event_buffer.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                -1,
            )
        };

        if num_events == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("EventMonitor: epoll_wait interrupted (EINTR), no events.");
                return Ok(());
            }
            return Err(err);
        }

        trace!(
            "EventMonitor: epoll_wait on fd {} returned {} events",
            self.epoll_fd,
            num_events
        );
        for event in &self.event_buffer[..num_events as usize] {
            let token = event.u64 as Token;
            if let Some(timer) = self.timers.get(&token) {
                drain_timer(timer);
            }
            ready.push(token);
        }
        Ok(())
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        // Timer descriptors close with the map.
        self.timers.clear();
        if unsafe { libc::close(self.epoll_fd) } == -1 {
            warn!(
                "Failed to close epoll_fd {} in EventMonitor::drop: {}",
                self.epoll_fd,
                io::Error::last_os_error()
            );
        } else {
            debug!("Closed epoll_fd {} in EventMonitor::drop", self.epoll_fd);
        }
    }
}
