// src/io/kqueue.rs

//! This module provides a wrapper around `kqueue` functionality for macOS and
//! the BSDs, providing the same interface as the epoll module for Linux.
//! Timers use `EVFILT_TIMER` keyed by the registration token.

use log::{debug, trace, warn};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use crate::io::event::{Poller, MAX_EVENTS};
use crate::io::source::{Interest, Token};

fn new_kevent(ident: usize, filter: i16, flags: u16, data: i64, token: Token) -> libc::kevent {
    let mut kev: libc::kevent = unsafe { std::mem::zeroed() };
    kev.ident = ident as _;
    kev.filter = filter as _;
    kev.flags = flags as _;
    kev.data = data as _;
    kev.udata = token as _;
    kev
}

/// The kevent that describes `interest`, with the given action flags.
fn change_for(interest: &Interest, token: Token, flags: u16) -> libc::kevent {
    match interest {
        Interest::Readable(fd) => new_kevent(
            fd.as_raw_fd() as usize,
            libc::EVFILT_READ as i16,
            flags,
            0,
            token,
        ),
        Interest::Writable(fd) => new_kevent(
            fd.as_raw_fd() as usize,
            libc::EVFILT_WRITE as i16,
            flags | libc::EV_DISPATCH as u16,
            0,
            token,
        ),
        // Default timer unit is milliseconds.
        Interest::Timer(interval) => new_kevent(
            token,
            libc::EVFILT_TIMER as i16,
            flags,
            interval.as_millis() as i64,
            token,
        ),
    }
}

/// EventMonitor for macOS and BSD using kqueue
#[derive(Debug)]
pub struct EventMonitor {
    kqueue_fd: RawFd,
    kevents: [libc::kevent; MAX_EVENTS],
}

impl EventMonitor {
    pub fn new() -> io::Result<Self> {
        let kqueue_fd = unsafe { libc::kqueue() };
        if kqueue_fd == -1 {
            return Err(io::Error::last_os_error());
        }
        debug!("EventMonitor created with kqueue_fd: {}", kqueue_fd);
        Ok(Self {
            kqueue_fd,
            kevents: unsafe { std::mem::zeroed() },
        })
    }

    fn apply(&self, change: &libc::kevent) -> io::Result<()> {
        let ret = unsafe {
            libc::kevent(
                self.kqueue_fd,
                change,
                1,
                std::ptr::null_mut(),
                0,
                std::ptr::null(),
            )
        };
        if ret == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Poller for EventMonitor {
    fn register(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        let flags = (libc::EV_ADD | libc::EV_ENABLE) as u16;
        self.apply(&change_for(interest, token, flags))?;
        trace!(
            "Added {} to kqueue_fd {} with token {}",
            interest,
            self.kqueue_fd,
            token
        );
        Ok(())
    }

    fn rearm(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        match interest {
            Interest::Writable(_) => {
                self.apply(&change_for(interest, token, libc::EV_ENABLE as u16))
            }
            _ => Ok(()),
        }
    }

    fn deregister(&mut self, interest: &Interest, token: Token) -> io::Result<()> {
        self.apply(&change_for(interest, token, libc::EV_DELETE as u16))?;
        trace!("Deleted {} from kqueue_fd {}", interest, self.kqueue_fd);
        Ok(())
    }

    fn wait(&mut self, ready: &mut Vec<Token>) -> io::Result<()> {
        ready.clear();
        trace!("EventMonitor: waiting on kqueue_fd {}", self.kqueue_fd);

        let nev = unsafe {
            libc::kevent(
                self.kqueue_fd,
                std::ptr::null(),
                0,
                self.kevents.as_mut_ptr(),
                MAX_EVENTS as _,
                std::ptr::null(),
            )
        };

        if nev == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                // EINTR is not a fatal error, just report no events
                return Ok(());
            }
            return Err(err);
        }

        trace!("kevent returned {} events", nev);
        for kev in &self.kevents[..nev as usize] {
            ready.push(kev.udata as Token);
        }
        Ok(())
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        if unsafe { libc::close(self.kqueue_fd) } == -1 {
            warn!(
                "Failed to close kqueue_fd {}: {}",
                self.kqueue_fd,
                io::Error::last_os_error()
            );
        } else {
            debug!("Closed kqueue_fd {}", self.kqueue_fd);
        }
    }
}
