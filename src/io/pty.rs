// src/io/pty.rs

use anyhow::{Context, Result};
use std::ffi::CString;
use std::io::{Error as IoError, Read, Result as IoResult, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, fork, setsid, ForkResult, Pid};

/// Configuration for spawning a PTY.
#[derive(Debug, Clone)]
pub struct PtyConfig<'a> {
    /// The executable to run (e.g., "/bin/sh").
    pub command_executable: &'a str,
    /// Arguments to the executable.
    pub args: &'a [&'a str],
    /// Initial columns.
    pub initial_cols: u16,
    /// Initial rows.
    pub initial_rows: u16,
}

/// A child process attached to the slave side of a freshly allocated PTY.
///
/// The parent keeps the master descriptor. Writes go to the child's input;
/// the child's output is read from the master, usually through a duplicate
/// obtained with [`NixPty::try_clone_fd`].
#[derive(Debug)]
pub struct NixPty {
    master_fd: OwnedFd,
    child_pid: Pid,
}

impl NixPty {
    /// Spawns a new process connected to a PTY using the given configuration.
    ///
    /// This forks the process, creates a new session in the child, makes the
    /// PTY slave its controlling terminal, and executes the command. The
    /// slave keeps its default (cooked, echoing) line discipline.
    pub fn spawn_with_config(config: &PtyConfig) -> Result<Self> {
        let winsize = Winsize {
            ws_row: config.initial_rows,
            ws_col: config.initial_cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty_results = openpty(Some(&winsize), None)
            .with_context(|| "Failed to open PTY (nix::pty::openpty call)")?;
        let master_fd = pty_results.master;
        let slave_fd = pty_results.slave;

        // Everything the child needs is prepared before fork, so the child
        // only performs async-signal-safe work.
        let command_cst = CString::new(config.command_executable).with_context(|| {
            format!(
                "Failed to create CString for command: {}",
                config.command_executable
            )
        })?;
        let arg0 = config
            .command_executable
            .rsplit('/')
            .next()
            .unwrap_or(config.command_executable);
        let mut args_cst_vec = vec![CString::new(arg0)
            .with_context(|| "Failed to create CString for command name (arg0)")?];
        for arg in config.args {
            args_cst_vec.push(
                CString::new(*arg)
                    .with_context(|| format!("Failed to create CString for argument: {}", arg))?,
            );
        }

        match unsafe { fork() }.with_context(|| "Failed to fork process")? {
            ForkResult::Parent { child, .. } => {
                drop(slave_fd); // Parent closes its copy of slave PTY
                log::debug!(
                    "Parent: Forked child with PID {}, PTY master FD {}",
                    child,
                    master_fd.as_raw_fd()
                );
                Ok(NixPty {
                    master_fd,
                    child_pid: child,
                })
            }
            ForkResult::Child => {
                drop(master_fd); // Child closes its copy of master PTY
                Self::exec_child(slave_fd, &command_cst, &args_cst_vec)
            }
        }
    }

    /// Runs in the forked child. Never returns.
    fn exec_child(slave_fd: OwnedFd, command: &CString, args: &[CString]) -> ! {
        if let Err(e) = Self::attach_to_slave(slave_fd) {
            eprintln!("Child: {:#}", e);
            unsafe { libc::_exit(1) };
        }
        let exec_err = match execvp(command.as_c_str(), args) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        eprintln!("Child: Failed to execute command {:?}: {}", command, exec_err);
        unsafe { libc::_exit(1) }
    }

    fn attach_to_slave(slave_fd: OwnedFd) -> Result<()> {
        setsid().with_context(|| "Failed to create new session")?;

        let slave_raw_fd = slave_fd.as_raw_fd();
        if unsafe { libc::ioctl(slave_raw_fd, libc::TIOCSCTTY as _, 0) } == -1 {
            return Err(anyhow::Error::from(nix::Error::last())
                .context("Failed to set PTY slave as controlling terminal (ioctl TIOCSCTTY)"));
        }

        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if unsafe { libc::dup2(slave_raw_fd, target) } == -1 {
                return Err(anyhow::Error::from(nix::Error::last())
                    .context(format!("Failed to dup slave PTY onto fd {}", target)));
            }
        }
        // openpty never hands out 0, 1 or 2, so the original slave fd is
        // distinct and must be closed here.
        drop(slave_fd);
        Ok(())
    }

    /// Duplicates the master descriptor, e.g. to hand a read side to the
    /// event dispatcher while this handle keeps writing.
    pub fn try_clone_fd(&self) -> Result<OwnedFd> {
        self.master_fd.try_clone().with_context(|| {
            format!(
                "Failed to duplicate PTY master fd {}",
                self.master_fd.as_raw_fd()
            )
        })
    }

    pub fn child_pid(&self) -> Pid {
        self.child_pid
    }
}

impl Drop for NixPty {
    fn drop(&mut self) {
        let pid = self.child_pid;
        log::debug!(
            "NixPty drop: Cleaning up PTY master_fd: {} (child_pid: {})",
            self.master_fd.as_raw_fd(),
            pid
        );

        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                log::debug!(
                    "NixPty drop: Child process {} is still alive. Sending SIGHUP.",
                    pid
                );
                if let Err(e) = kill(pid, Some(Signal::SIGHUP)) {
                    log::warn!(
                        "NixPty drop: Failed to send SIGHUP to child process {}: {}",
                        pid,
                        e
                    );
                }
            }
            Ok(status) => {
                log::debug!(
                    "NixPty drop: Child process {} already exited or changed state: {:?}",
                    pid,
                    status
                );
            }
            Err(e) => {
                if matches!(e, nix::Error::ECHILD | nix::Error::ESRCH) {
                    log::debug!(
                        "NixPty drop: Child process {} already reaped (waitpid error: {}).",
                        pid,
                        e
                    );
                } else {
                    log::warn!(
                        "NixPty drop: Error checking child process {} status with waitpid: {}",
                        pid,
                        e
                    );
                }
            }
        }
    }
}

impl Read for NixPty {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        match nix::unistd::read(&self.master_fd, buf) {
            Ok(bytes_read) => {
                log::trace!(
                    "NixPty::read read {} bytes from fd {}",
                    bytes_read,
                    self.master_fd.as_raw_fd()
                );
                Ok(bytes_read)
            }
            // The slave side is gone once the child exits.
            Err(nix::Error::EIO) => Ok(0),
            Err(nix_err) => Err(IoError::from(nix_err)),
        }
    }
}

impl Write for NixPty {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let bytes_written = nix::unistd::write(&self.master_fd, buf).map_err(IoError::from)?;
        log::trace!(
            "NixPty::write wrote {} bytes to fd {}",
            bytes_written,
            self.master_fd.as_raw_fd()
        );
        Ok(bytes_written)
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl AsRawFd for NixPty {
    fn as_raw_fd(&self) -> RawFd {
        self.master_fd.as_raw_fd()
    }
}

impl AsFd for NixPty {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.master_fd.as_fd()
    }
}
