//! Child process: fork/exec wrapper with pipe capture, process-group
//! placement, non-blocking drain, and graceful-then-forceful termination.

#![cfg(feature = "fork")]

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup2, fork, pipe, read, setpgid, ForkResult, Pid};

use crate::error::fatal;

/// The outcome of a completed, reaped child.
pub struct Exit {
    pub status: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

fn new_pipe_nonblocking_read() -> (RawFd, RawFd) {
    let (r, w) = pipe().unwrap_or_else(|e| fatal("pipe", e));
    let flags = fcntl(r, FcntlArg::F_GETFL).unwrap_or_else(|e| fatal("fcntl(F_GETFL)", e));
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(r, FcntlArg::F_SETFL(flags)).unwrap_or_else(|e| fatal("fcntl(F_SETFL)", e));
    (r, w)
}

/// A forked child: its pid, and (if captured) the parent's non-blocking read
/// ends plus drain accumulators.
pub struct Child {
    pid: Pid,
    stdout_r: Option<RawFd>,
    stderr_r: Option<RawFd>,
    stdout_buf: String,
    stderr_buf: String,
}

impl Child {
    /// Forks. In the child, stdio is redirected onto the capture pipes (if
    /// `capture`), the process joins its own group (if `new_pgid`), and
    /// `child_body` runs; it is expected to terminate the process itself
    /// (via the job's exit strategy) rather than return. In the parent,
    /// returns a `Child` handle and waits (busy-poll, ≤10ms) for the child
    /// to have committed its new pgid before returning, when `new_pgid` is
    /// set, to avoid a race with group-directed signals sent later.
    pub fn fork<F: FnOnce()>(capture: bool, new_pgid: bool, child_body: F) -> Child {
        let stdout_pipe = capture.then(new_pipe_nonblocking_read);
        let stderr_pipe = capture.then(new_pipe_nonblocking_read);

        match unsafe { fork() }.unwrap_or_else(|e| fatal("fork", e)) {
            ForkResult::Child => {
                if let Some((r, w)) = stdout_pipe {
                    let _ = dup2(w, libc::STDOUT_FILENO);
                    let _ = close(r);
                    let _ = close(w);
                }
                if let Some((r, w)) = stderr_pipe {
                    let _ = dup2(w, libc::STDERR_FILENO);
                    let _ = close(r);
                    let _ = close(w);
                }
                if new_pgid {
                    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                }
                child_body();
                // A child_body that returns instead of exiting explicitly is
                // a caller bug; exit nonzero so the parent notices rather
                // than hanging in waitpid.
                std::process::exit(70);
            }
            ForkResult::Parent { child } => {
                let stdout_r = stdout_pipe.map(|(r, w)| {
                    let _ = close(w);
                    r
                });
                let stderr_r = stderr_pipe.map(|(r, w)| {
                    let _ = close(w);
                    r
                });
                if new_pgid {
                    wait_for_pgid(child);
                }
                Child {
                    pid: child,
                    stdout_r,
                    stderr_r,
                    stdout_buf: String::new(),
                    stderr_buf: String::new(),
                }
            }
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// Drains both read pipes into the internal accumulators without
    /// blocking. Returns `true` while the child is (as far as the pipes
    /// show) still alive, i.e. neither end has hit EOF yet.
    pub fn flush_pipes(&mut self) -> bool {
        let out_open = drain(self.stdout_r, &mut self.stdout_buf);
        let err_open = drain(self.stderr_r, &mut self.stderr_buf);
        out_open || err_open
    }

    /// Sends `TERM`, polls for exit up to ~100ms in 1ms steps, then
    /// escalates to `KILL` directed at the child's process group so
    /// descendants die too.
    pub fn terminate(&mut self) {
        let _ = kill(self.pid, Signal::SIGTERM);
        let deadline = Instant::now() + Duration::from_millis(100);
        while Instant::now() < deadline {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                _ => return,
            }
        }
        let pgid = Pid::from_raw(-self.pid.as_raw());
        let _ = kill(pgid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }

    /// Finalizes a child already reaped by the scheduler's `waitpid` loop:
    /// one last pipe flush, then hand back accumulated output alongside the
    /// parsed exit/signal.
    pub fn reap(mut self, status: WaitStatus) -> Exit {
        self.flush_pipes();
        let (exit_status, signal) = match status {
            WaitStatus::Exited(_, code) => (Some(code), None),
            WaitStatus::Signaled(_, sig, _) => (None, Some(sig as i32)),
            _ => (None, None),
        };
        Exit {
            status: exit_status,
            signal,
            stdout: std::mem::take(&mut self.stdout_buf),
            stderr: std::mem::take(&mut self.stderr_buf),
        }
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if let Some(fd) = self.stdout_r.take() {
            let _ = close(fd);
        }
        if let Some(fd) = self.stderr_r.take() {
            let _ = close(fd);
        }
    }
}

fn drain(fd: Option<RawFd>, into: &mut String) -> bool {
    let fd = match fd {
        Some(fd) => fd,
        None => return false,
    };
    let mut buf = [0u8; 4096];
    loop {
        match read(fd, &mut buf) {
            Ok(0) => return false,
            Ok(n) => {
                into.push_str(&String::from_utf8_lossy(&buf[..n]));
                if n < buf.len() {
                    return true;
                }
            }
            Err(nix::errno::Errno::EAGAIN) => return true,
            Err(e) => fatal("read(pipe)", e),
        }
    }
}

fn wait_for_pgid(child: Pid) {
    let deadline = Instant::now() + Duration::from_millis(10);
    while Instant::now() < deadline {
        if let Ok(pgid) = nix::unistd::getpgid(Some(child)) {
            if pgid == child {
                return;
            }
        }
        std::thread::yield_now();
    }
}
