//! Signal arbiter.
//!
//! At scheduler startup this installs handlers for `SIGINT`/`SIGTERM` that
//! tear the pool down and re-raise to the default disposition, and blocks
//! `SIGCHLD` on the main thread so the scheduler can wait for a reapable
//! child with a bounded, interruptible sleep. Exactly one scheduler may hold
//! the arbiter at a time.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::time::Duration;

use crate::error::PartestError;
#[cfg(feature = "fork")]
use crate::scheduler::Scheduler;

static OWNED: AtomicBool = AtomicBool::new(false);
#[cfg(feature = "fork")]
static CURRENT_SCHEDULER: AtomicPtr<Scheduler> = AtomicPtr::new(std::ptr::null_mut());

/// Converts a signal name (as given to `#[partest::test(signal = "ABRT")]`)
/// into its numeric value. Accepts names with or without the `SIG` prefix.
pub fn name_to_number(name: &str) -> i32 {
    let upper = name.trim_start_matches("SIG").to_uppercase();
    #[cfg(unix)]
    {
        use nix::sys::signal::Signal;
        let full = format!("SIG{}", upper);
        if let Ok(sig) = full.parse::<Signal>() {
            return sig as i32;
        }
    }
    match upper.as_str() {
        "ABRT" => libc::SIGABRT,
        "SEGV" => libc::SIGSEGV,
        "KILL" => libc::SIGKILL,
        "TERM" => libc::SIGTERM,
        "INT" => libc::SIGINT,
        "FPE" => libc::SIGFPE,
        "ILL" => libc::SIGILL,
        "BUS" => libc::SIGBUS,
        "ALRM" => libc::SIGALRM,
        "PIPE" => libc::SIGPIPE,
        "QUIT" => libc::SIGQUIT,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        _ => 0,
    }
}

#[cfg(feature = "fork")]
mod imp {
    use super::*;
    use nix::sys::signal::{self, SigHandler, SigSet, Signal};

    extern "C" fn handle_terminate(sig: libc::c_int) {
        let ptr = CURRENT_SCHEDULER.load(Ordering::SeqCst);
        if !ptr.is_null() {
            let scheduler = unsafe { &*ptr };
            scheduler.terminate_all();
        }
        unsafe {
            signal::signal(
                Signal::try_from(sig).unwrap(),
                SigHandler::SigDfl,
            )
            .ok();
            libc::raise(sig);
        }
    }

    /// Installs `INT`/`TERM` handlers and blocks `CHILD` on this thread.
    /// Errors with `SignalArbiterAlreadyOwned` if another scheduler already
    /// holds the arbiter.
    pub fn takeover(scheduler: &Scheduler) -> Result<(), PartestError> {
        if OWNED.swap(true, Ordering::SeqCst) {
            return Err(PartestError::SignalArbiterAlreadyOwned);
        }
        CURRENT_SCHEDULER.store(scheduler as *const _ as *mut _, Ordering::SeqCst);
        unsafe {
            let handler = SigHandler::Handler(handle_terminate);
            signal::sigaction(
                Signal::SIGINT,
                &signal::SigAction::new(
                    handler,
                    signal::SaFlags::empty(),
                    SigSet::empty(),
                ),
            )
            .map_err(|e| {
                PartestError::SignalSetup(format!("sigaction(SIGINT): {e}"))
            })?;
            signal::sigaction(
                Signal::SIGTERM,
                &signal::SigAction::new(
                    handler,
                    signal::SaFlags::empty(),
                    SigSet::empty(),
                ),
            )
            .map_err(|e| {
                PartestError::SignalSetup(format!("sigaction(SIGTERM): {e}"))
            })?;

            let mut set = SigSet::empty();
            set.add(Signal::SIGCHLD);
            set.thread_block()
                .map_err(|e| PartestError::SignalSetup(format!("sigprocmask: {e}")))?;
        }
        Ok(())
    }

    /// Reverses `takeover`: restores default dispositions and unblocks
    /// `CHILD`.
    pub fn reset() {
        unsafe {
            let _ = signal::signal(Signal::SIGINT, SigHandler::SigDfl);
            let _ = signal::signal(Signal::SIGTERM, SigHandler::SigDfl);
            let mut set = SigSet::empty();
            set.add(Signal::SIGCHLD);
            let _ = set.thread_unblock();
        }
        CURRENT_SCHEDULER.store(std::ptr::null_mut(), Ordering::SeqCst);
        OWNED.store(false, Ordering::SeqCst);
    }

    /// Waits up to `timeout` for a `SIGCHLD` to arrive, otherwise returns
    /// once the timeout elapses. Used by the scheduler's main loop to avoid
    /// busy-spinning while still promptly noticing reapable children.
    ///
    /// `SIGCHLD` must already be blocked (via `takeover`) for this to be
    /// meaningful: `sigtimedwait` only dequeues signals that are blocked.
    #[cfg(target_os = "linux")]
    pub fn child_wait(timeout: Duration) {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGCHLD);
            let ts = libc::timespec {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_nsec: timeout.subsec_nanos() as libc::c_long,
            };
            let mut info: libc::siginfo_t = std::mem::zeroed();
            libc::sigtimedwait(&set, &mut info, &ts);
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn child_wait(timeout: Duration) {
        std::thread::sleep(timeout);
    }
}

#[cfg(not(feature = "fork"))]
mod imp {
    use super::*;

    /// No scheduler exists to arbitrate for without the `fork` feature;
    /// kept only so the module always exposes the same three names.
    pub fn takeover() -> Result<(), PartestError> {
        if OWNED.swap(true, Ordering::SeqCst) {
            return Err(PartestError::SignalArbiterAlreadyOwned);
        }
        Ok(())
    }

    pub fn reset() {
        OWNED.store(false, Ordering::SeqCst);
    }

    pub fn child_wait(timeout: Duration) {
        std::thread::sleep(timeout);
    }
}

pub use imp::{child_wait, reset, takeover};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_signal_names_resolve() {
        assert_eq!(name_to_number("ABRT"), libc::SIGABRT);
        assert_eq!(name_to_number("SIGABRT"), libc::SIGABRT);
    }
}
