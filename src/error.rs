//! Error taxonomy.
//!
//! Most of the failure modes a native test runner has to deal with are not
//! recoverable in any meaningful sense to a caller: a failed `fork()` or a
//! reaped pid the scheduler never dispatched means the process environment
//! itself is broken. Those are logged and turned into a process abort rather
//! than threaded through `Result` call chains. `PartestError` covers the
//! subset that a caller of the library API can sensibly recover from: bad
//! options and a shared-cell allocation the OS refused.

use thiserror::Error;

/// Errors that can be returned from the library's public entry points.
#[derive(Debug, Error)]
pub enum PartestError {
    /// CLI/environment option parsing failed.
    #[error("{0}")]
    OptionParse(String),

    /// The OS refused to map a new shared cell.
    #[error("failed to allocate shared cell: {0}")]
    SharedCellExhausted(#[source] std::io::Error),

    /// A second scheduler attempted to take over the signal arbiter while
    /// one was already installed.
    #[error("signal arbiter already owned by another scheduler")]
    SignalArbiterAlreadyOwned,

    /// Installing the signal arbiter's handlers or blocking `SIGCHLD` failed.
    #[error("signal arbiter setup failed: {0}")]
    SignalSetup(String),

    /// `waitpid` reaped a pid the scheduler has no job slot for.
    #[error("reaped unknown child pid {0}")]
    ChildNotFound(i32),
}

/// Log and abort the process. Used for the kind of unrecoverable OS-call
/// error that leaves the runner's bookkeeping inconsistent if execution
/// continues.
pub fn fatal(context: &str, err: impl std::fmt::Display) -> ! {
    tracing::error!(%context, %err, "fatal system failure, aborting runner");
    eprintln!("partest: fatal: {}: {}", context, err);
    std::process::exit(70);
}
