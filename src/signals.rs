//! Signal routing between the shell and its jobs.
//!
//! Handlers installed here never touch shell state: they only set atomic
//! flags. The main loop consumes the flags at its safe points (the foreground
//! wait and the per-prompt background poll), which is where all job-table
//! mutation happens.

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction, signal};
use nix::unistd::{getpid, setpgid, tcsetpgrp};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPT_PENDING: AtomicBool = AtomicBool::new(false);
static CHILD_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    INTERRUPT_PENDING.store(true, Ordering::Relaxed);
}

extern "C" fn on_sigchld(_: libc::c_int) {
    CHILD_PENDING.store(true, Ordering::Relaxed);
}

/// Install the shell's signal configuration.
///
/// When `interactive`, the shell is moved into its own process group and
/// takes the terminal, and the job-control signals that the terminal would
/// otherwise aim at it (`SIGTTOU` from `tcsetpgrp`, `SIGTSTP` from Ctrl-Z,
/// `SIGQUIT`) are ignored.
///
/// `SIGINT` and `SIGCHLD` get flag-setting handlers installed without
/// `SA_RESTART`, so a blocked `waitpid` wakes up with `EINTR` when either
/// arrives and the wait loop can consume the flag.
pub fn install(interactive: bool) -> nix::Result<()> {
    if interactive {
        let shell = getpid();
        // May fail if we are already a session leader; both are fine.
        let _ = setpgid(shell, shell);
        unsafe {
            signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
            signal(Signal::SIGTSTP, SigHandler::SigIgn)?;
            signal(Signal::SIGQUIT, SigHandler::SigIgn)?;
        }
        tcsetpgrp(io::stdin(), shell)?;
    }

    let flags = SaFlags::empty();
    unsafe {
        sigaction(
            Signal::SIGINT,
            &SigAction::new(SigHandler::Handler(on_sigint), flags, SigSet::empty()),
        )?;
        sigaction(
            Signal::SIGCHLD,
            &SigAction::new(SigHandler::Handler(on_sigchld), flags, SigSet::empty()),
        )?;
    }
    Ok(())
}

/// Consume a pending termination request, returning whether one was set.
pub fn take_interrupt() -> bool {
    INTERRUPT_PENDING.swap(false, Ordering::Relaxed)
}

/// Consume a pending child-state-change notification.
pub fn take_child_event() -> bool {
    CHILD_PENDING.swap(false, Ordering::Relaxed)
}

/// Restore default dispositions in a forked child, before `execve`.
///
/// The child must react normally to job-control signals even though the
/// shell itself ignores or intercepts them.
pub fn reset_child_dispositions() {
    let defaults = [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ];
    for sig in defaults {
        unsafe {
            let _ = signal(sig, SigHandler::SigDfl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_consumed_once() {
        INTERRUPT_PENDING.store(true, Ordering::Relaxed);
        assert!(take_interrupt());
        assert!(!take_interrupt());

        CHILD_PENDING.store(true, Ordering::Relaxed);
        assert!(take_child_event());
        assert!(!take_child_event());
    }
}
