use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use log::warn;
use nix::sys::signal::{sigaction, signal, SaFlags, SigAction, SigHandler, SigSet, Signal};

// Backing store for the foreground handle. A plain atomic so the SIGTSTP
// handler can read it without locking.
static FOREGROUND_PGID: AtomicI32 = AtomicI32::new(0);

/// Handle to the current foreground process group, owned by the execution
/// context. Set when a pipeline/subshell group is launched in the
/// foreground, cleared when its wait returns; SIGTSTP arriving at the shell
/// is forwarded to whatever group is set.
#[derive(Default)]
pub struct Foreground;

impl Foreground {
    pub fn set(&self, pgid: i32) {
        FOREGROUND_PGID.store(pgid, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        FOREGROUND_PGID.store(0, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i32> {
        match FOREGROUND_PGID.load(Ordering::SeqCst) {
            0 => None,
            pgid => Some(pgid),
        }
    }
}

extern "C" fn forward_sigtstp(_sig: libc::c_int) {
    let pgid = FOREGROUND_PGID.load(Ordering::SeqCst);
    if pgid > 0 {
        // Async-signal-safe: only the raw kill(2).
        unsafe {
            libc::kill(-pgid, libc::SIGTSTP);
        }
    }
}

/// Interactive setup: the shell itself shrugs off SIGINT/SIGQUIT and relays
/// SIGTSTP to the foreground group instead of stopping.
pub fn install_interactive_handlers() {
    let forward = SigAction::new(
        SigHandler::Handler(forward_sigtstp),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        if let Err(e) = sigaction(Signal::SIGTSTP, &forward) {
            warn!("sigaction(SIGTSTP): {}", e);
        }
        if let Err(e) = sigaction(Signal::SIGINT, &ignore) {
            warn!("sigaction(SIGINT): {}", e);
        }
        if let Err(e) = sigaction(Signal::SIGQUIT, &ignore) {
            warn!("sigaction(SIGQUIT): {}", e);
        }
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn note_interrupt(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Script setup: SIGINT raises a flag the runner polls between lines
/// instead of killing the whole script process mid-command.
pub fn install_script_handlers() {
    let note = SigAction::new(
        SigHandler::Handler(note_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        if let Err(e) = sigaction(Signal::SIGINT, &note) {
            warn!("sigaction(SIGINT): {}", e);
        }
    }
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Restore default dispositions in a forked child before it execs or runs
/// subshell code.
pub fn reset_child_signals() {
    unsafe {
        let _ = signal(Signal::SIGINT, SigHandler::SigDfl);
        let _ = signal(Signal::SIGQUIT, SigHandler::SigDfl);
        let _ = signal(Signal::SIGTSTP, SigHandler::SigDfl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreground_lifecycle() {
        let fg = Foreground;
        fg.clear();
        assert_eq!(fg.get(), None);
        fg.set(1234);
        assert_eq!(fg.get(), Some(1234));
        fg.clear();
        assert_eq!(fg.get(), None);
    }
}
