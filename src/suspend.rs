//! Suspend controller: block the targets, silence nuisance signals, wait in
//! `sigsuspend` until a target is caught, then put everything back.
//!
//! The states are separate types so a transition can only be taken once:
//! `SuspendController` (idle) -> `Armed` -> `Waiting` -> settled.
//! Each state owns a `Restore` record of what it changed; dropping a state on
//! an error path undoes those changes, `Waiting::settle` undoes them and
//! reports failures.
use crate::caught;
use crate::signame::SignalId;
use nix::errno::Errno;
use nix::libc::{self, c_int};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr;
use tracing::{debug, info, warn};

/// Signals that would otherwise kill, stop or wake the process mid-wait.
/// Ignored for the duration of the wait unless they are targets.
pub const NUISANCE_SIGNALS: [Signal; 9] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGCHLD,
    Signal::SIGTSTP,
];

/// The non-empty, de-duplicated set of signals to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    signals: Vec<SignalId>,
}

impl TargetSet {
    /// Returns `None` when no signals are given.
    pub fn new(signals: impl IntoIterator<Item = SignalId>) -> Option<Self> {
        let mut signals: Vec<SignalId> = signals.into_iter().collect();
        signals.sort();
        signals.dedup();
        if signals.is_empty() {
            None
        } else {
            Some(Self { signals })
        }
    }

    pub fn single(signal: SignalId) -> Self {
        Self {
            signals: vec![signal],
        }
    }

    pub fn contains(&self, signal: SignalId) -> bool {
        self.signals.binary_search(&signal).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.signals.iter().copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.signals.len()
    }
}

impl fmt::Display for TargetSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, signal) in self.signals.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{signal}")?;
        }
        Ok(())
    }
}

/// Errors raised while arming, waiting or restoring. All are fatal.
#[derive(Debug)]
pub enum SuspendError {
    /// The OS refused the target's handler (e.g. SIGKILL, SIGSTOP).
    InstallHandler { signal: SignalId, source: Errno },
    /// The target could not be added to the blocking mask.
    BuildMask { signal: SignalId, source: Errno },
    /// Blocking the targets failed.
    Block { source: Errno },
    /// Setting a nuisance signal to ignore failed.
    Ignore { signal: Signal, source: Errno },
    /// `sigsuspend` failed with something other than EINTR.
    Wait { source: Errno },
    /// Restoring the saved signal mask failed.
    Unblock { source: Errno },
    /// Restoring a saved disposition failed.
    Restore { signal: SignalId, source: Errno },
}

impl fmt::Display for SuspendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspendError::InstallHandler { signal, source } => {
                write!(f, "cannot install handler for {}: {}", signal, source.desc())
            }
            SuspendError::BuildMask { signal, source } => {
                write!(f, "cannot add {} to signal mask: {}", signal, source.desc())
            }
            SuspendError::Block { source } => {
                write!(f, "cannot block target signals: {}", source.desc())
            }
            SuspendError::Ignore { signal, source } => {
                write!(f, "cannot ignore {}: {}", signal, source.desc())
            }
            SuspendError::Wait { source } => {
                write!(f, "wait for signal failed: {}", source.desc())
            }
            SuspendError::Unblock { source } => {
                write!(f, "cannot restore signal mask: {}", source.desc())
            }
            SuspendError::Restore { signal, source } => {
                write!(f, "cannot restore disposition of {}: {}", signal, source.desc())
            }
        }
    }
}

impl std::error::Error for SuspendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SuspendError::InstallHandler { source, .. }
            | SuspendError::BuildMask { source, .. }
            | SuspendError::Block { source }
            | SuspendError::Ignore { source, .. }
            | SuspendError::Wait { source }
            | SuspendError::Unblock { source }
            | SuspendError::Restore { source, .. } => Some(source),
        }
    }
}

/// A `sigset_t` that can hold any signal number, realtime ones included.
#[derive(Clone, Copy)]
struct RawSigSet(libc::sigset_t);

impl RawSigSet {
    fn empty() -> Self {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // sigemptyset cannot fail for a valid pointer.
        unsafe {
            libc::sigemptyset(set.as_mut_ptr());
            Self(set.assume_init())
        }
    }

    fn add(&mut self, signo: c_int) -> Result<(), Errno> {
        Errno::result(unsafe { libc::sigaddset(&mut self.0, signo) }).map(drop)
    }

    fn remove(&mut self, signo: c_int) -> Result<(), Errno> {
        Errno::result(unsafe { libc::sigdelset(&mut self.0, signo) }).map(drop)
    }
}

fn install_handler(signo: c_int) -> Result<libc::sigaction, Errno> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = caught::on_signal as extern "C" fn(c_int) as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    let mut previous = MaybeUninit::<libc::sigaction>::uninit();
    Errno::result(unsafe { libc::sigaction(signo, &action, previous.as_mut_ptr()) })?;
    Ok(unsafe { previous.assume_init() })
}

/// Changes made so far, undone in reverse order of acquisition.
struct Restore {
    handlers: Vec<(SignalId, libc::sigaction)>,
    mask: Option<RawSigSet>,
    dispositions: Vec<(Signal, SigAction)>,
}

impl Restore {
    fn new() -> Self {
        Self {
            handlers: Vec::new(),
            mask: None,
            dispositions: Vec::new(),
        }
    }

    /// Undo everything recorded. Keeps going past failures and returns the first.
    fn run(&mut self) -> Result<(), SuspendError> {
        let mut first_error = None;

        for (signal, previous) in self.dispositions.drain(..).rev() {
            if let Err(source) = unsafe { sigaction(signal, &previous) } {
                first_error.get_or_insert(SuspendError::Restore {
                    signal: signal.into(),
                    source,
                });
            } else {
                debug!(signal = %signal, "restored disposition");
            }
        }

        caught::reset();

        if let Some(saved) = self.mask.take() {
            let rc = unsafe { libc::sigprocmask(libc::SIG_SETMASK, &saved.0, ptr::null_mut()) };
            if let Err(source) = Errno::result(rc) {
                first_error.get_or_insert(SuspendError::Unblock { source });
            } else {
                debug!("restored signal mask");
            }
        }

        for (signal, previous) in self.handlers.drain(..).rev() {
            caught::unregister(signal.raw());
            let rc = unsafe { libc::sigaction(signal.raw(), &previous, ptr::null_mut()) };
            if let Err(source) = Errno::result(rc) {
                first_error.get_or_insert(SuspendError::Restore { signal, source });
            } else {
                debug!(signal = %signal, "restored handler");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Restore {
    fn drop(&mut self) {
        if let Err(e) = self.run() {
            warn!(error = %e, "failed to restore signal state");
        }
    }
}

/// Idle: nothing has been touched yet.
pub struct SuspendController {
    targets: TargetSet,
    nuisances: Vec<Signal>,
}

impl SuspendController {
    pub fn new(targets: TargetSet, nuisances: &[Signal]) -> Self {
        Self {
            targets,
            nuisances: nuisances.to_vec(),
        }
    }

    /// Install a handler for every target and build the blocking mask.
    pub fn arm(self) -> Result<Armed, SuspendError> {
        let mut restore = Restore::new();
        let mut mask = RawSigSet::empty();

        for signal in self.targets.iter() {
            let signo = signal.raw();
            if !caught::register(signo) {
                return Err(SuspendError::InstallHandler {
                    signal,
                    source: Errno::EINVAL,
                });
            }
            let previous = match install_handler(signo) {
                Ok(previous) => previous,
                Err(source) => {
                    caught::unregister(signo);
                    return Err(SuspendError::InstallHandler { signal, source });
                }
            };
            restore.handlers.push((signal, previous));
            mask.add(signo)
                .map_err(|source| SuspendError::BuildMask { signal, source })?;
            debug!(signal = %signal, "installed handler");
        }

        Ok(Armed {
            targets: self.targets,
            nuisances: self.nuisances,
            mask,
            restore,
        })
    }
}

/// Handlers installed; targets not yet blocked.
pub struct Armed {
    targets: TargetSet,
    nuisances: Vec<Signal>,
    mask: RawSigSet,
    restore: Restore,
}

impl Armed {
    /// Block the targets, ignore nuisance signals and clear the caught flag.
    pub fn block(mut self) -> Result<Waiting, SuspendError> {
        let mut saved = MaybeUninit::<libc::sigset_t>::uninit();
        let rc = unsafe { libc::sigprocmask(libc::SIG_BLOCK, &self.mask.0, saved.as_mut_ptr()) };
        Errno::result(rc).map_err(|source| SuspendError::Block { source })?;
        let saved = RawSigSet(unsafe { saved.assume_init() });
        self.restore.mask = Some(saved);
        debug!(targets = %self.targets, "blocked target signals");

        // Suspend with the saved mask, minus any target it already blocked.
        let mut suspend_mask = saved;
        for signal in self.targets.iter() {
            suspend_mask
                .remove(signal.raw())
                .map_err(|source| SuspendError::BuildMask { signal, source })?;
        }

        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        for &signal in &self.nuisances {
            if self.targets.contains(signal.into()) {
                continue;
            }
            let previous = unsafe { sigaction(signal, &ignore) }
                .map_err(|source| SuspendError::Ignore { signal, source })?;
            self.restore.dispositions.push((signal, previous));
            debug!(signal = %signal, "ignoring nuisance signal");
        }

        caught::reset();

        Ok(Waiting {
            targets: self.targets,
            suspend_mask,
            restore: self.restore,
        })
    }
}

/// Targets blocked, nuisances ignored; ready to suspend.
pub struct Waiting {
    targets: TargetSet,
    suspend_mask: RawSigSet,
    restore: Restore,
}

impl Waiting {
    /// Suspend until a target's handler has run. Unbounded.
    ///
    /// `sigsuspend` swaps in the wait mask and pauses atomically, so a target
    /// cannot slip in between unblocking and pausing. Wakeups that leave the
    /// flag clear (unrelated handlers) loop back into the wait.
    pub fn wait(&mut self) -> Result<Option<SignalId>, SuspendError> {
        while !caught::is_caught() {
            let rc = unsafe { libc::sigsuspend(&self.suspend_mask.0) };
            match Errno::result(rc) {
                Ok(_) | Err(Errno::EINTR) => {}
                Err(source) => return Err(SuspendError::Wait { source }),
            }
        }
        let caught = caught::last_caught();
        Ok(self.targets.iter().find(|t| Some(t.raw()) == caught))
    }

    /// Restore nuisance dispositions, clear the flag, restore the saved mask
    /// and the targets' previous handlers.
    pub fn settle(self) -> Result<(), SuspendError> {
        let Waiting { mut restore, .. } = self;
        restore.run()
    }
}

/// Run one full cycle: arm, block, wait for the first target, settle.
pub fn wait_for_any(
    targets: TargetSet,
    nuisances: &[Signal],
) -> Result<Option<SignalId>, SuspendError> {
    let mut waiting = SuspendController::new(targets.clone(), nuisances)
        .arm()?
        .block()?;

    info!("waiting for {targets}");
    let caught = waiting.wait()?;
    waiting.settle()?;
    Ok(caught)
}
