//! Process-wide state shared with the signal handler.
//!
//! The handler runs in async-signal context, so everything here is a
//! lock-free atomic: no allocation, no I/O, no locks.
use nix::libc::c_int;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Set by the handler when a registered target is delivered.
static CAUGHT: AtomicBool = AtomicBool::new(false);

/// Bit `n - 1` set for every registered signal `n` (signals 1..=64).
static REGISTERED: AtomicU64 = AtomicU64::new(0);

/// Number of the most recently caught target, 0 if none.
static LAST_CAUGHT: AtomicI32 = AtomicI32::new(0);

fn bit(signo: c_int) -> Option<u64> {
    match signo {
        1..=64 => Some(1u64 << (signo - 1)),
        _ => None,
    }
}

/// Add `signo` to the set the handler accepts. Returns false if it cannot be tracked.
pub fn register(signo: c_int) -> bool {
    match bit(signo) {
        Some(b) => {
            REGISTERED.fetch_or(b, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

pub fn unregister(signo: c_int) {
    if let Some(b) = bit(signo) {
        REGISTERED.fetch_and(!b, Ordering::SeqCst);
    }
}

pub fn is_registered(signo: c_int) -> bool {
    bit(signo).is_some_and(|b| REGISTERED.load(Ordering::SeqCst) & b != 0)
}

pub fn is_caught() -> bool {
    CAUGHT.load(Ordering::SeqCst)
}

pub fn reset() {
    CAUGHT.store(false, Ordering::SeqCst);
}

pub fn last_caught() -> Option<c_int> {
    match LAST_CAUGHT.load(Ordering::SeqCst) {
        0 => None,
        signo => Some(signo),
    }
}

/// Installed for every target. Ignores deliveries outside the registered set.
pub extern "C" fn on_signal(signo: c_int) {
    if is_registered(signo) {
        LAST_CAUGHT.store(signo, Ordering::SeqCst);
        CAUGHT.store(true, Ordering::SeqCst);
    }
}
