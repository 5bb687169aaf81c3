//! Signal name resolution: turn a user-supplied sigspec ("2", "INT",
//! "sigint", "SIGRTMIN+3", "RTMAX-1") into a signal number.
//!
//! Rules are applied in order, first match wins:
//! 1. A whole base-10 integer in `(0, N)` is taken as the number itself.
//! 2. `SIGRTMIN+k`, `RTMIN+k`, `SIGRTMAX-k`, `RTMAX-k` (any case) address the
//!    realtime range, where one exists on this platform.
//! 3. The name table is scanned for the full name or the name without `SIG`.
use nix::libc::c_int;
use nix::sys::signal::Signal;
use std::fmt;
use std::sync::LazyLock;

/// A signal number in `1..N`. May refer to a slot with no table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(c_int);

impl SignalId {
    pub fn raw(self) -> c_int {
        self.0
    }

    /// Canonical table name, or `None` for reserved slots.
    pub fn name(self) -> Option<&'static str> {
        let index = usize::try_from(self.0).ok()?;
        SIGNAL_NAMES.get(index).and_then(|n| n.as_deref())
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "signal {}", self.0),
        }
    }
}

impl From<Signal> for SignalId {
    fn from(sig: Signal) -> Self {
        SignalId(sig as c_int)
    }
}

/// A sigspec that matched none of the resolution rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub spec: String,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid signal specification: {:?}", self.spec)
    }
}

impl std::error::Error for ResolveError {}

/// Realtime anchors `(SIGRTMIN, SIGRTMAX)`, if the platform has a realtime range.
pub fn realtime_range() -> Option<(c_int, c_int)> {
    #[cfg(target_os = "linux")]
    {
        Some((nix::libc::SIGRTMIN(), nix::libc::SIGRTMAX()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// One past the highest valid signal number (`NSIG`).
pub fn signal_ceiling() -> c_int {
    match realtime_range() {
        Some((_, max)) => max + 1,
        None => Signal::iterator().map(|s| s as c_int).max().unwrap_or(0) + 1,
    }
}

/// Index = signal number. `None` marks slot 0 and reserved numbers.
static SIGNAL_NAMES: LazyLock<Vec<Option<String>>> = LazyLock::new(|| {
    let rt = realtime_range();
    (0..signal_ceiling()).map(|signo| table_name(signo, rt)).collect()
});

fn table_name(signo: c_int, rt: Option<(c_int, c_int)>) -> Option<String> {
    if signo == 0 {
        return None;
    }
    if let Ok(sig) = Signal::try_from(signo) {
        return Some(sig.as_str().to_string());
    }
    let (min, max) = rt?;
    if signo < min || signo > max {
        return None;
    }
    // Lower half counts up from RTMIN, upper half down from RTMAX (bash's naming).
    let name = if signo == min {
        "SIGRTMIN".to_string()
    } else if signo == max {
        "SIGRTMAX".to_string()
    } else if signo - min <= (max - min) / 2 {
        format!("SIGRTMIN+{}", signo - min)
    } else {
        format!("SIGRTMAX-{}", max - signo)
    };
    Some(name)
}

/// All named table entries in ascending signal order.
pub fn named_signals() -> impl Iterator<Item = (SignalId, &'static str)> {
    SIGNAL_NAMES
        .iter()
        .enumerate()
        .filter_map(|(i, name)| Some((SignalId(c_int::try_from(i).ok()?), name.as_deref()?)))
}

#[derive(Clone, Copy)]
enum Anchor {
    Min,
    Max,
}

const REALTIME_PREFIXES: [(&str, Anchor); 4] = [
    ("SIGRTMIN+", Anchor::Min),
    ("RTMIN+", Anchor::Min),
    ("SIGRTMAX-", Anchor::Max),
    ("RTMAX-", Anchor::Max),
];

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Resolve a sigspec to a signal number.
pub fn resolve(spec: &str) -> Result<SignalId, ResolveError> {
    let invalid = || ResolveError {
        spec: spec.to_string(),
    };

    // `parse` rejects trailing garbage, whitespace and i32 overflow.
    if let Ok(n) = spec.parse::<c_int>() {
        return if 0 < n && n < signal_ceiling() {
            Ok(SignalId(n))
        } else {
            Err(invalid())
        };
    }

    if let Some((min, max)) = realtime_range() {
        for (prefix, anchor) in REALTIME_PREFIXES {
            let Some(suffix) = strip_prefix_ignore_case(spec, prefix) else {
                continue;
            };
            let offset = suffix
                .parse::<c_int>()
                .ok()
                .filter(|k| (0..=max - min).contains(k))
                .ok_or_else(invalid)?;
            return Ok(SignalId(match anchor {
                Anchor::Min => min + offset,
                Anchor::Max => max - offset,
            }));
        }
    }

    named_signals()
        .find(|(_, name)| {
            name.eq_ignore_ascii_case(spec)
                || name
                    .strip_prefix("SIG")
                    .is_some_and(|short| short.eq_ignore_ascii_case(spec))
        })
        .map(|(id, _)| id)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_in_range_resolves_to_itself() {
        assert_eq!(resolve("2").unwrap().raw(), 2);
        assert_eq!(resolve("+10").unwrap().raw(), 10);
        let last = signal_ceiling() - 1;
        assert_eq!(resolve(&last.to_string()).unwrap().raw(), last);
    }

    #[test]
    fn test_decimal_out_of_range_fails() {
        assert!(resolve("0").is_err());
        assert!(resolve("-1").is_err());
        assert!(resolve(&signal_ceiling().to_string()).is_err());
    }

    #[test]
    fn test_partial_or_overflowing_integer_fails() {
        assert!(resolve("2x").is_err());
        assert!(resolve(" 2").is_err());
        assert!(resolve("99999999999").is_err());
        assert!(resolve("-99999999999").is_err());
    }

    #[test]
    fn test_full_and_short_names_any_case() {
        let int = Signal::SIGINT as c_int;
        for spec in ["SIGINT", "sigint", "SigInt", "INT", "int", "iNt"] {
            assert_eq!(resolve(spec).unwrap().raw(), int, "spec {spec}");
        }
        assert_eq!(
            resolve("usr1").unwrap(),
            SignalId::from(Signal::SIGUSR1)
        );
        assert_eq!(
            resolve("SIGTERM").unwrap(),
            SignalId::from(Signal::SIGTERM)
        );
    }

    #[test]
    fn test_every_table_name_resolves_to_its_index() {
        for (id, name) in named_signals() {
            assert_eq!(resolve(name).unwrap(), id, "name {name}");
            let short = name.strip_prefix("SIG").unwrap();
            assert_eq!(resolve(&short.to_lowercase()).unwrap(), id, "short {short}");
        }
    }

    #[test]
    fn test_garbage_fails() {
        assert!(resolve("").is_err());
        assert!(resolve("not-a-signal").is_err());
        assert!(resolve("SIG").is_err());
        assert!(resolve("SIGSIGINT").is_err());
    }

    #[test]
    fn test_error_carries_spec() {
        let err = resolve("bogus").unwrap_err();
        assert_eq!(err.spec, "bogus");
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_slot_zero_is_unnamed() {
        assert_eq!(SIGNAL_NAMES[0], None);
        assert!(named_signals().all(|(id, _)| id.raw() > 0));
    }

    #[test]
    fn test_display_uses_table_name() {
        assert_eq!(SignalId::from(Signal::SIGHUP).to_string(), "SIGHUP");
    }

    #[cfg(target_os = "linux")]
    mod realtime {
        use super::*;

        fn anchors() -> (c_int, c_int) {
            realtime_range().unwrap()
        }

        #[test]
        fn test_rtmin_offsets() {
            let (min, _) = anchors();
            assert_eq!(resolve("SIGRTMIN+3").unwrap().raw(), min + 3);
            assert_eq!(resolve("rtmin+0").unwrap().raw(), min);
            assert_eq!(resolve("SigRtMin+1").unwrap().raw(), min + 1);
        }

        #[test]
        fn test_rtmax_offsets() {
            let (_, max) = anchors();
            assert_eq!(resolve("RTMAX-2").unwrap().raw(), max - 2);
            assert_eq!(resolve("sigrtmax-0").unwrap().raw(), max);
        }

        #[test]
        fn test_bare_anchors_come_from_table() {
            let (min, max) = anchors();
            assert_eq!(resolve("SIGRTMIN").unwrap().raw(), min);
            assert_eq!(resolve("rtmax").unwrap().raw(), max);
        }

        #[test]
        fn test_offset_out_of_range_fails() {
            let (min, max) = anchors();
            assert!(999 > max - min);
            assert!(resolve("SIGRTMIN+999").is_err());
            assert!(resolve(&format!("RTMAX-{}", max - min + 1)).is_err());
            assert_eq!(
                resolve(&format!("RTMIN+{}", max - min)).unwrap().raw(),
                max
            );
        }

        #[test]
        fn test_malformed_offset_fails() {
            assert!(resolve("SIGRTMIN+").is_err());
            assert!(resolve("RTMIN+x").is_err());
            assert!(resolve("RTMAX--1").is_err());
            assert!(resolve("SIGRTMIN+1x").is_err());
        }

        #[test]
        fn test_realtime_names_split_at_midpoint() {
            let (min, max) = anchors();
            let half = (max - min) / 2;
            assert_eq!(
                SignalId(min + half).name().unwrap(),
                format!("SIGRTMIN+{half}")
            );
            assert_eq!(
                SignalId(min + half + 1).name().unwrap(),
                format!("SIGRTMAX-{}", max - min - half - 1)
            );
        }

        #[test]
        fn test_reserved_slots_below_rtmin_are_unnamed() {
            let (min, _) = anchors();
            for signo in 32..min {
                assert_eq!(SignalId(signo).name(), None);
                // Still addressable by number.
                assert_eq!(resolve(&signo.to_string()).unwrap().raw(), signo);
            }
        }
    }
}
