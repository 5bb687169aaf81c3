use crate::signame::{self, ResolveError};
use crate::suspend::{TargetSet, NUISANCE_SIGNALS};
use nix::sys::signal::Signal;

/// Resolved settings for one invocation. Built from the command line only;
/// there is no config file and no environment lookup.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub targets: TargetSet,
    pub nuisances: Vec<Signal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors and warnings only; no "waiting for" status.
    Quiet,
    #[default]
    Normal,
    /// Every arm/block/restore step.
    Verbose,
}

impl LogLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (true, _) => LogLevel::Verbose,
            (false, true) => LogLevel::Quiet,
            (false, false) => LogLevel::Normal,
        }
    }

    /// Filter directive handed to `EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Quiet => "warn",
            LogLevel::Normal => "info",
            LogLevel::Verbose => "debug",
        }
    }
}

impl WaitConfig {
    /// Resolve every sigspec; the first that fails aborts. No specs means SIGUSR1.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self, ResolveError> {
        let resolved = specs
            .iter()
            .map(|spec| signame::resolve(spec.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let targets = TargetSet::new(resolved).unwrap_or_else(default_targets);

        Ok(Self {
            targets,
            ..Default::default()
        })
    }
}

fn default_targets() -> TargetSet {
    TargetSet::single(Signal::SIGUSR1.into())
}

// --- Default implementations ---

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            nuisances: NUISANCE_SIGNALS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signame::SignalId;

    #[test]
    fn test_no_specs_defaults_to_usr1() {
        let config = WaitConfig::from_specs::<&str>(&[]).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert!(config.targets.contains(Signal::SIGUSR1.into()));
    }

    #[test]
    fn test_specs_resolved_in_order() {
        let config = WaitConfig::from_specs(&["TERM", "2", "hup"]).unwrap();
        let got: Vec<SignalId> = config.targets.iter().collect();
        let want: Vec<SignalId> = vec![Signal::SIGHUP.into(), Signal::SIGINT.into(), Signal::SIGTERM.into()];
        assert_eq!(got, want);
    }

    #[test]
    fn test_first_bad_spec_aborts() {
        let err = WaitConfig::from_specs(&["TERM", "bogus", "also-bad"]).unwrap_err();
        assert_eq!(err.spec, "bogus");
    }

    #[test]
    fn test_default_nuisances() {
        let config = WaitConfig::default();
        assert_eq!(config.nuisances, NUISANCE_SIGNALS.to_vec());
        assert!(config.targets.contains(Signal::SIGUSR1.into()));
    }

    #[test]
    fn test_log_level_defaults_to_normal() {
        assert_eq!(LogLevel::default(), LogLevel::Normal);
    }

    #[test]
    fn test_log_level_flags() {
        assert_eq!(LogLevel::from_flags(false, false).directive(), "info");
        assert_eq!(LogLevel::from_flags(true, false).directive(), "debug");
        assert_eq!(LogLevel::from_flags(false, true).directive(), "warn");
        assert_eq!(LogLevel::from_flags(true, true), LogLevel::Verbose);
    }
}
