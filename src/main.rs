mod caught;
mod config;
mod signame;
mod suspend;

use clap::{CommandFactory, Parser};
use config::{LogLevel, WaitConfig};
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Block until one of the given signals arrives, then exit cleanly.
///
/// Common interactive and job-control signals are ignored while waiting
/// unless they are among the targets. All dispositions and the signal mask
/// are restored before exit.
#[derive(Parser, Debug)]
#[command(name = "wait-for-signal", version, about)]
pub struct Cli {
    /// Signals to wait for: a number, a name with or without SIG
    /// (any case), or SIGRTMIN+n / SIGRTMAX-n (default: USR1)
    #[arg(value_name = "SIGSPEC", allow_negative_numbers = true)]
    sigspecs: Vec<String>,

    /// List signal numbers and names, then exit
    #[arg(short, long)]
    list: bool,

    /// Resolve the signals and print them, don't wait
    #[arg(long)]
    dry_run: bool,

    /// Log every arm/block/restore step
    #[arg(short, long)]
    verbose: bool,

    /// Only errors; no "waiting for" status
    #[arg(short, long)]
    quiet: bool,
}

/// Basename of the invoked program, for the usage line.
fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wait-for-signal".to_string())
}

fn usage() -> String {
    Cli::command()
        .bin_name(program_name())
        .render_usage()
        .to_string()
}

fn print_signal_table() {
    for (signal, name) in signame::named_signals() {
        println!("{:>2} {}", signal.raw(), name);
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version go to stdout and succeed; anything else is a usage error.
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.directive()))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    if cli.list {
        print_signal_table();
        return ExitCode::SUCCESS;
    }

    let config = match WaitConfig::from_specs(&cli.sigspecs) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(?config, "resolved settings");

    if cli.dry_run {
        for signal in config.targets.iter() {
            println!("{:>2} {}", signal.raw(), signal);
        }
        return ExitCode::SUCCESS;
    }

    match suspend::wait_for_any(config.targets, &config.nuisances) {
        Ok(caught) => {
            if let Some(signal) = caught {
                tracing::info!(signal = %signal, "caught target signal");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
