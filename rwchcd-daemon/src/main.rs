//! rwchcd — weather-compensated central-heating controller daemon.
//!
//! Loads the plant configuration, wires it to the reference hardware
//! backend, and runs the master control loop until asked to stop.

mod backend_ref;
mod master;
mod notifier;
mod scheduler;
mod setup;
mod timer;
mod watchdog;

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use signal_hook::consts::{SIGCHLD, SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use tracing::{error, info, warn};

use rwchcd_core::config::PlantConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOCK_PATH: &str = rwchcd_core::constants::paths::LOCK_FILE;
const DEFAULT_WDOG_TIMEOUT_S: u64 = rwchcd_core::constants::WDOG_DEFAULT_TIMEOUT_S;

fn print_usage() {
    eprintln!("rwchcd {VERSION} - weather-compensated heating controller");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    rwchcd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c <path>   use an alternate configuration file");
    eprintln!("    -t          test the configuration and exit");
    eprintln!("    -h          print this help");
    eprintln!("    -V          print version and exit");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    RWCHCD_LOG          log level (trace, debug, info, warn, error)");
    eprintln!("    RWCHCD_WDOGTM       watchdog timeout in seconds (default {DEFAULT_WDOG_TIMEOUT_S})");
}

fn print_version() {
    println!("rwchcd {VERSION}");
}

struct Args {
    config_path: Option<PathBuf>,
    test_only: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut test_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-t" => test_only = true,
            "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: -c requires a path argument");
                    std::process::exit(1);
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            other => {
                eprintln!("unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Args { config_path, test_only }
}

fn init_logging() {
    let filter = std::env::var(rwchcd_core::constants::env::LOG_FILTER).unwrap_or_else(|_| "info".to_string());
    let use_journald = Path::new("/run/systemd/journal/socket").exists();

    if use_journald {
        match tracing_journald::layer() {
            Ok(layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable ({e}), falling back to stdout logging"),
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Holds the lock file open for the process lifetime; dropping it
/// releases the advisory flock.
struct SingletonLock(#[allow(dead_code)] File);

fn acquire_lock() -> std::io::Result<SingletonLock> {
    let file = File::create(LOCK_PATH)?;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(SingletonLock(file))
}

/// Dumps the current configuration to stdout on SIGUSR1.
fn dump_config(config: &PlantConfig) {
    match serde_json::to_string_pretty(config) {
        Ok(text) => println!("{text}"),
        Err(e) => error!(error = %e, "failed to serialize configuration for SIGUSR1 dump"),
    }
}

fn run(args: Args) -> std::io::Result<()> {
    let config_path = match args.config_path {
        Some(p) => p,
        None => rwchcd_core::config::default_config_path()
            .unwrap_or_else(|_| PathBuf::from(rwchcd_core::constants::paths::DEFAULT_CONFIG_FILE)),
    };

    let config = match PlantConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(path = %config_path.display(), error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    if args.test_only {
        match setup::build(&config, 0) {
            Ok(_) => {
                println!("configuration OK");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("configuration error: {e}");
                std::process::exit(1);
            }
        }
    }

    let _lock = match acquire_lock() {
        Ok(lock) => lock,
        Err(e) => {
            error!(path = LOCK_PATH, error = %e, "another instance appears to be running");
            std::process::exit(1);
        }
    };

    info!(version = VERSION, path = %config_path.display(), "starting");

    let (backends, plant) = match setup::build(&config, 0) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to wire plant from configuration");
            std::process::exit(1);
        }
    };
    let runtime = rwchcd_core::runtime::Runtime::new(backends, plant);
    let schedule = scheduler::Schedule::new(config.schedule.clone());
    let runtime: rwchcd_core::runtime::Shared = Arc::new(parking_lot::RwLock::new(runtime));

    let signal = master::ShutdownSignal::new();
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1, SIGCHLD])
        .expect("failed to register signal handlers");

    let signal_for_thread = Arc::clone(&signal);
    let config_for_dump = config.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGINT | SIGTERM => {
                    info!(signal = sig, "received shutdown signal");
                    signal_for_thread.request_stop();
                    return;
                }
                SIGUSR1 => {
                    info!("received SIGUSR1, dumping configuration");
                    dump_config(&config_for_dump);
                }
                SIGCHLD => {
                    // Reap the alarm-notifier child; no zombies left behind.
                    loop {
                        let mut status = 0;
                        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
                        if pid <= 0 {
                            break;
                        }
                    }
                }
                _ => {}
            }
        }
    });

    let wdog_timeout_s = std::env::var(rwchcd_core::constants::env::WDOG_TIMEOUT)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WDOG_TIMEOUT_S);

    let mut notifier = notifier::ProcessNotifier::new(config.alarm_notifier.clone());

    match master::run(runtime, signal, wdog_timeout_s, &mut notifier, schedule, timer::default_jobs()) {
        Ok(()) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "master loop failed");
            std::process::exit(1);
        }
    }
}

fn main() {
    let args = parse_args();
    init_logging();
    if let Err(e) = run(args) {
        error!(error = %e, "fatal I/O error");
        std::process::exit(1);
    }
}
