use clap::Parser;
use std::panic::{self, PanicHookInfo};
use switchbot_listener::app::{Options, run_with_io};
use switchbot_listener::publish::HttpTransport;
use switchbot_listener::scanner::RealScanner;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Logs go to stderr so stdout carries only readings.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Process managers (systemd, Telegraf execd) rely on the exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_tracing(options.verbose);

    let transport = match HttpTransport::new() {
        Ok(transport) => transport,
        Err(why) => {
            error!(error = %why, "failed to build HTTP client");
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    };
    let scanner = RealScanner::new(options.backend);

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    match run_with_io(options, &scanner, &transport, &mut stdout, &mut stderr).await {
        Ok(summary) => {
            debug!(
                devices = summary.devices,
                published = summary.published,
                failed = summary.failed,
                "scan finished"
            );
            std::process::exit(EXIT_SUCCESS)
        }
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
