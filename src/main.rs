//! `SlideSkip` — auto-advance engine for gated e-learning slide players

use clap::Parser;
use tokio_util::sync::CancellationToken;

use slideskip::cli::args::{Cli, LogFormatChoice};
use slideskip::cli::commands;
use slideskip::error::ExitCode;
use slideskip::observability::{LogFormat, init_logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        let format = match cli.log_format {
            LogFormatChoice::Human => LogFormat::Human,
            LogFormatChoice::Json => LogFormat::Json,
        };
        init_logging(format, cli.verbose, cli.color);
    }

    let cancel = CancellationToken::new();

    // Signal handler: first signal requests graceful shutdown, second forces exit
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }

            eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
            cancel.cancel();

            tokio::select! {
                _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
                _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
            }
        }
    });

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
