//! The `run` command.
//!
//! Loads the configuration, attaches to (or launches) a browser, and
//! drives the advance engine until interrupted.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::config::loader;
use crate::config::schema::BrowserSettings;
use crate::dom::browser::BrowserSession;
use crate::error::{BrowserError, SlideSkipError};

/// Attach to a browser and run the advance engine until cancelled.
///
/// # Errors
///
/// Returns a config error when loading fails, and a browser error when
/// no target is reachable. Engine-level DOM failures never surface here;
/// they are contained within poll cycles.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), SlideSkipError> {
    let load = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "loading configuration");
            loader::load(path)?
        }
        None => loader::load_defaults()?,
    };
    for warning in &load.warnings {
        warn!("{warning}");
    }

    if !load.config.enabled {
        info!("engine disabled by configuration; nothing to do");
        return Ok(());
    }

    let settings = merge_browser_settings(&load.config.browser, args);
    if settings.connect_url.is_none() && !settings.launch {
        return Err(BrowserError::NoTarget(
            "pass --connect <ws-url> or --launch, or set browser.connect_url".to_string(),
        )
        .into());
    }

    let session = BrowserSession::attach(&settings).await?;
    session.run(Arc::clone(&load.config), cancel).await?;
    session.close().await;
    Ok(())
}

/// CLI flags override the file's browser settings; picking a target on
/// the command line also clears the other mode.
fn merge_browser_settings(base: &BrowserSettings, args: &RunArgs) -> BrowserSettings {
    let mut settings = base.clone();
    if let Some(url) = &args.connect {
        settings.connect_url = Some(url.clone());
        settings.launch = false;
    }
    if args.launch {
        settings.launch = true;
        settings.connect_url = None;
    }
    if let Some(chrome) = &args.chrome {
        settings.chrome_path = Some(chrome.clone());
    }
    if args.headless {
        settings.headless = true;
    }
    settings
}
