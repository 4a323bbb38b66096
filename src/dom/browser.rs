//! Browser session management.
//!
//! Attaches to a running Chromium over its DevTools websocket, or
//! launches one, then keeps one advance engine running per page target.
//! Pages come and go as the user navigates; a periodic rescan attaches
//! engines to new pages and cancels engines whose page closed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::config::schema::BrowserSettings;
use crate::dom::DomSurface;
use crate::dom::cdp::CdpDom;
use crate::engine::AdvanceController;
use crate::error::BrowserError;

/// A connection to one browser, owning the CDP event loop.
pub struct BrowserSession {
    browser: Browser,
    launched: bool,
}

impl BrowserSession {
    /// Connects to `connect_url` when set, otherwise launches a browser
    /// process when `launch` is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::NoTarget`] when the settings name neither
    /// mode, and connection or launch failures otherwise.
    pub async fn attach(settings: &BrowserSettings) -> Result<Self, BrowserError> {
        if let Some(url) = &settings.connect_url {
            let (browser, mut handler) = Browser::connect(url.as_str())
                .await
                .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    let _ = event;
                }
            });
            info!(url, "attached to running browser");
            return Ok(Self {
                browser,
                launched: false,
            });
        }

        if !settings.launch {
            return Err(BrowserError::NoTarget(
                "no connect_url configured and launch disabled".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });
        info!(headless = settings.headless, "browser launched");
        Ok(Self {
            browser,
            launched: true,
        })
    }

    /// Runs engines over the browser's pages until cancelled.
    ///
    /// # Errors
    ///
    /// Returns a protocol error when the page listing fails, which means
    /// the CDP connection is gone.
    pub async fn run(
        &self,
        config: Arc<EngineConfig>,
        cancel: CancellationToken,
    ) -> Result<(), BrowserError> {
        let mut engines: HashMap<TargetId, CancellationToken> = HashMap::new();
        let mut rescan = tokio::time::interval(config.timing.rescan_interval);
        rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = rescan.tick() => {
                    self.rescan_pages(&config, &cancel, &mut engines).await?;
                }
            }
        }

        for token in engines.values() {
            token.cancel();
        }
        Ok(())
    }

    async fn rescan_pages(
        &self,
        config: &Arc<EngineConfig>,
        cancel: &CancellationToken,
        engines: &mut HashMap<TargetId, CancellationToken>,
    ) -> Result<(), BrowserError> {
        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        let mut seen: HashSet<TargetId> = HashSet::with_capacity(pages.len());
        for page in pages {
            let id = page.target_id().clone();
            seen.insert(id.clone());
            if engines.contains_key(&id) {
                continue;
            }

            info!(page = ?id, "attaching engine to page");
            let child = cancel.child_token();
            engines.insert(id, child.clone());

            let dom: Arc<dyn DomSurface> =
                Arc::new(CdpDom::new(page, config.timing.mutation_poll));
            let mut controller = AdvanceController::new(dom, Arc::clone(config));
            tokio::spawn(async move {
                controller.run(child).await;
            });
        }

        engines.retain(|id, token| {
            if seen.contains(id) {
                true
            } else {
                debug!(page = ?id, "page closed; stopping its engine");
                token.cancel();
                false
            }
        });
        Ok(())
    }

    /// Shuts the session down. A browser we launched is closed; one we
    /// merely attached to is left running.
    pub async fn close(mut self) {
        if self.launched {
            if let Err(err) = self.browser.close().await {
                warn!(error = %err, "browser close failed");
            }
            if let Err(err) = self.browser.wait().await {
                warn!(error = %err, "browser wait failed");
            }
        }
    }
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("launched", &self.launched)
            .finish_non_exhaustive()
    }
}
