use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thirtyfour::{By, Cookie};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::scraper::browser::BrowserDriver;

/// Cookie snapshot taken after a successful login. Reused across runs until
/// the server stops honoring it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<Cookie>,
}

impl SessionState {
    /// Snapshot the current browser session.
    pub async fn capture(browser: &BrowserDriver) -> Result<Self> {
        Ok(Self {
            saved_at: Utc::now(),
            cookies: browser.all_cookies().await?,
        })
    }
}

/// Persists and restores [`SessionState`] at a fixed path.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously persisted state, if present and well-formed. A missing or
    /// unreadable file is absence, not an error.
    pub fn load(&self) -> Option<SessionState> {
        let content = fs::read_to_string(&self.path).ok()?;

        match serde_json::from_str::<SessionState>(&content) {
            Ok(state) => {
                debug!(
                    "loaded session saved at {} ({} cookies)",
                    state.saved_at,
                    state.cookies.len()
                );
                Some(state)
            }
            Err(e) => {
                warn!("session file {:?} is malformed, ignoring: {}", self.path, e);
                None
            }
        }
    }

    /// Overwrites any prior persisted state. Callers treat a failure here as
    /// non-fatal: the scrape proceeds, the session just is not reused.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, content)?;

        info!("saved session state to {:?}", self.path);
        Ok(())
    }

    /// Discard the persisted state, forcing a fresh login next run.
    pub fn invalidate(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("could not remove session file {:?}: {}", self.path, e);
            } else {
                info!("invalidated session file {:?}", self.path);
            }
        }
    }

    /// Apply a saved state to the browser. The page must already be on the
    /// target origin for the cookies to be accepted; reload afterwards so
    /// the server sees them.
    pub async fn restore(&self, browser: &BrowserDriver, state: &SessionState) -> Result<()> {
        browser.delete_all_cookies().await?;
        browser.add_cookies(&state.cookies).await?;
        browser.refresh().await?;
        Ok(())
    }

    /// Probe the page for an authenticated-only marker within `timeout`.
    /// True means the restored session reached an authenticated view.
    pub async fn validate(
        browser: &BrowserDriver,
        markers: &[By],
        timeout: Duration,
    ) -> bool {
        match browser.wait_for_clickable(markers, timeout).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("session validation probe failed: {}", e);
                false
            }
        }
    }
}
