pub mod browser;
pub mod collector;
pub mod login;
pub mod navigator;

use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::chromedriver_manager::ChromeDriverManager;
use crate::config::ScraperConfig;
use crate::error::{Result, ScrapeError};
use crate::models::Collection;
use crate::session::{SessionState, SessionStore};
use browser::BrowserDriver;
use collector::{CollectorPolicy, PageTableSource, TableCollector};
use navigator::Navigator;

/// Bounded probe for the authenticated-only marker after a session restore.
/// Shorter than the general wait: an invalid session should fail fast into
/// the interactive login path.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the browser for the duration of one run and drives the pipeline:
/// authenticate (reusing a saved session when possible), navigate the menu,
/// collect the table, and hand back the frozen record set.
pub struct ScraperEngine {
    browser: BrowserDriver,
    config: ScraperConfig,
    session_store: SessionStore,
    driver_manager: Arc<ChromeDriverManager>,
    skipped_rows: usize,
}

impl ScraperEngine {
    pub async fn new(
        config: ScraperConfig,
        driver_manager: Arc<ChromeDriverManager>,
    ) -> Result<Self> {
        driver_manager.start_driver(config.driver_port).await?;

        let browser = BrowserDriver::new(config.headless, config.driver_port).await?;
        let session_store = SessionStore::new(&config.session_file);

        Ok(Self {
            browser,
            config,
            session_store,
            driver_manager,
            skipped_rows: 0,
        })
    }

    pub async fn run(&mut self) -> Result<Collection> {
        info!("step 1/4: authenticating at {}", self.config.base_url);
        self.authenticate().await?;

        info!("step 2/4: navigating to the catalog");
        self.navigate().await?;

        info!("step 3/4: collecting table rows");
        let collection = self.collect().await?;

        info!(
            "step 4/4: collection complete, {} records ({} rows skipped)",
            collection.len(),
            self.skipped_rows
        );
        Ok(collection)
    }

    /// Restore-and-validate a saved session, falling back to interactive
    /// login. A failed first interactive attempt gets exactly one retry.
    async fn authenticate(&mut self) -> Result<()> {
        let wait = Duration::from_secs(self.config.wait_timeout_secs);
        self.browser.navigate(&self.config.base_url).await?;

        if !self.config.fresh_login {
            if let Some(state) = self.session_store.load() {
                info!("restoring saved session from {:?}", self.session_store.path());
                match self.session_store.restore(&self.browser, &state).await {
                    Ok(()) => {
                        if SessionStore::validate(
                            &self.browser,
                            &login::logged_in_markers(),
                            VALIDATE_TIMEOUT,
                        )
                        .await
                        {
                            info!("saved session is valid, skipping login");
                            return Ok(());
                        }
                        info!("saved session no longer reaches an authenticated view");
                    }
                    Err(e) => warn!("session restore failed: {}", e),
                }
                self.session_store.invalidate();
            }
        }

        let credentials = self.config.credentials.clone();
        if let Err(first) =
            login::login(&self.browser, &credentials, &self.config.base_url, wait).await
        {
            match first {
                ScrapeError::Auth(reason) => {
                    warn!("login failed ({}), retrying once", reason);
                    self.browser.navigate(&self.config.base_url).await?;
                    login::login(&self.browser, &credentials, &self.config.base_url, wait).await?;
                }
                other => return Err(other),
            }
        }
        info!("login successful");

        // Session persistence failures only cost the next run a login.
        match SessionState::capture(&self.browser).await {
            Ok(state) => {
                if let Err(e) = self.session_store.save(&state) {
                    warn!("could not save session state: {}", e);
                }
            }
            Err(e) => warn!("could not capture session state: {}", e),
        }

        Ok(())
    }

    async fn navigate(&self) -> Result<()> {
        let wait = Duration::from_secs(self.config.wait_timeout_secs);
        let navigator = Navigator::new(&self.browser, wait);

        if let Some(label) = &self.config.launch_label {
            navigator.try_click(label).await?;
        }

        navigator.reach(&self.config.menu_path).await?;

        if let Some(label) = &self.config.load_label {
            navigator.click_required(label).await?;
        }

        Ok(())
    }

    async fn collect(&mut self) -> Result<Collection> {
        let source = PageTableSource::new(
            &self.browser,
            self.config.row_selector.clone(),
            Duration::from_secs(self.config.wait_timeout_secs),
            Duration::from_secs(self.config.advance_timeout_secs),
        );
        let policy = CollectorPolicy {
            stable_passes: self.config.stable_passes,
            max_passes: self.config.max_passes,
            key_column: self.config.key_column.clone(),
        };

        let mut collector = TableCollector::new(source, policy);
        let collection = collector.collect().await?;
        self.skipped_rows = collector.skipped_rows();

        Ok(collection)
    }

    /// Malformed rows dropped during the last collection.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Release the browser and the managed chromedriver. Called on every
    /// exit path, success or not.
    pub async fn close(&self) -> Result<()> {
        self.browser.quit().await?;
        self.driver_manager.stop_driver().await?;
        Ok(())
    }
}
