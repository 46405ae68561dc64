use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::scraper::browser::BrowserDriver;

/// Drives the menu clicks that lead from the post-login view to the target
/// table. Safe to re-invoke from the top: every step tolerates the target
/// already being in the clicked state.
pub struct Navigator<'a> {
    browser: &'a BrowserDriver,
    wait_timeout: Duration,
}

/// The same UI label can render as a link, a button, a list entry, or a
/// card heading depending on the menu level.
fn label_selectors(label: &str) -> Vec<By> {
    vec![
        By::XPath(format!("//a[contains(., '{}')]", label)),
        By::XPath(format!("//button[contains(., '{}')]", label)),
        By::XPath(format!("//*[@role='menuitem'][contains(., '{}')]", label)),
        By::XPath(format!("//li[contains(., '{}')]", label)),
        By::XPath(format!("//h2[contains(., '{}')] | //h3[contains(., '{}')]", label, label)),
        By::XPath(format!("//*[text()='{}']", label)),
    ]
}

fn menu_button_selectors() -> Vec<By> {
    vec![
        By::XPath("//button[contains(., 'Menu')]"),
        By::Css("button[aria-label*='menu']"),
        By::Css("button[aria-label*='Menu']"),
        By::Css("[data-testid*='menu']"),
    ]
}

impl<'a> Navigator<'a> {
    pub fn new(browser: &'a BrowserDriver, wait_timeout: Duration) -> Self {
        Self {
            browser,
            wait_timeout,
        }
    }

    /// Click each menu-item label in order, waiting for each to become
    /// interactable. A label that never becomes interactable within the
    /// bounded timeout fails the run with that label's name.
    pub async fn reach(&self, labels: &[String]) -> Result<()> {
        self.open_menu_if_closed(labels).await?;

        for label in labels {
            self.click_required(label).await?;
        }

        Ok(())
    }

    /// Click a label that may legitimately be absent, e.g. an entry button
    /// that only shows on the first visit. Uses a short wait.
    pub async fn try_click(&self, label: &str) -> Result<bool> {
        match self
            .browser
            .wait_for_clickable(&label_selectors(label), Duration::from_secs(5))
            .await?
        {
            Some(element) => {
                self.browser.click_element(&element).await?;
                info!("clicked '{}'", label);
                self.settle().await;
                Ok(true)
            }
            None => {
                debug!("'{}' not present, skipping", label);
                Ok(false)
            }
        }
    }

    /// Click a label that must be present to make progress.
    pub async fn click_required(&self, label: &str) -> Result<()> {
        let element = self
            .browser
            .wait_for_clickable(&label_selectors(label), self.wait_timeout)
            .await?
            .ok_or_else(|| ScrapeError::NavigationFailed(label.to_string()))?;

        self.browser.click_element(&element).await?;
        info!("clicked '{}'", label);
        self.settle().await;
        Ok(())
    }

    /// If none of the target labels is visible yet, the menu is closed;
    /// open it via the menu button.
    async fn open_menu_if_closed(&self, labels: &[String]) -> Result<()> {
        if let Some(first) = labels.first() {
            if self
                .browser
                .find_visible(&label_selectors(first))
                .await?
                .is_some()
            {
                debug!("menu already open");
                return Ok(());
            }
        }

        let button = self
            .browser
            .wait_for_clickable(&menu_button_selectors(), self.wait_timeout)
            .await?
            .ok_or_else(|| ScrapeError::NavigationFailed("menu".to_string()))?;

        self.browser.click_element(&button).await?;
        info!("opened menu");
        self.settle().await;
        Ok(())
    }

    /// Short pause for menu transition animations. Element readiness is
    /// still polled by the next step; this only avoids clicking into a
    /// half-rendered panel.
    async fn settle(&self) {
        sleep(Duration::from_millis(500)).await;
    }
}
