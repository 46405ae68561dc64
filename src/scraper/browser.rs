use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::error::{Result, ScrapeError};

/// Poll cadence for element waits. Smart waits poll for readiness instead of
/// sleeping a fixed amount.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BrowserDriver {
    driver: WebDriver,
}

impl BrowserDriver {
    pub async fn new(headless: bool, driver_port: u16) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();

        let mut chrome_args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--window-size=1280,800".to_string(),
        ];

        if headless {
            chrome_args.push("--headless".to_string());
        }

        for arg in &chrome_args {
            caps.add_arg(arg)?;
        }

        let server_url = format!("http://localhost:{}", driver_port);

        // The driver process may still be coming up when we connect.
        let mut last_error = None;
        for attempt in 1..=3 {
            debug!("connecting to chromedriver, attempt {}/3", attempt);
            match WebDriver::new(&server_url, caps.clone()).await {
                Ok(driver) => return Ok(Self { driver }),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < 3 {
                        sleep(Duration::from_millis(1000)).await;
                    }
                }
            }
        }

        Err(ScrapeError::Driver(format!(
            "failed to connect to chromedriver at {} after 3 attempts: {}",
            server_url,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    pub async fn refresh(&self) -> Result<()> {
        self.driver.refresh().await?;
        Ok(())
    }

    pub async fn find_element(&self, selector: By) -> Result<WebElement> {
        Ok(self.driver.find(selector).await?)
    }

    pub async fn find_elements(&self, selector: By) -> Result<Vec<WebElement>> {
        Ok(self.driver.find_all(selector).await?)
    }

    /// Poll until an element matching `selector` exists, up to `timeout`.
    pub async fn wait_for_element(&self, selector: By, timeout: Duration) -> Result<WebElement> {
        let start = Instant::now();

        loop {
            if let Ok(element) = self.driver.find(selector.clone()).await {
                return Ok(element);
            }

            if start.elapsed() > timeout {
                return Err(ScrapeError::Driver(format!(
                    "timeout waiting for element {:?}",
                    selector
                )));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    /// Scan a list of candidate selectors once and return the first element
    /// that is currently displayed.
    pub async fn find_visible(&self, selectors: &[By]) -> Result<Option<WebElement>> {
        for selector in selectors {
            if let Ok(elements) = self.driver.find_all(selector.clone()).await {
                for element in elements {
                    if element.is_displayed().await.unwrap_or(false) {
                        return Ok(Some(element));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Poll the candidate selectors until one yields a displayed, enabled
    /// element. Returns None on timeout so callers can decide whether that
    /// is fatal.
    pub async fn wait_for_clickable(
        &self,
        selectors: &[By],
        timeout: Duration,
    ) -> Result<Option<WebElement>> {
        let start = Instant::now();

        loop {
            for selector in selectors {
                if let Ok(elements) = self.driver.find_all(selector.clone()).await {
                    for element in elements {
                        if element.is_displayed().await.unwrap_or(false)
                            && element.is_enabled().await.unwrap_or(false)
                        {
                            return Ok(Some(element));
                        }
                    }
                }
            }

            if start.elapsed() > timeout {
                return Ok(None);
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn click_element(&self, element: &WebElement) -> Result<()> {
        element.click().await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &WebElement, text: &str) -> Result<()> {
        element.clear().await?;
        element.send_keys(text).await?;
        Ok(())
    }

    pub async fn execute_script(&self, script: &str, args: Vec<serde_json::Value>) -> Result<()> {
        self.driver.execute(script, args).await?;
        Ok(())
    }

    pub async fn execute_script_and_get_value(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let ret = self.driver.execute(script, args).await?;
        Ok(ret.json().clone())
    }

    pub async fn all_cookies(&self) -> Result<Vec<Cookie>> {
        Ok(self.driver.get_all_cookies().await?)
    }

    pub async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
        for cookie in cookies {
            // Cookies for unrelated domains are rejected by the browser.
            if let Err(e) = self.driver.add_cookie(cookie.clone()).await {
                debug!("skipping cookie '{}': {}", cookie.name, e);
            }
        }
        Ok(())
    }

    pub async fn delete_all_cookies(&self) -> Result<()> {
        self.driver.delete_all_cookies().await?;
        Ok(())
    }

    pub async fn quit(&self) -> Result<()> {
        let driver_clone = self.driver.clone();
        driver_clone.quit().await?;
        Ok(())
    }
}
