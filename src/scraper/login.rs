use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::{Result, ScrapeError};
use crate::scraper::browser::BrowserDriver;

/// Selector candidates for the email field. The first match that is
/// displayed wins.
fn email_field_selectors() -> Vec<By> {
    vec![
        By::Css("input[type='email']"),
        By::Css("input[name='email']"),
        By::Css("input[id*='email']"),
        By::Css("input[placeholder*='email']"),
    ]
}

fn password_field_selectors() -> Vec<By> {
    vec![
        By::Css("input[type='password']"),
        By::Css("input[name='password']"),
        By::Css("input[id*='password']"),
        By::Css("input[placeholder*='Password']"),
    ]
}

fn submit_button_selectors() -> Vec<By> {
    vec![
        By::Css("button[type='submit']"),
        By::Css("input[type='submit']"),
        By::XPath("//button[contains(., 'Sign in') or contains(., 'Sign In') or contains(., 'Login') or contains(., 'Log in')]"),
    ]
}

/// Elements that only render after a successful login. Also used to
/// validate a restored session.
pub fn logged_in_markers() -> Vec<By> {
    vec![
        By::XPath("//*[contains(text(), 'Product Dashboard')]"),
        By::XPath("//*[contains(text(), 'Assessment ID:')]"),
        By::XPath("//*[contains(text(), 'Open the menu to access system features')]"),
    ]
}

fn error_markers() -> Vec<By> {
    vec![
        By::Css(".toast-error"),
        By::Css(".alert-danger"),
        By::XPath("//*[contains(text(), 'Invalid') or contains(text(), 'invalid') or contains(text(), 'Incorrect') or contains(text(), 'incorrect')]"),
    ]
}

/// Fill the login form and wait for the outcome.
pub async fn login(
    browser: &BrowserDriver,
    credentials: &Credentials,
    base_url: &str,
    timeout: Duration,
) -> Result<()> {
    info!("filling login form");

    let email_field = browser
        .wait_for_clickable(&email_field_selectors(), timeout)
        .await?
        .ok_or_else(|| ScrapeError::Auth("email field not found on login page".into()))?;
    browser.send_keys(&email_field, &credentials.email).await?;
    debug!("filled email field");

    let password_field = browser
        .wait_for_clickable(&password_field_selectors(), Duration::from_secs(5))
        .await?
        .ok_or_else(|| ScrapeError::Auth("password field not found on login page".into()))?;
    browser
        .send_keys(&password_field, &credentials.password)
        .await?;
    debug!("filled password field");

    match browser
        .wait_for_clickable(&submit_button_selectors(), Duration::from_secs(5))
        .await?
    {
        Some(submit) => {
            browser.click_element(&submit).await?;
            debug!("clicked submit button");
        }
        None => {
            // Some login forms only submit on Enter.
            password_field.send_keys(Key::Return).await?;
            debug!("no submit button, pressed Enter");
        }
    }

    wait_for_login_result(browser, base_url, timeout).await
}

/// Poll for a login outcome: a URL change away from the login page or a
/// post-login marker means success, a known error marker means failure.
async fn wait_for_login_result(
    browser: &BrowserDriver,
    base_url: &str,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    let base = base_url.trim_end_matches('/');

    while start.elapsed() < timeout {
        let url = browser.current_url().await?;
        let at_login = url.trim_end_matches('/') == base || url.ends_with("/login");
        if !at_login {
            info!("url changed to {}, login succeeded", url);
            return Ok(());
        }

        if let Some(_marker) = browser.find_visible(&logged_in_markers()).await? {
            info!("found post-login marker, login succeeded");
            return Ok(());
        }

        if let Some(marker) = browser.find_visible(&error_markers()).await? {
            let text = marker.text().await.unwrap_or_default();
            return Err(ScrapeError::Auth(format!(
                "login rejected: {}",
                text.trim()
            )));
        }

        sleep(Duration::from_secs(1)).await;
    }

    Err(ScrapeError::Auth("timed out waiting for login result".into()))
}
