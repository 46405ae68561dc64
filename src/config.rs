use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;

use crate::error::{Result, ScrapeError};

/// Environment variable holding the login email.
pub const EMAIL_VAR: &str = "EMAIL";
/// Environment variable holding the login password.
pub const PASSWORD_VAR: &str = "PASSWORD";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Read credentials from the standard environment variables.
    /// Absence of either is fatal at startup.
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(EMAIL_VAR, PASSWORD_VAR)
    }

    pub fn from_env_vars(email_var: &str, password_var: &str) -> Result<Self> {
        let email = env::var(email_var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ScrapeError::Config(format!("{} is not set", email_var)))?;
        let password = env::var(password_var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ScrapeError::Config(format!("{} is not set", password_var)))?;

        Ok(Self { email, password })
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub headless: bool,
    /// Cookie snapshot location; reused across runs until invalidated.
    pub session_file: PathBuf,
    pub output_file: PathBuf,
    /// Additional CSV export next to the JSON output.
    pub csv_file: Option<PathBuf>,
    /// Ignore any saved session and always log in interactively.
    pub fresh_login: bool,
    /// Entry button that only shows on the first visit; clicked when
    /// present, skipped otherwise.
    pub launch_label: Option<String>,
    /// Menu-item labels clicked in order to reach the table view.
    pub menu_path: Vec<String>,
    /// Button that triggers loading the table data after the menu path.
    pub load_label: Option<String>,
    pub row_selector: String,
    /// Unique column used as the record identity, when the table has one.
    pub key_column: Option<String>,
    pub wait_timeout_secs: u64,
    /// Upper bound on waiting for the row set to change after an advance.
    pub advance_timeout_secs: u64,
    /// Consecutive zero-new-record passes required before convergence.
    pub stable_passes: u32,
    /// Hard cap on extraction passes. Backstop against a table that never
    /// stops producing rows.
    pub max_passes: u32,
    pub driver_port: u16,
}

impl ScraperConfig {
    /// Platform config directory location for the session snapshot.
    pub fn default_session_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "catalog", "catalog-scraper")
            .ok_or_else(|| ScrapeError::Config("could not determine config directory".into()))?;

        Ok(proj_dirs.config_dir().join("session.json"))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.base_url.is_empty() {
            errors.push("base URL is required".to_string());
        }

        if self.menu_path.is_empty() {
            errors.push("menu path must contain at least one label".to_string());
        }

        if self.row_selector.is_empty() {
            errors.push("row selector is required".to_string());
        }

        if self.stable_passes == 0 {
            errors.push("stable passes must be at least 1".to_string());
        }

        if self.max_passes == 0 {
            errors.push("max passes must be at least 1".to_string());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            base_url: "https://example.com".into(),
            credentials: Credentials {
                email: "user@example.com".into(),
                password: "secret".into(),
            },
            headless: true,
            session_file: PathBuf::from("session.json"),
            output_file: PathBuf::from("products.json"),
            csv_file: None,
            fresh_login: false,
            launch_label: None,
            menu_path: vec!["Data Tools".into(), "Product Catalog".into()],
            load_label: None,
            row_selector: "table tbody tr".into(),
            key_column: None,
            wait_timeout_secs: 30,
            advance_timeout_secs: 10,
            stable_passes: 2,
            max_passes: 500,
            driver_port: 9516,
        }
    }

    #[test]
    fn test_missing_email_is_config_error() {
        env::remove_var("CATALOG_TEST_EMAIL_A");
        env::set_var("CATALOG_TEST_PASSWORD_A", "secret");

        let err = Credentials::from_env_vars("CATALOG_TEST_EMAIL_A", "CATALOG_TEST_PASSWORD_A")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
        assert!(err.to_string().contains("CATALOG_TEST_EMAIL_A"));
    }

    #[test]
    fn test_empty_password_is_config_error() {
        env::set_var("CATALOG_TEST_EMAIL_B", "user@example.com");
        env::set_var("CATALOG_TEST_PASSWORD_B", "");

        let err = Credentials::from_env_vars("CATALOG_TEST_EMAIL_B", "CATALOG_TEST_PASSWORD_B")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
    }

    #[test]
    fn test_credentials_read_from_env() {
        env::set_var("CATALOG_TEST_EMAIL_C", "user@example.com");
        env::set_var("CATALOG_TEST_PASSWORD_C", "secret");

        let creds =
            Credentials::from_env_vars("CATALOG_TEST_EMAIL_C", "CATALOG_TEST_PASSWORD_C").unwrap();
        assert_eq!(creds.email, "user@example.com");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        assert!(test_config().validate().is_empty());
    }

    #[test]
    fn test_validate_flags_empty_menu_path_and_zero_threshold() {
        let mut config = test_config();
        config.menu_path.clear();
        config.stable_passes = 0;

        let errors = config.validate();
        assert_eq!(errors.len(), 2);
    }
}
