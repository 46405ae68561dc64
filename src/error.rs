/// Result type for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Errors that can terminate a scrape run.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("navigation failed at '{0}'")]
    NavigationFailed(String),

    #[error("no data found: no table row ever appeared")]
    NoDataFound,

    #[error("browser error: {0}")]
    Browser(#[from] thirtyfour::error::WebDriverError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error("driver error: {0}")]
    Driver(String),
}

impl ScrapeError {
    /// Process exit code for this failure kind. Zero is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Auth(_) => 3,
            Self::NavigationFailed(_) => 4,
            Self::NoDataFound => 5,
            Self::Io(_) | Self::Export(_) => 6,
            Self::Browser(_) | Self::Driver(_) => 1,
        }
    }
}
