use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};

/// Platform slug used by the chrome-for-testing download endpoints.
fn platform_slug() -> &'static str {
    if cfg!(target_os = "windows") {
        "win64"
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "mac-arm64"
        } else {
            "mac-x64"
        }
    } else {
        "linux64"
    }
}

fn driver_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "chromedriver.exe"
    } else {
        "chromedriver"
    }
}

/// Manages the chromedriver process the browser connects to: downloads a
/// platform-matched build when absent, spawns it, waits for readiness, and
/// kills it on drop.
pub struct ChromeDriverManager {
    driver_path: PathBuf,
    process: Arc<Mutex<Option<Child>>>,
}

impl ChromeDriverManager {
    pub fn new() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            driver_path: exe_dir.join(driver_binary_name()),
            process: Arc::new(Mutex::new(None)),
        }
    }

    async fn ensure_driver_available(&self) -> Result<()> {
        if self.driver_path.exists() {
            debug!("chromedriver found at {:?}", self.driver_path);
            return Ok(());
        }

        info!(
            "chromedriver not found at {:?}, downloading",
            self.driver_path
        );
        self.download_chromedriver().await
    }

    pub async fn start_driver(&self, port: u16) -> Result<()> {
        self.ensure_driver_available().await?;

        let mut process_guard = self.process.lock().await;
        if process_guard.is_some() {
            debug!("chromedriver already running on port {}", port);
            return Ok(());
        }

        info!("starting chromedriver on port {}", port);
        let child = Command::new(&self.driver_path)
            .arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ScrapeError::Driver(format!(
                    "failed to start chromedriver from {:?}: {}",
                    self.driver_path, e
                ))
            })?;

        *process_guard = Some(child);
        drop(process_guard);

        if !self.wait_for_readiness(port, 15).await? {
            return Err(ScrapeError::Driver(
                "chromedriver did not become ready within 15 seconds".into(),
            ));
        }

        info!("chromedriver ready on port {}", port);
        Ok(())
    }

    pub async fn stop_driver(&self) -> Result<()> {
        let mut process_guard = self.process.lock().await;
        if let Some(mut child) = process_guard.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("chromedriver stopped");
        }
        Ok(())
    }

    async fn download_chromedriver(&self) -> Result<()> {
        let version = self.latest_version().await?;
        let platform = platform_slug();
        info!("downloading chromedriver {} for {}", version, platform);

        let download_url = format!(
            "https://edgedl.me.gvt1.com/edgedl/chrome/chrome-for-testing/{}/{}/chromedriver-{}.zip",
            version, platform, platform
        );

        let response = reqwest::get(&download_url)
            .await
            .map_err(|e| ScrapeError::Driver(format!("download failed: {}", e)))?;
        let zip_data = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::Driver(format!("download failed: {}", e)))?;

        let zip_path = std::env::temp_dir().join("chromedriver.zip");
        fs::write(&zip_path, zip_data)?;

        let file = fs::File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ScrapeError::Driver(format!("bad chromedriver archive: {}", e)))?;

        let binary_name = driver_binary_name();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| ScrapeError::Driver(format!("bad chromedriver archive: {}", e)))?;
            if entry.name().ends_with(binary_name) && !entry.name().ends_with('/') {
                debug!("extracting {}", entry.name());
                let mut outfile = fs::File::create(&self.driver_path)?;
                std::io::copy(&mut entry, &mut outfile)?;
                break;
            }
        }

        let _ = fs::remove_file(&zip_path);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.driver_path, fs::Permissions::from_mode(0o755))?;
        }

        info!("chromedriver downloaded to {:?}", self.driver_path);
        Ok(())
    }

    async fn wait_for_readiness(&self, port: u16, timeout_secs: u64) -> Result<bool> {
        let client = reqwest::Client::new();
        let url = format!("http://localhost:{}/status", port);
        let timeout = tokio::time::Duration::from_secs(timeout_secs);
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            if let Ok(response) = client.get(&url).send().await {
                if response.status().is_success() {
                    return Ok(true);
                }
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }

        Ok(false)
    }

    async fn latest_version(&self) -> Result<String> {
        // Chrome 115+ publishes versioned builds through chrome-for-testing.
        let response = reqwest::get(
            "https://googlechromelabs.github.io/chrome-for-testing/LATEST_RELEASE_STABLE",
        )
        .await
        .map_err(|e| ScrapeError::Driver(format!("version lookup failed: {}", e)))?;
        let version = response
            .text()
            .await
            .map_err(|e| ScrapeError::Driver(format!("version lookup failed: {}", e)))?
            .trim()
            .to_string();

        debug!("latest chromedriver version: {}", version);
        Ok(version)
    }
}

impl Default for ChromeDriverManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChromeDriverManager {
    fn drop(&mut self) {
        // Best effort cleanup
        if let Ok(mut process_guard) = self.process.try_lock() {
            if let Some(mut child) = process_guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}
