use crate::config::toml_config::BootstrapConfig;
use crate::utils::error::{BqmodError, Result};
use crate::utils::validation::validate_url;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Downloads the module scaffold (wrapper script, runtime config,
/// Dockerfile) from `{base_url}/{file}`.
pub struct ScaffoldFetcher {
    client: Client,
    settings: BootstrapConfig,
}

/// Failure of a single attempt.
enum Attempt {
    Retry(String),
    Fail(BqmodError),
}

impl ScaffoldFetcher {
    pub fn new(settings: BootstrapConfig) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    fn base_url(&self) -> Result<&str> {
        let base_url = self
            .settings
            .base_url
            .as_deref()
            .ok_or_else(|| BqmodError::MissingConfigError {
                field: "bootstrap.base_url".to_string(),
            })?;
        validate_url("bootstrap.base_url", base_url)?;
        Ok(base_url.trim_end_matches('/'))
    }

    /// Fetches every configured file, then writes them under `dest`.
    /// Nothing is written unless all downloads succeed.
    pub async fn fetch_all(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        let base_url = self.base_url()?;

        let mut downloaded = Vec::with_capacity(self.settings.files.len());
        for file in &self.settings.files {
            let url = format!("{}/{}", base_url, file.trim_start_matches('/'));
            let body = self.fetch_with_retry(&url).await?;
            tracing::info!("Fetched {} ({} bytes)", url, body.len());
            downloaded.push((file, body));
        }

        let mut written = Vec::with_capacity(downloaded.len());
        for (file, body) in downloaded {
            let path = dest.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, body)?;
            written.push(path);
        }
        Ok(written)
    }

    pub async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let attempts = self.settings.retry_attempts + 1;
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(Attempt::Fail(error)) => return Err(error),
                Err(Attempt::Retry(reason)) => {
                    tracing::warn!("Attempt {}/{} for {} failed: {}", attempt, attempts, url, reason);
                    last_failure = reason;
                }
            }
            if attempt < attempts && self.settings.retry_delay_seconds > 0 {
                tokio::time::sleep(Duration::from_secs(self.settings.retry_delay_seconds)).await;
            }
        }

        Err(BqmodError::FetchError {
            url: url.to_string(),
            message: format!("gave up after {} attempts: {}", attempts, last_failure),
        })
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, Attempt> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(self.settings.timeout_seconds))
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Attempt::Retry(format!("server responded {}", status)));
        }
        if !status.is_success() {
            return Err(Attempt::Fail(BqmodError::FetchError {
                url: url.to_string(),
                message: describe_status(status),
            }));
        }

        // 完整收到內容後才回傳
        let body = response
            .bytes()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;
        Ok(body.to_vec())
    }
}

fn describe_status(status: StatusCode) -> String {
    match status {
        StatusCode::NOT_FOUND => "file not found on scaffold server (404)".to_string(),
        other => format!("server responded {}", other),
    }
}
