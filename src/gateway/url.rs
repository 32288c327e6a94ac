//! Opening item links outside the app.
//!
//! Launchers are tried in order until one succeeds: the platform shell, then
//! the backend's `open_url` command, then a browser. The browser fallback only
//! ever sees `http(s)` links.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::Gateway;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[async_trait]
pub trait UrlLauncher: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, _url: &str) -> bool {
        true
    }

    async fn launch(&self, url: &str) -> Result<()>;
}

pub fn is_web_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Hands the URL to the OS default handler.
pub struct ShellLauncher;

#[async_trait]
impl UrlLauncher for ShellLauncher {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn launch(&self, url: &str) -> Result<()> {
        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&target))
            .await
            .context("shell open task panicked")?
            .with_context(|| format!("shell could not open {url}"))
    }
}

pub struct BackendLauncher {
    gateway: Gateway,
}

impl BackendLauncher {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl UrlLauncher for BackendLauncher {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn launch(&self, url: &str) -> Result<()> {
        self.gateway.open_url(url).await
    }
}

/// Last resort: the browser named by `$BROWSER`.
pub struct BrowserLauncher;

#[async_trait]
impl UrlLauncher for BrowserLauncher {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn accepts(&self, url: &str) -> bool {
        is_web_url(url)
    }

    async fn launch(&self, url: &str) -> Result<()> {
        let browser = std::env::var("BROWSER").context("BROWSER is not set")?;
        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::with(&target, &browser))
            .await
            .context("browser open task panicked")?
            .with_context(|| format!("browser could not open {url}"))
    }
}

pub struct UrlOpener {
    launchers: Vec<Box<dyn UrlLauncher>>,
}

impl UrlOpener {
    pub fn new(launchers: Vec<Box<dyn UrlLauncher>>) -> Self {
        Self { launchers }
    }

    pub fn standard(gateway: Gateway) -> Self {
        Self::new(vec![
            Box::new(ShellLauncher),
            Box::new(BackendLauncher::new(gateway)),
            Box::new(BrowserLauncher),
        ])
    }

    pub async fn open(&self, url: &str) -> Result<()> {
        let mut last_err = None;
        for launcher in self.launchers.iter().filter(|l| l.accepts(url)) {
            match launcher.launch(url).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log_warn!("{} launcher failed for {url}: {err:#}", launcher.name());
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("no launcher accepted {url}")))
    }
}
