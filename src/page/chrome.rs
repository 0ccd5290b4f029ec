//! Chrome DevTools backend
//!
//! Launches (or attaches to) a Chromium instance through `chromiumoxide`.
//! Attaching to a running browser with `debugger-url` reuses whatever session
//! the operator is logged into.

use crate::config::BrowserConfig;
use crate::page::traits::{ClickTarget, HostPage, OverlayTargets, PageDriver, PageError, PageResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

fn protocol(err: CdpError) -> PageError {
    PageError::Protocol(err.to_string())
}

/// Lost connections to the browser stay protocol errors; the rest blame the URL
fn open_error(url: &str, err: CdpError) -> PageError {
    match err {
        CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => protocol(err),
        other => PageError::Navigation {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}

/// Page driver backed by a Chromium instance
pub struct ChromeDriver {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromeDriver {
    /// Attaches to `debugger-url` when set, otherwise launches a new browser
    pub async fn launch(config: &BrowserConfig) -> PageResult<Self> {
        let (browser, mut handler) = match &config.debugger_url {
            Some(url) => {
                tracing::info!("Attaching to running browser at {}", url);
                Browser::connect(url.clone()).await.map_err(protocol)?
            }
            None => {
                let mut builder = LaunchConfig::builder();
                if !config.headless {
                    builder = builder.with_head();
                }
                if let Some(dir) = &config.user_data_dir {
                    builder = builder.user_data_dir(dir);
                }
                if let Some(executable) = &config.executable {
                    builder = builder.chrome_executable(executable);
                }
                let launch_config = builder.build().map_err(PageError::Protocol)?;
                tracing::info!("Launching browser (headless: {})", config.headless);
                Browser::launch(launch_config).await.map_err(protocol)?
            }
        };

        // The handler must be polled for the browser connection to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser event error: {}", e);
                }
            }
            tracing::debug!("Browser connection closed");
        });

        Ok(Self { browser, handler })
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    type Page = ChromePage;

    async fn open(&self, url: &str) -> PageResult<ChromePage> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| open_error(url, e))?;
        Ok(ChromePage { page })
    }
}

/// One browser tab
pub struct ChromePage {
    page: Page,
}

#[async_trait]
impl HostPage for ChromePage {
    async fn url(&self) -> PageResult<String> {
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn content(&self) -> PageResult<String> {
        self.page.content().await.map_err(protocol)
    }

    async fn click(&self, target: &ClickTarget) -> PageResult<()> {
        let elements = self
            .page
            .find_elements(target.selector.as_str())
            .await
            .map_err(protocol)?;
        let element = elements
            .get(target.index)
            .ok_or_else(|| PageError::ElementNotFound {
                selector: target.selector.clone(),
                index: target.index,
            })?;
        element.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn dismiss_overlays(&self, overlays: OverlayTargets<'_>) -> PageResult<usize> {
        let script = dismiss_script(overlays)?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?;
        result
            .into_value::<usize>()
            .map_err(|e| PageError::Script(e.to_string()))
    }

    async fn close(&self) -> PageResult<()> {
        match self.page.clone().close().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::debug!("Tab already closed: {}", e);
                Ok(())
            }
        }
    }
}

/// Builds the overlay dismissal script; selectors are embedded as JSON strings
fn dismiss_script(overlays: OverlayTargets<'_>) -> PageResult<String> {
    let close = serde_json::to_string(overlays.close).map_err(|e| PageError::Script(e.to_string()))?;
    let hide = serde_json::to_string(overlays.hide).map_err(|e| PageError::Script(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
    let affected = 0;
    const close = {close};
    const hide = {hide};
    if (close) {{
        const button = document.querySelector(close);
        if (button) {{ button.click(); affected += 1; }}
    }}
    if (hide) {{
        document.querySelectorAll(hide).forEach((overlay) => {{
            overlay.style.display = 'none';
            overlay.style.visibility = 'hidden';
            affected += 1;
        }});
    }}
    return affected;
}})()"#
    ))
}
