//! Browser control for headless journeys.
//!
//! When compiled with the `browser` feature, this module drives a real
//! chromium via the Chrome `DevTools` Protocol (chromiumoxide). Without the
//! feature it provides a mock implementation so fixture wiring and capture
//! logic can be unit tested without a browser install.

use crate::result::{JornadaError, JornadaResult};

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Launch without a visible UI
    pub headless: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

// ============================================================================
// Real CDP implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::{BrowserConfig, JornadaError, JornadaResult};
    use crate::session::{CdpSession, SessionBridge};
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Browser instance with a real CDP connection
    #[derive(Debug)]
    pub struct Browser {
        config: BrowserConfig,
        inner: Arc<Mutex<CdpBrowser>>,
        #[allow(dead_code)]
        handle: tokio::task::JoinHandle<()>,
    }

    impl Browser {
        /// Launch a new browser instance.
        pub async fn launch(config: BrowserConfig) -> JornadaResult<Self> {
            let mut builder = CdpConfig::builder();

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder
                .build()
                .map_err(|e| JornadaError::BrowserLaunchError { message: e })?;

            let (browser, mut handler) = CdpBrowser::launch(cdp_config).await.map_err(|e| {
                JornadaError::BrowserLaunchError {
                    message: e.to_string(),
                }
            })?;

            // Drive the CDP connection until it closes.
            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(Self {
                config,
                inner: Arc::new(Mutex::new(browser)),
                handle,
            })
        }

        /// Create a new page.
        pub async fn new_page(&self) -> JornadaResult<Page> {
            let browser = self.inner.lock().await;
            let cdp_page =
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| JornadaError::PageError {
                        message: e.to_string(),
                    })?;

            Ok(Page {
                url: String::from("about:blank"),
                inner: Some(Arc::new(Mutex::new(cdp_page))),
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Close the browser.
        pub async fn close(self) -> JornadaResult<()> {
            let mut browser = self.inner.lock().await;
            browser
                .close()
                .await
                .map_err(|e| JornadaError::BrowserLaunchError {
                    message: e.to_string(),
                })?;
            Ok(())
        }
    }

    /// A browser page with a real CDP connection
    #[derive(Debug)]
    pub struct Page {
        /// Current URL
        pub url: String,
        inner: Option<Arc<Mutex<CdpPage>>>,
    }

    impl Page {
        /// Navigate to a URL.
        pub async fn goto(&mut self, url: &str) -> JornadaResult<()> {
            if let Some(ref inner) = self.inner {
                let page = inner.lock().await;
                page.goto(url)
                    .await
                    .map_err(|e| JornadaError::NavigationError {
                        url: url.to_string(),
                        message: e.to_string(),
                    })?;
            }
            self.url = url.to_string();
            Ok(())
        }

        /// Evaluate a JavaScript expression in the page.
        pub async fn evaluate<T: serde::de::DeserializeOwned>(
            &self,
            expr: &str,
        ) -> JornadaResult<T> {
            if let Some(ref inner) = self.inner {
                let page = inner.lock().await;
                let result = page
                    .evaluate(expr)
                    .await
                    .map_err(|e| JornadaError::EvalError {
                        message: e.to_string(),
                    })?;
                result.into_value().map_err(|e| JornadaError::EvalError {
                    message: e.to_string(),
                })
            } else {
                Err(JornadaError::EvalError {
                    message: "No browser connection".to_string(),
                })
            }
        }

        /// Inner text of the first element matching a selector.
        pub async fn inner_text(&self, selector: &str) -> JornadaResult<String> {
            self.evaluate(&format!("document.querySelector({selector:?}).innerText"))
                .await
        }

        /// Open a debugging session observing this page's network events.
        ///
        /// Returns the session together with the bridge driving it; detach
        /// the bridge after the capture is stopped.
        pub async fn network_session(&self) -> JornadaResult<(CdpSession, SessionBridge)> {
            let Some(ref inner) = self.inner else {
                return Err(JornadaError::PageError {
                    message: "No browser connection".to_string(),
                });
            };
            let page = inner.lock().await;
            let session = CdpSession::new();
            let bridge = session.attach_page(&page).await?;
            Ok((session, bridge))
        }

        /// Get current URL
        #[must_use]
        pub fn current_url(&self) -> &str {
            &self.url
        }
    }
}

// ============================================================================
// Mock implementation (when `browser` feature is NOT enabled)
// ============================================================================

#[cfg(not(feature = "browser"))]
mod mock {
    use super::{BrowserConfig, JornadaError, JornadaResult};

    /// Browser instance (mock when `browser` feature disabled)
    #[derive(Debug)]
    pub struct Browser {
        config: BrowserConfig,
    }

    impl Browser {
        /// Launch a new browser instance (mock).
        pub fn launch(config: BrowserConfig) -> JornadaResult<Self> {
            Ok(Self { config })
        }

        /// Create a new page.
        pub fn new_page(&self) -> JornadaResult<Page> {
            Ok(Page::new())
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Close the browser.
        pub fn close(self) -> JornadaResult<()> {
            Ok(())
        }
    }

    /// A browser page (mock when `browser` feature disabled)
    #[derive(Debug)]
    pub struct Page {
        /// Current URL
        pub url: String,
    }

    impl Page {
        /// Create a new page
        #[must_use]
        pub fn new() -> Self {
            Self {
                url: String::from("about:blank"),
            }
        }

        /// Navigate to a URL.
        pub fn goto(&mut self, url: &str) -> JornadaResult<()> {
            self.url = url.to_string();
            Ok(())
        }

        /// Evaluate a JavaScript expression (mock returns an error).
        pub fn evaluate<T: serde::de::DeserializeOwned>(&self, _expr: &str) -> JornadaResult<T> {
            Err(JornadaError::EvalError {
                message: "Browser feature not enabled. Enable 'browser' for real CDP support."
                    .to_string(),
            })
        }

        /// Inner text of the first element matching a selector (mock).
        pub fn inner_text(&self, _selector: &str) -> JornadaResult<String> {
            Err(JornadaError::EvalError {
                message: "Browser feature not enabled. Enable 'browser' for real CDP support."
                    .to_string(),
            })
        }

        /// Get current URL
        #[must_use]
        pub fn current_url(&self) -> &str {
            &self.url
        }
    }

    impl Default for Page {
        fn default() -> Self {
            Self::new()
        }
    }
}

// Re-export based on feature
#[cfg(feature = "browser")]
pub use cdp::{Browser, Page};

#[cfg(not(feature = "browser"))]
pub use mock::{Browser, Page};
