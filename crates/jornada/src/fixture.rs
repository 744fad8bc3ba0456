//! Per-test fixture composition.
//!
//! A [`Journey`] wires the per-test dependencies in a fixed order: the
//! debugging session first, then the network capture on top of it. Teardown
//! runs in reverse: capture stops (yielding the report), then the session
//! is dropped. There is no injection container; construction is explicit.

use crate::network::{NetworkManager, NetworkReport};
use crate::result::{JornadaError, JornadaResult};
use crate::session::CdpSession;
use tracing::debug;

/// Per-journey configuration: whether the browser runs without a visible
/// UI, and whether network capture is attached at all.
#[derive(Debug, Clone)]
pub struct JourneyConfig {
    /// Launch the browser without a visible UI
    pub headless: bool,
    /// Attach a network capture for this journey
    pub network: bool,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            headless: true,
            network: true,
        }
    }
}

impl JourneyConfig {
    /// Create a new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable or disable network capture
    #[must_use]
    pub const fn with_network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }
}

/// The per-test dependency bundle: one session, optionally one capture.
///
/// # Example
///
/// ```
/// use jornada::{Headers, Journey, JourneyConfig};
///
/// let journey = Journey::begin(JourneyConfig::default())?;
///
/// // ... test body drives the page; the session observes its traffic ...
/// journey
///     .session()
///     .emit_request_sent("1", "https://x/a", "GET", Headers::new());
///
/// let report = journey.finish()?.expect("capture was enabled");
/// assert_eq!(report.len(), 1);
/// # Ok::<(), jornada::JornadaError>(())
/// ```
#[derive(Debug)]
pub struct Journey {
    config: JourneyConfig,
    session: CdpSession,
    manager: Option<NetworkManager>,
}

impl Journey {
    /// Set up a journey with a fresh, detached session.
    ///
    /// # Errors
    ///
    /// Fails before the test body runs if capture setup is misused.
    pub fn begin(config: JourneyConfig) -> JornadaResult<Self> {
        Self::with_session(CdpSession::new(), config)
    }

    /// Set up a journey around an existing session (e.g. one attached to a
    /// real page). Construction order: session first, then capture.
    pub fn with_session(session: CdpSession, config: JourneyConfig) -> JornadaResult<Self> {
        let manager = if config.network {
            let mut manager = NetworkManager::new();
            manager.start(&session).map_err(|e| setup_error(&e))?;
            Some(manager)
        } else {
            None
        };
        debug!(
            headless = config.headless,
            network = config.network,
            "journey fixtures set up"
        );
        Ok(Self {
            config,
            session,
            manager,
        })
    }

    /// The session observing this journey's page.
    #[must_use]
    pub fn session(&self) -> &CdpSession {
        &self.session
    }

    /// The journey configuration.
    #[must_use]
    pub fn config(&self) -> &JourneyConfig {
        &self.config
    }

    /// Whether network capture is running.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.manager.as_ref().is_some_and(NetworkManager::is_capturing)
    }

    /// Tear the journey down in reverse order: stop the capture, then drop
    /// the session. Returns the report when capture was enabled.
    ///
    /// What to do with the report is the caller's decision: assert
    /// against it, attach it to test output, or drop it.
    ///
    /// # Errors
    ///
    /// Propagates capture lifecycle misuse as a fixture error.
    pub fn finish(mut self) -> JornadaResult<Option<NetworkReport>> {
        let report = match self.manager.take() {
            Some(mut manager) => Some(manager.stop().map_err(|e| setup_error(&e))?),
            None => None,
        };
        debug!("journey fixtures torn down");
        Ok(report)
    }
}

fn setup_error(source: &JornadaError) -> JornadaError {
    JornadaError::FixtureError {
        message: format!("network capture: {source}"),
    }
}

// ============================================================================
// Full composition against a real browser (when `browser` is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::{Journey, JourneyConfig};
    use crate::browser::{Browser, BrowserConfig, Page};
    use crate::network::NetworkReport;
    use crate::result::JornadaResult;
    use crate::session::{CdpSession, SessionBridge};

    /// A journey bound to a real browser page.
    ///
    /// Construction order: browser, page, session, capture. Teardown runs
    /// in reverse: the capture stops, the event bridge detaches, the
    /// browser closes.
    #[derive(Debug)]
    pub struct PageJourney {
        browser: Browser,
        page: Page,
        bridge: SessionBridge,
        journey: Journey,
    }

    impl PageJourney {
        /// Launch a browser and set up the full per-test dependency chain.
        pub async fn begin(config: JourneyConfig) -> JornadaResult<Self> {
            let browser =
                Browser::launch(BrowserConfig::default().with_headless(config.headless)).await?;
            let page = browser.new_page().await?;
            let (session, bridge) = page.network_session().await?;
            let journey = Journey::with_session(session, config)?;
            Ok(Self {
                browser,
                page,
                bridge,
                journey,
            })
        }

        /// The live page.
        pub fn page(&mut self) -> &mut Page {
            &mut self.page
        }

        /// The session observing the page.
        #[must_use]
        pub fn session(&self) -> &CdpSession {
            self.journey.session()
        }

        /// Whether network capture is running.
        #[must_use]
        pub fn is_capturing(&self) -> bool {
            self.journey.is_capturing()
        }

        /// Tear everything down in reverse order and return the report.
        pub async fn finish(self) -> JornadaResult<Option<NetworkReport>> {
            let report = self.journey.finish()?;
            self.bridge.detach();
            self.browser.close().await?;
            Ok(report)
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::PageJourney;
