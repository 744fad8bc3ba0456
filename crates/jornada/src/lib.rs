//! Jornada: Browser Journey Test Harness with Network Capture
//!
//! Jornada (Spanish: "journey") wires per-test fixtures to a headless
//! browser so end-to-end journeys can open pages, interact with them, and
//! assert on DOM state, while optionally capturing every network request
//! the page performed into an immutable per-test report.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    JORNADA Architecture                         │
//! ├────────────────────────────────────────────────────────────────┤
//! │   ┌───────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │   │ Journey   │───►│ CdpSession  │◄───│ Headless Browser │     │
//! │   │ (fixture) │    │ (adapter)   │    │ (chromium, opt.) │     │
//! │   └─────┬─────┘    └──────┬──────┘    └──────────────────┘     │
//! │         │                 │ network events                     │
//! │         ▼                 ▼                                    │
//! │   ┌───────────────────────────────┐                            │
//! │   │ NetworkManager → NetworkReport │                           │
//! │   └───────────────────────────────┘                            │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One `NetworkManager` is active per test; it subscribes to the session
//! when the journey begins and yields its report exactly once when the
//! journey finishes. Capture is best-effort by design: protocol anomalies
//! are logged and absorbed, never turned into test failures.

#![warn(missing_docs)]

/// Browser control (real CDP behind the `browser` feature, mock otherwise)
mod browser;

/// Network protocol event vocabulary
mod event;

/// Per-test fixture composition
mod fixture;

/// Per-test network capture and reporting
mod network;

mod result;

/// Browser debugging session adapter
mod session;

pub use browser::{Browser, BrowserConfig, Page};
pub use event::{Headers, NetworkEvent};
#[cfg(feature = "browser")]
pub use fixture::PageJourney;
pub use fixture::{Journey, JourneyConfig};
pub use network::{NetworkManager, NetworkReport, RequestOutcome, RequestRecord};
pub use result::{JornadaError, JornadaResult};
#[cfg(feature = "browser")]
pub use session::SessionBridge;
pub use session::{CdpSession, NetworkEventSource, Subscription};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize a tracing subscriber for test output.
///
/// Respects `RUST_LOG`; safe to call from every test, only the first call
/// installs the subscriber.
pub fn init_test_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
