//! # Session Controller Test Utilities
//!
//! Shared test utilities for the Crossbar session controller.
//!
//! This crate provides a mock media engine and test fixtures for
//! isolated controller testing without a real engine behind it.
//!
//! ## Modules
//!
//! - `mock_engine` - builder-configurable mock media engine with failure
//!   injection and per-operation call counters
//! - `fixtures` - canned ICE/DTLS/RTP parameter values
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::{fixtures, MockMediaEngine};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let engine = MockMediaEngine::builder().build();
//!     let controller = SessionController::new(engine.clone(), config);
//!
//!     // ... drive the controller ...
//!
//!     assert_eq!(engine.stats().routers_created(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;

pub use mock_engine::{MockMediaEngine, MockMediaEngineBuilder, MockStats};

/// Install a fmt tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
