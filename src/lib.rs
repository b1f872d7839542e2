//! # Admission Gate
//!
//! The request admission path of a project-management dashboard, as an Axum
//! service with two independent tower layers:
//!
//! - **Session Gate**: classifies each path (api, protected, auth-only,
//!   public) and redirects based on whether the request carries a valid
//!   session token
//! - **Rate Limiter**: fixed-window counter per client IP (60 requests per
//!   60 s) in a shared store, failing open when the store is down
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Request ID → Trace → CORS → Session Gate                   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  Pages, /health, /ready      │  /api → Rate Limiter         │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │  RateStore (Redis via ConnectionManager, or in-memory)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use admission_gate::{AppState, Config, build_router};
//! use admission_gate::rate_store::MemoryRateStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config, Arc::new(MemoryRateStore::new()));
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! SESSION_SECRET=$(openssl rand -hex 32) RATE_STORE_URL=redis://localhost:6379 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_store;
pub mod retry;
pub mod routes;
pub mod session;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use rate_store::{MemoryRateStore, RateStore, RedisRateStore};
pub use routes::build_router;
pub use session::{Session, SessionClaims, SessionVerifier};
pub use state::AppState;
