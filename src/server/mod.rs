//! HTTP layer: the mounting wrapper and its own routes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     parent Router                             │
//! │                          │ nest(prefix)                       │
//! │  ┌───────────────────────▼───────────────────────────────┐    │
//! │  │  ProxyMount router                                     │    │
//! │  │  /status   /custom-docs   /openapi.json   (handlers)   │    │
//! │  │  fallback ──► BlockingBridge ──► ProxyApp (blocking)   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod docs;
pub mod handlers;
pub mod mount;

pub use handlers::{docs_handler, openapi_handler, status_handler, DocsState, StatusResponse};
pub use mount::ProxyMount;
