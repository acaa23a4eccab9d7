//! HTTP transport for the IPAM engine: thin axum handlers over
//! `ipam_engine::SpaceService`, auth-header extraction, the trimmed error
//! envelope, and TLS-aware server bootstrapping.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;
pub mod tls;

pub use error::ApiError;
pub use server::{ApiServer, Config};
pub use state::AppState;
pub use tls::{TlsMaterial, TlsMode};
