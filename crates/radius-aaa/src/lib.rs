//! Multi-vendor RADIUS AAA engine
//!
//! Built on top of the `radius-proto` protocol implementation, this crate
//! authenticates subscribers, emits vendor-specific authorization attributes
//! and keeps accounting sessions for BRAS and wireless NAS devices.
//!
//! # Features
//!
//! - Async UDP listeners for authentication and accounting, one task per packet
//! - PAP, CHAP and MS-CHAPv2 (with MPPE keys), MAC authentication and TOTP
//! - MAC and VLAN binding, concurrent session caps
//! - Huawei, H3C, ZTE, Redback, Cisco, Mikrotik and iKuai rate attributes
//! - In-memory or PostgreSQL session store, LDAP subscriber directories
//! - Disconnect-Request for sessions of disabled or expired subscribers
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_aaa::{
//!     AaaContext, AcctService, AuditLogger, AuthService, Config, MemoryDirectory, MemoryStore,
//!     RadiusServer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let directory = Arc::new(MemoryDirectory::from_config(&config));
//!     let store = Arc::new(MemoryStore::new());
//!     let audit = AuditLogger::spawn(store.clone(), config.radius.authlog_level, None, 1024)?;
//!
//!     let auth_addr = config.auth_addr()?;
//!     let ctx = Arc::new(AaaContext::new(
//!         Arc::new(config),
//!         directory.clone(),
//!         directory,
//!         store,
//!         audit,
//!     ));
//!
//!     let auth = RadiusServer::bind(auth_addr, Arc::new(AuthService::new(ctx.clone()))).await?;
//!     let _acct = AcctService::new(ctx);
//!     auth.run().await?;
//!     Ok(())
//! }
//! ```

pub mod acct;
pub mod audit;
pub mod auth;
pub mod authorize;
pub mod binding;
pub mod config;
pub mod context;
pub mod crypto;
pub mod directory;
pub mod disconnect;
pub mod error;
pub mod models;
pub mod password;
pub mod server;
pub mod store;
pub mod vendor_parser;

pub use acct::AcctService;
pub use audit::{AuditLogger, AuthLogLevel};
pub use auth::AuthService;
pub use config::{Config, ConfigError, RadiusConfig};
pub use context::AaaContext;
pub use directory::{LdapConfig, LdapDirectory, MemoryDirectory, NasDirectory, SubscriberDirectory};
pub use disconnect::{DisconnectError, DisconnectIssuer};
pub use error::{AuthError, StoreError};
pub use models::{Nas, Subscriber, Vendor};
pub use server::{RadiusServer, RequestHandler, Response, ServerError};
pub use store::{MemoryStore, PostgresStore, SessionStore};
