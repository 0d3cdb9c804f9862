//! # MPC Wallet Session
//!
//! Networked half of the MPC wallet engine: drives the protocol
//! engines from `mpc-wallet-engine` against a remote co-signer over
//! an HTTP session/polling transport.
//!
//! - [`WalletService`] is the caller-facing facade; it serializes
//!   operations per profile and persists key shares
//! - [`SessionManager`] owns one session's state machine from create
//!   through round exchange to a terminal state
//! - [`CoSignerClient`] is the HTTP transport, with bearer auth and
//!   per-request timeouts
//!
//! ```rust,ignore
//! use mpc_wallet_session::{EngineConfig, WalletService, WalletOperations};
//! use mpc_wallet_engine::MemoryShareStore;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::new("https://cosigner.example.com")
//!     .with_auth_token(token);
//! let service = WalletService::new(config, Arc::new(MemoryShareStore::new()))?;
//! let info = service.generate_wallet("profile-1").await?;
//! ```

pub mod config;
pub mod facade;
pub mod session;
pub mod transport;

pub use config::EngineConfig;
pub use facade::{WalletOperations, WalletService};
pub use session::{CancelToken, SessionManager, SessionState};
pub use transport::{CoSignerClient, PollOutcome, SessionHandle};

pub use mpc_wallet_engine as engine;
