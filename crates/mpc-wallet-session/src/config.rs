//! Engine configuration

use mpc_wallet_engine::Algorithm;
use std::time::Duration;

/// Configuration for the wallet service and its co-signer transport
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Co-signer service base URL, without a trailing slash
    pub base_url: String,
    /// Bearer token sent on every request
    pub auth_token: Option<String>,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Delay between poll attempts while waiting for the co-signer
    pub poll_interval: Duration,
    /// Double the poll interval after each empty poll, capped at this
    /// value; `None` keeps the interval fixed
    pub poll_backoff_cap: Option<Duration>,
    /// Absolute ceiling on a whole operation, measured from session
    /// creation
    pub max_poll_duration: Duration,
    /// Signature algorithm for new wallets
    pub algorithm: Algorithm,
    /// Master switch; every operation fails fast when disabled
    pub enabled: bool,
}

impl EngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            poll_backoff_cap: None,
            max_poll_duration: Duration::from_secs(120),
            algorithm: Algorithm::Ecdsa,
            enabled: true,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable exponential poll backoff, capped at `cap`
    pub fn with_poll_backoff_cap(mut self, cap: Duration) -> Self {
        self.poll_backoff_cap = Some(cap);
        self
    }

    pub fn with_max_poll_duration(mut self, max: Duration) -> Self {
        self.max_poll_duration = max;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
