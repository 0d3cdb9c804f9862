//! Session state machine
//!
//! Drives one protocol run against the co-signer over the polling
//! transport: create the session, submit the first round, then
//! alternate poll/advance/submit until the engine finalizes or the
//! deadline fires. Rounds are strictly sequential; there is exactly
//! one advance per round.
//!
//! Every session carries an absolute deadline. In-flight requests are
//! allowed to complete, but once the deadline (or a cancellation)
//! fires their results are discarded and the session is torn down with
//! a best-effort DELETE.

use crate::config::EngineConfig;
use crate::transport::{CoSignerClient, PollOutcome};
use mpc_wallet_engine::{
    Advance, Error, Finalized, Result, RoundEngine, RoundEnvelope,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Observable session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initiating,
    RoundExchange(u32),
    Finalizing,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::Failed
                | SessionState::TimedOut
                | SessionState::Cancelled
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Initiating => write!(f, "initiating"),
            SessionState::RoundExchange(n) => write!(f, "round_exchange({n})"),
            SessionState::Finalizing => write!(f, "finalizing"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::TimedOut => write!(f, "timed_out"),
            SessionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Cancellation handle for a running session
///
/// Cloneable; `cancel` wakes every suspension point in the session
/// loop.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when cancellation is requested
    async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // the sender lives in self, so changed() cannot error out
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One session run, owned by the facade for the operation's duration
pub struct SessionManager<'a> {
    client: &'a CoSignerClient,
    config: &'a EngineConfig,
    state: SessionState,
    session_id: Option<String>,
}

impl<'a> SessionManager<'a> {
    pub fn new(client: &'a CoSignerClient, config: &'a EngineConfig) -> Self {
        Self {
            client,
            config,
            state: SessionState::Idle,
            session_id: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// Mark the session completed
    ///
    /// Left to the owner: key generation and rotation must not report
    /// completion before the new share is durably stored, so `run`
    /// returns in `Finalizing` and the caller drives this transition
    /// once the result has landed.
    pub fn complete(&mut self) {
        self.transition(SessionState::Completed);
        if let Some(session_id) = &self.session_id {
            info!(session_id, "session completed");
        }
    }

    /// Drive `engine` to completion against the co-signer
    ///
    /// Consumes the engine; partial round state is never reused across
    /// sessions.
    #[instrument(skip(self, engine, cancel), fields(session_type = %engine.session_type()))]
    pub async fn run(
        &mut self,
        profile_id: &str,
        mut engine: RoundEngine,
        auth_proof: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Finalized> {
        let deadline = Instant::now() + self.config.max_poll_duration;

        self.transition(SessionState::Initiating);
        let handle = match self
            .guarded(deadline, cancel, self.client.create_session(
                profile_id,
                engine.session_type(),
                auth_proof,
            ))
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.transition(terminal_for(&e));
                return Err(e);
            }
        };
        let session_id = handle.session_id.clone();
        self.session_id = Some(session_id.clone());

        match self
            .exchange(&session_id, &mut engine, deadline, cancel)
            .await
        {
            Ok(finalized) => Ok(finalized),
            Err(e) => {
                self.transition(terminal_for(&e));
                warn!(session_id, error = %e, state = %self.state, "session ended");
                // detached teardown: the caller's error return must not
                // wait on a co-signer that is already unresponsive
                let client = self.client.clone();
                tokio::spawn(async move { client.cancel(&session_id).await });
                Err(e)
            }
        }
    }

    async fn exchange(
        &mut self,
        session_id: &str,
        engine: &mut RoundEngine,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<Finalized> {
        let mut round: u32 = 1;
        let mut outbound = engine.initial_messages()?;
        self.transition(SessionState::RoundExchange(round));

        loop {
            for envelope in &outbound {
                let payload = envelope.to_bytes()?;
                self.guarded(
                    deadline,
                    cancel,
                    self.client.submit_message(session_id, envelope.round, &payload),
                )
                .await?;
            }

            let inbound = self
                .poll_round(session_id, round, deadline, cancel)
                .await?;
            match engine.advance(inbound)? {
                Advance::Next(next) => {
                    round += 1;
                    self.transition(SessionState::RoundExchange(round));
                    outbound = next;
                }
                Advance::Finalized(result) => {
                    self.transition(SessionState::Finalizing);
                    return Ok(result);
                }
            }
        }
    }

    /// Poll until the counterparty's round-`round` message arrives
    async fn poll_round(
        &self,
        session_id: &str,
        round: u32,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<Vec<RoundEnvelope>> {
        let mut interval = self.config.poll_interval;
        loop {
            let outcome = self
                .guarded(
                    deadline,
                    cancel,
                    self.client.poll(session_id, round),
                )
                .await?;
            match outcome {
                PollOutcome::Message { round: got, payload } => {
                    if got != round {
                        return Err(Error::ProtocolViolation(format!(
                            "polled round {round} but received round {got}"
                        )));
                    }
                    let envelope = RoundEnvelope::from_bytes(&payload)?;
                    return Ok(vec![envelope]);
                }
                PollOutcome::Completed => {
                    return Err(Error::SessionFailed(
                        "co-signer closed the session before the protocol converged".into(),
                    ));
                }
                PollOutcome::Failed { reason } => {
                    return Err(Error::SessionFailed(reason));
                }
                PollOutcome::Pending => {}
            }

            self.checked_sleep(interval, deadline, cancel).await?;
            if let Some(cap) = self.config.poll_backoff_cap {
                interval = (interval * 2).min(cap);
            }
        }
    }

    /// Run `fut` unless the deadline or a cancellation fires first
    ///
    /// The deadline check wraps the request itself, so a response that
    /// lands after the deadline is discarded.
    async fn guarded<T>(
        &self,
        deadline: Instant,
        cancel: &CancelToken,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::TimedOut("session deadline already elapsed".into()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            result = fut => result,
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                Err(Error::TimedOut("session deadline elapsed mid-request".into()))
            }
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    async fn checked_sleep(
        &self,
        interval: Duration,
        deadline: Instant,
        cancel: &CancelToken,
    ) -> Result<()> {
        let wake = Instant::now() + interval;
        if wake >= deadline {
            // the next poll could not land before the deadline anyway
            tokio::select! {
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    Err(Error::TimedOut("polling deadline elapsed".into()))
                }
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        } else {
            tokio::select! {
                _ = tokio::time::sleep(interval) => Ok(()),
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        }
    }
}

fn terminal_for(error: &Error) -> SessionState {
    match error {
        Error::TimedOut(_) => SessionState::TimedOut,
        Error::Cancelled => SessionState::Cancelled,
        _ => SessionState::Failed,
    }
}
