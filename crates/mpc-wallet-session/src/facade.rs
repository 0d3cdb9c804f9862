//! Wallet service facade
//!
//! Single entry point for callers: every MPC operation goes through
//! here, behind a per-profile fail-fast lock. At most one operation
//! per profile is in flight; a second caller gets
//! `OperationInProgress` immediately instead of queueing. Read-only
//! calls (`has_wallet`, `get_wallet_info`) bypass the lock.

use crate::config::EngineConfig;
use crate::session::{CancelToken, SessionManager};
use crate::transport::CoSignerClient;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use mpc_wallet_engine::{
    BackupData, BackupEngine, Error, ExportData, ExportEngine, Finalized, KeyShare,
    KeyShareStore, KeygenEngine, ProfileId, Result, RotationEngine, RoundEngine, Signature,
    SigningEngine, SigningRequest, WalletInfo,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

/// Caller-facing wallet operations
#[async_trait]
pub trait WalletOperations: Send + Sync {
    /// Run distributed key generation and persist the resulting share
    async fn generate_wallet(&self, profile_id: &str) -> Result<WalletInfo>;

    /// Sign a payload with the stored share and the co-signer
    async fn sign(&self, profile_id: &str, request: SigningRequest) -> Result<Signature>;

    /// Whether a share exists for the profile; takes no lock
    async fn has_wallet(&self, profile_id: &str) -> Result<bool>;

    /// Read-only wallet metadata; takes no lock
    async fn get_wallet_info(&self, profile_id: &str) -> Result<WalletInfo>;

    /// Refresh both shares without changing the wallet address
    async fn rotate_key_share(&self, profile_id: &str) -> Result<WalletInfo>;

    /// Produce an encrypted backup sealed to `recipient_key`
    async fn create_backup(
        &self,
        profile_id: &str,
        label: &str,
        recipient_key: [u8; 32],
        auth_proof: &str,
    ) -> Result<BackupData>;

    /// Reconstruct the full private key, sealed under `export_key`
    async fn export_private_key(
        &self,
        profile_id: &str,
        export_key: Zeroizing<[u8; 32]>,
        auth_proof: &str,
    ) -> Result<ExportData>;
}

/// The facade implementation
pub struct WalletService {
    config: EngineConfig,
    client: CoSignerClient,
    store: Arc<dyn KeyShareStore>,
    /// Profiles with an operation in flight
    busy: DashSet<ProfileId>,
    /// Cancellation handles for in-flight operations
    active: DashMap<ProfileId, CancelToken>,
}

/// RAII release of the per-profile lock
struct OpGuard<'a> {
    service: &'a WalletService,
    profile_id: ProfileId,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.service.active.remove(&self.profile_id);
        self.service.busy.remove(&self.profile_id);
    }
}

impl WalletService {
    pub fn new(config: EngineConfig, store: Arc<dyn KeyShareStore>) -> Result<Self> {
        let client = CoSignerClient::new(&config)?;
        Ok(Self {
            config,
            client,
            store,
            busy: DashSet::new(),
            active: DashMap::new(),
        })
    }

    /// Request cancellation of the profile's in-flight operation
    ///
    /// No-op when nothing is running; the operation itself returns
    /// `Cancelled` to its original caller.
    pub fn cancel_operation(&self, profile_id: &str) {
        if let Some(entry) = self.active.get(profile_id) {
            info!(profile_id, "cancellation requested");
            entry.value().cancel();
        }
    }

    fn check_enabled(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(Error::ServiceDisabled);
        }
        Ok(())
    }

    fn check_profile(profile_id: &str) -> Result<()> {
        if profile_id.trim().is_empty() {
            return Err(Error::ProfileNotFound(profile_id.to_string()));
        }
        Ok(())
    }

    /// Take the fail-fast per-profile lock
    fn acquire(&self, profile_id: &str) -> Result<(OpGuard<'_>, CancelToken)> {
        if !self.busy.insert(profile_id.to_string()) {
            return Err(Error::OperationInProgress(profile_id.to_string()));
        }
        let guard = OpGuard {
            service: self,
            profile_id: profile_id.to_string(),
        };
        let cancel = CancelToken::new();
        self.active.insert(profile_id.to_string(), cancel.clone());
        Ok((guard, cancel))
    }

    async fn load_share(&self, profile_id: &str) -> Result<KeyShare> {
        self.store
            .get(profile_id)
            .await?
            .ok_or_else(|| Error::NoWallet(profile_id.to_string()))
    }

    /// Run one engine through the session state machine
    ///
    /// Returns the manager still in `Finalizing`; the caller marks it
    /// completed once the operation's result is durable.
    async fn run_session(
        &self,
        profile_id: &str,
        engine: RoundEngine,
        auth_proof: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<(Finalized, SessionManager<'_>)> {
        let mut manager = SessionManager::new(&self.client, &self.config);
        let finalized = manager.run(profile_id, engine, auth_proof, cancel).await?;
        Ok((finalized, manager))
    }
}

#[async_trait]
impl WalletOperations for WalletService {
    #[instrument(skip(self))]
    async fn generate_wallet(&self, profile_id: &str) -> Result<WalletInfo> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        let (_guard, cancel) = self.acquire(profile_id)?;

        // refuse before any network traffic; an existing share is
        // never silently overwritten
        if self.store.exists(profile_id).await? {
            return Err(Error::AlreadyExists(profile_id.to_string()));
        }

        let engine = RoundEngine::Keygen(KeygenEngine::new(self.config.algorithm)?);
        let (finalized, mut session) = self.run_session(profile_id, engine, None, &cancel).await?;
        let Finalized::KeyShare {
            share_data,
            public_key,
            address,
        } = finalized
        else {
            return Err(Error::ProtocolViolation(
                "key generation finalized with a non-keyshare result".into(),
            ));
        };

        let share = KeyShare {
            profile_id: profile_id.to_string(),
            algorithm: self.config.algorithm,
            share_data: share_data.to_vec(),
            public_key,
            derived_address: address,
            created_at: Utc::now().timestamp(),
            rotated_at: None,
        };
        // the wallet is not usable until the share is durably stored
        self.store.put(profile_id, &share).await?;
        session.complete();
        info!(profile_id, address = %share.derived_address, "wallet generated");
        Ok(share.wallet_info())
    }

    #[instrument(skip(self, request), fields(request_id = %request.request_id))]
    async fn sign(&self, profile_id: &str, request: SigningRequest) -> Result<Signature> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        let (_guard, cancel) = self.acquire(profile_id)?;

        let share = self.load_share(profile_id).await?;
        let engine = RoundEngine::Signing(SigningEngine::new(
            share.algorithm,
            Zeroizing::new(share.share_data.clone()),
            share.public_key.clone(),
            request.digest(),
        )?);
        let (finalized, mut session) = self.run_session(profile_id, engine, None, &cancel).await?;
        let Finalized::Signature(signature) = finalized else {
            return Err(Error::ProtocolViolation(
                "signing finalized with a non-signature result".into(),
            ));
        };
        session.complete();
        info!(profile_id, "payload signed");
        Ok(signature)
    }

    async fn has_wallet(&self, profile_id: &str) -> Result<bool> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        self.store.exists(profile_id).await
    }

    async fn get_wallet_info(&self, profile_id: &str) -> Result<WalletInfo> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        Ok(self.load_share(profile_id).await?.wallet_info())
    }

    #[instrument(skip(self))]
    async fn rotate_key_share(&self, profile_id: &str) -> Result<WalletInfo> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        let (_guard, cancel) = self.acquire(profile_id)?;

        let old = self.load_share(profile_id).await?;
        let engine = RoundEngine::Rotation(RotationEngine::new(
            old.algorithm,
            &Zeroizing::new(old.share_data.clone()),
            old.public_key.clone(),
        )?);
        let (finalized, mut session) = self.run_session(profile_id, engine, None, &cancel).await?;
        let Finalized::KeyShare {
            share_data,
            public_key,
            address,
        } = finalized
        else {
            return Err(Error::ProtocolViolation(
                "rotation finalized with a non-keyshare result".into(),
            ));
        };

        let rotated = KeyShare {
            profile_id: profile_id.to_string(),
            algorithm: old.algorithm,
            share_data: share_data.to_vec(),
            public_key,
            derived_address: address,
            created_at: old.created_at,
            rotated_at: Some(Utc::now().timestamp()),
        };
        // atomic overwrite: a crash leaves either the old or the new
        // share on disk, never a torn record
        self.store.put(profile_id, &rotated).await?;
        session.complete();
        info!(profile_id, "key share rotated");
        Ok(rotated.wallet_info())
    }

    #[instrument(skip(self, recipient_key, auth_proof))]
    async fn create_backup(
        &self,
        profile_id: &str,
        label: &str,
        recipient_key: [u8; 32],
        auth_proof: &str,
    ) -> Result<BackupData> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        let (_guard, cancel) = self.acquire(profile_id)?;

        let share = self.load_share(profile_id).await?;
        let engine = RoundEngine::Backup(BackupEngine::new(
            share.algorithm,
            Zeroizing::new(share.share_data.clone()),
            share.public_key.clone(),
            label.to_string(),
            recipient_key,
        ));
        let (finalized, mut session) = self
            .run_session(profile_id, engine, Some(auth_proof), &cancel)
            .await?;
        let Finalized::Backup(backup) = finalized else {
            return Err(Error::ProtocolViolation(
                "backup finalized with a non-backup result".into(),
            ));
        };
        session.complete();
        info!(profile_id, label, "backup created");
        Ok(backup)
    }

    #[instrument(skip(self, export_key, auth_proof))]
    async fn export_private_key(
        &self,
        profile_id: &str,
        export_key: Zeroizing<[u8; 32]>,
        auth_proof: &str,
    ) -> Result<ExportData> {
        self.check_enabled()?;
        Self::check_profile(profile_id)?;
        let (_guard, cancel) = self.acquire(profile_id)?;

        let share = self.load_share(profile_id).await?;
        let engine = RoundEngine::Export(ExportEngine::new(
            share.algorithm,
            Zeroizing::new(share.share_data.clone()),
            share.public_key.clone(),
            export_key,
        ));
        let (finalized, mut session) = self
            .run_session(profile_id, engine, Some(auth_proof), &cancel)
            .await?;
        let Finalized::Export(export) = finalized else {
            return Err(Error::ProtocolViolation(
                "export finalized with a non-export result".into(),
            ));
        };
        session.complete();
        warn!(profile_id, "full private key exported");
        Ok(export)
    }
}
