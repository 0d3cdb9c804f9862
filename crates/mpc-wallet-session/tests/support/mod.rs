//! In-process mock co-signer
//!
//! Runs the counterparty side of every protocol behind the same HTTP
//! session API the real service exposes, using the engine crate's
//! public curve and seal primitives. Co-signer shares persist across
//! sessions per profile, so keygen followed by signing works the way
//! it would against the real service.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use mpc_wallet_engine::protocol::{RoundBody, RoundEnvelope, PROTOCOL_VERSION};
use mpc_wallet_engine::{curve, seal, Algorithm};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Failure injection knobs
#[derive(Debug, Default, Clone)]
pub struct SimBehavior {
    /// Every poll returns 204, forcing client-side timeout
    pub never_respond: bool,
    /// Polls report `{status: "failed"}` instead of a message
    pub fail_sessions: bool,
    /// Session creation returns 503
    pub reject_create: bool,
    /// DELETE hangs instead of answering
    pub hang_delete: bool,
}

/// Install a fmt subscriber once for the whole test binary
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

struct ProfileKeys {
    algorithm: Algorithm,
    secret: [u8; 32],
    public_share: Vec<u8>,
    joint: Option<Vec<u8>>,
}

struct SignCtx {
    nonce: [u8; 32],
    digest: [u8; 32],
    aggregate: Vec<u8>,
}

struct SessionRec {
    profile_id: String,
    replies: Mutex<HashMap<u32, String>>,
    sign_ctx: Mutex<Option<SignCtx>>,
}

struct SimState {
    profiles: DashMap<String, ProfileKeys>,
    sessions: DashMap<String, SessionRec>,
    behavior: Mutex<SimBehavior>,
    create_count: AtomicUsize,
    delete_count: AtomicUsize,
    last_auth: Mutex<Option<String>>,
}

/// Handle to a running mock co-signer
pub struct MockCoSigner {
    pub base_url: String,
    state: Arc<SimState>,
}

impl MockCoSigner {
    pub async fn start() -> Self {
        let state = Arc::new(SimState {
            profiles: DashMap::new(),
            sessions: DashMap::new(),
            behavior: Mutex::new(SimBehavior::default()),
            create_count: AtomicUsize::new(0),
            delete_count: AtomicUsize::new(0),
            last_auth: Mutex::new(None),
        });

        let app = Router::new()
            .route("/mpc/session", post(create_session))
            .route("/mpc/session/{id}/message", post(submit_message))
            .route("/mpc/session/{id}/poll", get(poll_session))
            .route("/mpc/session/{id}", delete(cancel_session))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock co-signer");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        *self.state.behavior.lock().expect("behavior lock") = behavior;
    }

    pub fn sessions_created(&self) -> usize {
        self.state.create_count.load(Ordering::SeqCst)
    }

    pub fn sessions_deleted(&self) -> usize {
        self.state.delete_count.load(Ordering::SeqCst)
    }

    /// Wait until `n` DELETEs have arrived; teardown is fire-and-forget
    /// so it can land shortly after the operation's error return
    pub async fn wait_for_deletes(&self, n: usize) {
        for _ in 0..200 {
            if self.sessions_deleted() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!(
            "expected {n} session deletes, saw {}",
            self.sessions_deleted()
        );
    }

    pub fn last_auth_header(&self) -> Option<String> {
        self.state.last_auth.lock().expect("auth lock").clone()
    }

    /// The co-signer's current public share for a profile
    pub fn cosigner_public_share(&self, profile_id: &str) -> Option<Vec<u8>> {
        self.state
            .profiles
            .get(profile_id)
            .map(|p| p.public_share.clone())
    }
}

fn commit_to(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn record_auth(state: &SimState, headers: &axum::http::HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    *state.last_auth.lock().expect("auth lock") = auth;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    profile_id: String,
    #[serde(rename = "type")]
    _session_type: String,
}

async fn create_session(
    State(state): State<Arc<SimState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CreateBody>,
) -> impl IntoResponse {
    record_auth(&state, &headers);
    state.create_count.fetch_add(1, Ordering::SeqCst);
    if state.behavior.lock().expect("behavior lock").reject_create {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "maintenance"})))
            .into_response();
    }
    let session_id = Uuid::new_v4().to_string();
    state.sessions.insert(
        session_id.clone(),
        SessionRec {
            profile_id: body.profile_id,
            replies: Mutex::new(HashMap::new()),
            sign_ctx: Mutex::new(None),
        },
    );
    Json(json!({
        "sessionId": session_id,
        "expiresAt": "2099-01-01T00:00:00Z",
    }))
    .into_response()
}

#[derive(Deserialize)]
struct SubmitBody {
    round: u32,
    payload: String,
}

async fn submit_message(
    State(state): State<Arc<SimState>>,
    Path(id): Path<String>,
    headers: axum::http::HeaderMap,
    Json(body): Json<SubmitBody>,
) -> impl IntoResponse {
    record_auth(&state, &headers);
    let Some(session) = state.sessions.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(bytes) = BASE64.decode(body.payload.as_bytes()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(envelope) = RoundEnvelope::from_bytes(&bytes) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if let Some(reply) = respond(&state, &session, &envelope) {
        let encoded = BASE64.encode(reply.to_bytes().expect("encode reply"));
        session
            .replies
            .lock()
            .expect("replies lock")
            .insert(body.round, encoded);
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Deserialize)]
struct PollQuery {
    round: u32,
}

async fn poll_session(
    State(state): State<Arc<SimState>>,
    Path(id): Path<String>,
    Query(query): Query<PollQuery>,
) -> impl IntoResponse {
    let behavior = state.behavior.lock().expect("behavior lock").clone();
    if behavior.never_respond {
        return StatusCode::NO_CONTENT.into_response();
    }
    if behavior.fail_sessions {
        return Json(json!({"status": "failed", "reason": "simulated failure"})).into_response();
    }
    let Some(session) = state.sessions.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let replies = session.replies.lock().expect("replies lock");
    match replies.get(&query.round) {
        Some(payload) => {
            Json(json!({"round": query.round, "payload": payload})).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn cancel_session(
    State(state): State<Arc<SimState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.delete_count.fetch_add(1, Ordering::SeqCst);
    if state.behavior.lock().expect("behavior lock").hang_delete {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    }
    state.sessions.remove(&id);
    StatusCode::NO_CONTENT
}

/// Play the co-signer's role for one inbound client message
fn respond(state: &SimState, session: &SessionRec, env: &RoundEnvelope) -> Option<RoundEnvelope> {
    let profile_id = session.profile_id.clone();
    let algorithm = env.algorithm;
    let reply = |round: u32, body: RoundBody| RoundEnvelope {
        version: PROTOCOL_VERSION,
        correlation_id: env.correlation_id.clone(),
        algorithm,
        round,
        body,
    };

    match &env.body {
        RoundBody::KeygenCommit { .. } => {
            let secret = curve::random_scalar(algorithm);
            let public_share = curve::mul_base(algorithm, secret.as_ref()).expect("mul_base");
            let commitment = commit_to(&public_share);
            state.profiles.insert(
                profile_id,
                ProfileKeys {
                    algorithm,
                    secret: *secret,
                    public_share,
                    joint: None,
                },
            );
            Some(reply(1, RoundBody::KeygenCommit { commitment }))
        }
        RoundBody::KeygenReveal { public_share } => {
            let mut profile = state.profiles.get_mut(&profile_id)?;
            let joint = curve::point_add(algorithm, public_share, &profile.public_share)
                .expect("joint key");
            profile.joint = Some(joint);
            let ours = profile.public_share.clone();
            Some(reply(2, RoundBody::KeygenReveal { public_share: ours }))
        }
        RoundBody::SignCommit {
            digest,
            nonce_point,
        } => {
            let profile = state.profiles.get(&profile_id)?;
            let nonce = curve::random_scalar(algorithm);
            let our_point = curve::mul_base(algorithm, nonce.as_ref()).expect("nonce point");
            let aggregate =
                curve::point_add(algorithm, nonce_point, &our_point).expect("aggregate");
            *session.sign_ctx.lock().expect("sign ctx") = Some(SignCtx {
                nonce: *nonce,
                digest: *digest,
                aggregate: aggregate.clone(),
            });
            drop(profile);
            Some(reply(
                1,
                RoundBody::SignCommit {
                    digest: *digest,
                    nonce_point: our_point,
                },
            ))
        }
        RoundBody::SignPartial { partial } => {
            let profile = state.profiles.get(&profile_id)?;
            let ctx = session.sign_ctx.lock().expect("sign ctx").take()?;
            let joint = profile.joint.clone()?;
            let e = curve::challenge(algorithm, &ctx.aggregate, &joint, &ctx.digest)
                .expect("challenge");
            let ours = curve::partial_response(algorithm, &ctx.nonce, &e, &profile.secret)
                .expect("partial");
            let s = curve::scalar_add(algorithm, partial, ours.as_ref()).expect("combine");
            let mut signature = ctx.aggregate;
            signature.extend_from_slice(s.as_ref());
            Some(reply(2, RoundBody::SignFinal { signature }))
        }
        RoundBody::RotateOffer { delta, .. } => {
            let mut profile = state.profiles.get_mut(&profile_id)?;
            let new_secret =
                curve::scalar_sub(algorithm, &profile.secret, delta).expect("rotate");
            let new_public =
                curve::mul_base(algorithm, new_secret.as_ref()).expect("rotated point");
            profile.secret = *new_secret;
            profile.public_share = new_public.clone();
            Some(reply(
                1,
                RoundBody::RotateAck {
                    new_public_share: new_public,
                },
            ))
        }
        RoundBody::BackupRequest { recipient_key, .. } => {
            let profile = state.profiles.get(&profile_id)?;
            let blob =
                seal::seal_to_recipient(recipient_key, &profile.secret).expect("seal share");
            Some(reply(
                1,
                RoundBody::BackupGrant {
                    cosigner_blob: serde_json::to_vec(&blob).expect("encode blob"),
                },
            ))
        }
        RoundBody::ExportRequest {} => {
            let profile = state.profiles.get(&profile_id)?;
            Some(reply(
                1,
                RoundBody::ExportGrant {
                    cosigner_share: profile.secret.to_vec(),
                },
            ))
        }
        _ => None,
    }
}
