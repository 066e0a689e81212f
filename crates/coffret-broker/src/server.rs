//! The loopback access server.
//!
//! One endpoint, `POST /` on `127.0.0.1:<ephemeral>`, announced through
//! the handshake file. Transport rules:
//!
//! - non-POST → 405, body over 1 MiB → 413 (both handled by the router)
//! - missing or wrong bearer token → 401, compared in constant time
//! - unparsable JSON body → 500 (the message never echoes the token)
//! - everything else → HTTP 200 with `{success, data?, error?}`
//!
//! Secret-touching actions go through the [`ApprovalGate`] before the
//! vault is consulted; an empty key set skips the prompt and returns an
//! empty result. While the vault is locked every data action answers
//! `{"success":false,"error":"Vault is locked"}`.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use data_encoding::HEXLOWER;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use coffret_crypto_core::constant_time_eq;
use coffret_vault::{EventLogger, VaultStore};

use crate::approval::{AccessAction, ApprovalBroker, ApprovalGate};
use crate::error::BrokerError;
use crate::handshake::Handshake;
use crate::protocol::{
    AccessRequest, AccessResponse, BatchScope, KeyScope, ProjectScope, SetSecretData, StatusData,
};
use crate::session::ActivityTracker;

/// Request body cap. Oversize bodies are rejected with 413 before any
/// state is touched.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The only origin allowed to script against the endpoint.
const LOOPBACK_ORIGIN: &str = "http://localhost";

// ---------------------------------------------------------------------------
// Server lifecycle
// ---------------------------------------------------------------------------

struct ServerState {
    vault: VaultStore,
    gate: ApprovalGate,
    token: String,
    tracker: Arc<ActivityTracker>,
}

/// A running access server.
pub struct AccessServer {
    port: u16,
    token: String,
    vault_dir: PathBuf,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl AccessServer {
    /// Bind the loopback listener, generate the bearer token, publish the
    /// handshake, and start serving.
    ///
    /// # Errors
    ///
    /// [`BrokerError::AlreadyRunning`] when a live handshake from another
    /// process exists; bind and handshake I/O errors otherwise.
    pub async fn start(
        vault: VaultStore,
        logger: Arc<EventLogger>,
        broker: Arc<dyn ApprovalBroker>,
        tracker: Arc<ActivityTracker>,
    ) -> Result<Self, BrokerError> {
        let vault_dir = vault.vault_dir().to_path_buf();

        if let Some(existing) = Handshake::read_live(&vault_dir) {
            if existing.pid != std::process::id() {
                return Err(BrokerError::AlreadyRunning(existing.pid));
            }
        }

        let token = generate_token();
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        Handshake::for_current_process(port, &token).publish(&vault_dir)?;

        let state = Arc::new(ServerState {
            vault,
            gate: ApprovalGate::new(broker, logger),
            token: token.clone(),
            tracker,
        });

        // The CORS layer goes on last so it is outermost: the router's own
        // 405 for non-POST methods and the body-limit 413 never reach the
        // handler, and they must carry the loopback-only origin header too.
        let cors = CorsLayer::new()
            .allow_origin(HeaderValue::from_static(LOOPBACK_ORIGIN))
            .allow_methods([Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        let app = Router::new()
            .route("/", post(handle_request))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(cors)
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "access server terminated abnormally");
            }
        });

        tracing::info!(port, "access server listening on loopback");
        Ok(Self {
            port,
            token,
            vault_dir,
            shutdown_tx,
            task,
        })
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The bearer token clients must present.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The directory the handshake was published into.
    #[must_use]
    pub fn vault_dir(&self) -> &std::path::Path {
        &self.vault_dir
    }

    /// Close the listener and delete the handshake file.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
        if let Err(e) = Handshake::remove(&self.vault_dir) {
            tracing::warn!(error = %e, "failed to remove handshake file");
        }
    }
}

/// 32 random bytes, hex-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

async fn handle_request(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(presented) = bearer_token(&headers) else {
        return respond(
            StatusCode::UNAUTHORIZED,
            &AccessResponse::failure("Unauthorized"),
        );
    };
    if !constant_time_eq(presented.as_bytes(), state.token.as_bytes()) {
        return respond(
            StatusCode::UNAUTHORIZED,
            &AccessResponse::failure("Unauthorized"),
        );
    }

    state.tracker.record();

    let request: AccessRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                &AccessResponse::failure(&format!("invalid request body: {e}")),
            );
        }
    };

    let response = dispatch(&state, request).await;
    respond(StatusCode::OK, &response)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn respond(status: StatusCode, response: &AccessResponse) -> Response {
    (
        status,
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, LOOPBACK_ORIGIN)],
        Json(response),
    )
        .into_response()
}

async fn dispatch(state: &ServerState, request: AccessRequest) -> AccessResponse {
    if request.action == "status" {
        return to_ok(&StatusData {
            is_unlocked: state.vault.is_unlocked(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
    }

    if !state.vault.is_unlocked() {
        return AccessResponse::failure("Vault is locked");
    }

    match request.action.as_str() {
        "listProjects" => match state.vault.get_projects() {
            Ok(projects) => to_ok(&projects),
            Err(e) => AccessResponse::failure(&e.to_string()),
        },

        "listSecretKeys" => {
            let scope: ProjectScope = match parse_data(&request.data) {
                Ok(scope) => scope,
                Err(response) => return response,
            };
            let secrets = match state.vault.get_secrets(&scope.project_name) {
                Ok(secrets) => secrets,
                Err(e) => return AccessResponse::failure(&e.to_string()),
            };
            let keys: Vec<String> = secrets.into_keys().collect();
            if keys.is_empty() {
                return to_ok(&keys);
            }
            match state
                .gate
                .confirm(&scope.project_name, &keys, AccessAction::Read)
                .await
            {
                Ok(()) => to_ok(&keys),
                Err(denied) => AccessResponse::failure(&denied),
            }
        }

        "getAllSecrets" => {
            let scope: ProjectScope = match parse_data(&request.data) {
                Ok(scope) => scope,
                Err(response) => return response,
            };
            // Key list first (for the prompt), values only after approval.
            let keys: Vec<String> = match state.vault.get_secrets(&scope.project_name) {
                Ok(secrets) => secrets.into_keys().collect(),
                Err(e) => return AccessResponse::failure(&e.to_string()),
            };
            if keys.is_empty() {
                return to_ok(&serde_json::Map::new());
            }
            if let Err(denied) = state
                .gate
                .confirm(&scope.project_name, &keys, AccessAction::Read)
                .await
            {
                return AccessResponse::failure(&denied);
            }
            match state.vault.get_secrets(&scope.project_name) {
                Ok(secrets) => to_ok(&secrets),
                Err(e) => AccessResponse::failure(&e.to_string()),
            }
        }

        "getBatchSecrets" => {
            let scope: BatchScope = match parse_data(&request.data) {
                Ok(scope) => scope,
                Err(response) => return response,
            };
            if scope.keys.is_empty() {
                return to_ok(&serde_json::Map::new());
            }
            if let Err(denied) = state
                .gate
                .confirm(&scope.project_name, &scope.keys, AccessAction::Read)
                .await
            {
                return AccessResponse::failure(&denied);
            }
            let all = match state.vault.get_secrets(&scope.project_name) {
                Ok(all) => all,
                Err(e) => return AccessResponse::failure(&e.to_string()),
            };
            // Missing keys are omitted, not errors.
            let selected: std::collections::BTreeMap<_, _> = scope
                .keys
                .iter()
                .filter_map(|k| all.get(k).map(|v| (k.clone(), v.clone())))
                .collect();
            to_ok(&selected)
        }

        "getSecret" => {
            let scope: KeyScope = match parse_data(&request.data) {
                Ok(scope) => scope,
                Err(response) => return response,
            };
            let keys = vec![scope.key.clone()];
            if let Err(denied) = state
                .gate
                .confirm(&scope.project_name, &keys, AccessAction::Read)
                .await
            {
                return AccessResponse::failure(&denied);
            }
            match state.vault.get_secret(&scope.project_name, &scope.key) {
                Ok(view) => to_ok(&view),
                Err(e) => AccessResponse::failure(&e.to_string()),
            }
        }

        "setSecret" => {
            let data: SetSecretData = match parse_data(&request.data) {
                Ok(data) => data,
                Err(response) => return response,
            };
            let keys = vec![data.key.clone()];
            if let Err(denied) = state
                .gate
                .confirm(&data.project_name, &keys, AccessAction::Write)
                .await
            {
                return AccessResponse::failure(&denied);
            }
            match state.vault.set_secret(
                &data.project_name,
                &data.key,
                &data.value,
                data.expires_at.as_deref(),
            ) {
                Ok(()) => AccessResponse::ok_empty(),
                Err(e) => AccessResponse::failure(&e.to_string()),
            }
        }

        other => AccessResponse::failure(&format!("Unknown action: {other}")),
    }
}

fn parse_data<T: DeserializeOwned>(data: &serde_json::Value) -> Result<T, AccessResponse> {
    serde_json::from_value(data.clone())
        .map_err(|e| AccessResponse::failure(&format!("invalid data: {e}")))
}

fn to_ok<T: Serialize>(value: &T) -> AccessResponse {
    match serde_json::to_value(value) {
        Ok(json) => AccessResponse::ok(json),
        Err(e) => AccessResponse::failure(&format!("response encoding failed: {e}")),
    }
}
