//! Operator HTTP surface.
//!
//! Form-encoded POSTs that become lobby admin commands. Creating a lobby
//! is open. Every request naming a lobby is checked in the same order:
//! shared password (403), lobby exists (404), fields parse and are in
//! range (400), level resolves (502/400), and finally the lobby accepts
//! the command in its current phase (409).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dustlobby_lobby::{
    AdminCommand, GameConfig, GameOverrides, LevelResolver, LobbyError, LobbyHandle,
};
use dustlobby_protocol::{LobbyId, Mode};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::error::lobby_status;
use crate::router::LobbyRouter;

/// Everything the admin handlers share.
pub struct AdminState<L: LevelResolver> {
    pub router: LobbyRouter,
    pub levels: L,
    pub password: String,
    /// Fills in fields a `start_game` form leaves out.
    pub defaults: GameConfig,
}

/// Builds the admin router.
pub fn admin_router<L: LevelResolver>(state: AdminState<L>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/create_lobby", post(create_lobby::<L>))
        .route("/api/start_game", post(start_game::<L>))
        .route("/api/start_round", post(start_round::<L>))
        .route("/api/close_lobby", post(close_lobby::<L>))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AdminError {
    /// Missing, malformed or out-of-range form field.
    BadRequest(String),
    /// Wrong password. Says nothing about whether the lobby exists.
    Forbidden,
    Lobby(LobbyError),
}

impl From<LobbyError> for AdminError {
    fn from(error: LobbyError) -> Self {
        Self::Lobby(error)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Forbidden => (StatusCode::FORBIDDEN, "invalid password".to_string()),
            Self::Lobby(error) => (
                StatusCode::from_u16(lobby_status(&error))
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                error.to_string(),
            ),
        };
        tracing::warn!(%status, %message, "admin request rejected");
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Form fields
// ---------------------------------------------------------------------------

/// Raw form fields. Blank values count as absent.
struct Fields(HashMap<String, String>);

impl Fields {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, AdminError> {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| AdminError::BadRequest(format!("invalid {key} `{value}`")))
            })
            .transpose()
    }

    fn required<T: FromStr>(&self, key: &str) -> Result<T, AdminError> {
        self.optional(key)?
            .ok_or_else(|| AdminError::BadRequest(format!("missing {key}")))
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>, AdminError> {
        Ok(self.optional::<u64>(key)?.map(Duration::from_secs))
    }

    /// `break_seconds`, or its older name `countdown_seconds`.
    fn break_seconds(&self) -> Result<Option<Duration>, AdminError> {
        match self.seconds("break_seconds")? {
            Some(secs) => Ok(Some(secs)),
            None => self.seconds("countdown_seconds"),
        }
    }

    fn level_id(&self) -> Result<Option<u64>, AdminError> {
        match self.optional::<u64>("level_id")? {
            Some(0) => Err(AdminError::BadRequest("level_id must be at least 1".into())),
            other => Ok(other),
        }
    }

    fn overrides(&self) -> Result<GameOverrides, AdminError> {
        Ok(GameOverrides {
            level: None,
            mode: self.optional::<Mode>("mode")?,
            warmup_time: self.seconds("warmup_seconds")?,
            round_time: self.seconds("round_seconds")?,
            break_time: self.break_seconds()?,
            rounds: self.optional::<u32>("rounds")?,
        })
    }
}

/// Compares without returning early on the first differing byte.
fn password_matches(given: &str, expected: &str) -> bool {
    let (a, b) = (given.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl<L: LevelResolver> AdminState<L> {
    fn authorize(&self, fields: &Fields) -> Result<(), AdminError> {
        match fields.get("password") {
            Some(given) if password_matches(given, &self.password) => Ok(()),
            _ => Err(AdminError::Forbidden),
        }
    }

    /// Authorizes, then looks up the form's lobby.
    fn lobby(&self, fields: &Fields) -> Result<LobbyHandle, AdminError> {
        self.authorize(fields)?;
        let id = fields.required::<u64>("lobby_id")?;
        Ok(self.router.lobby(LobbyId(id))?)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

/// Needs no password; any form body is ignored.
async fn create_lobby<L: LevelResolver>(
    State(state): State<Arc<AdminState<L>>>,
) -> Result<Json<Value>, AdminError> {
    let handle = state.router.create(None).await?;
    tracing::info!(lobby_id = %handle.id(), "lobby created by admin");
    Ok(Json(json!({ "lobby_id": handle.id().0 })))
}

async fn start_game<L: LevelResolver>(
    State(state): State<Arc<AdminState<L>>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AdminError> {
    let fields = Fields(fields);
    let handle = state.lobby(&fields)?;

    let level_id = fields
        .level_id()?
        .ok_or_else(|| AdminError::BadRequest("missing level_id".into()))?;
    let config = fields.overrides()?.apply(state.defaults);
    config.validate()?;
    let level = state.levels.resolve(level_id).await?;

    let transition = handle
        .admin(AdminCommand::StartGame { level, config })
        .await?;
    tracing::info!(lobby_id = %handle.id(), level_id, mode = %config.mode, "game started");
    Ok(Json(json!({ "lobby_id": handle.id().0, "phase": transition.to.to_string() })))
}

async fn start_round<L: LevelResolver>(
    State(state): State<Arc<AdminState<L>>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AdminError> {
    let fields = Fields(fields);
    let handle = state.lobby(&fields)?;

    let mut overrides = fields.overrides()?;
    overrides.apply(state.defaults).validate()?;
    if let Some(level_id) = fields.level_id()? {
        overrides.level = Some(state.levels.resolve(level_id).await?);
    }

    let transition = handle.admin(AdminCommand::StartRound(overrides)).await?;
    if transition.is_noop() {
        tracing::debug!(lobby_id = %handle.id(), phase = %transition.to, "start_round ignored");
    }
    Ok(Json(json!({ "lobby_id": handle.id().0, "phase": transition.to.to_string() })))
}

async fn close_lobby<L: LevelResolver>(
    State(state): State<Arc<AdminState<L>>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Json<Value>, AdminError> {
    let fields = Fields(fields);
    let handle = state.lobby(&fields)?;
    state.router.lobbies().destroy(handle.id()).await?;
    tracing::info!(lobby_id = %handle.id(), "lobby closed by admin");
    Ok(Json(json!({ "lobby_id": handle.id().0 })))
}
