//! In-memory stand-in for the authentication / profile API.
//!
//! Mirrors the status codes of the real routes closely enough for dry runs
//! and end-to-end tests. In leaky mode the authorization checks on foreign
//! profiles and the user listing are switched off.

use crate::constants::DEFAULT_MOCK_PORT;
use crate::error::LoadError;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Foreign profiles → 403, listing → 403 for clients
    #[default]
    Secure,
    /// Every profile and the listing are served to anyone logged in
    Leaky,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredUser {
    pub id: u64,
    pub nom: String,
    pub prenom: String,
    pub email: String,
    pub role: String,
    #[serde(skip)]
    password: String,
}

#[derive(Debug, Default)]
struct Directory {
    next_id: u64,
    users: HashMap<u64, StoredUser>,
    by_email: HashMap<String, u64>,
    tokens: HashMap<String, u64>,
}

pub struct MockState {
    mode: AccessMode,
    directory: Mutex<Directory>,
}

impl MockState {
    pub fn new(mode: AccessMode) -> Self {
        Self {
            mode,
            directory: Mutex::new(Directory {
                next_id: 1,
                ..Directory::default()
            }),
        }
    }

    pub fn user_count(&self) -> usize {
        self.directory.lock().users.len()
    }

    pub fn find_by_email(&self, email: &str) -> Option<StoredUser> {
        let dir = self.directory.lock();
        dir.by_email
            .get(email)
            .and_then(|id| dir.users.get(id))
            .cloned()
    }

    fn caller(&self, headers: &HeaderMap) -> Option<StoredUser> {
        let token = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        let dir = self.directory.lock();
        dir.tokens.get(token).and_then(|id| dir.users.get(id)).cloned()
    }
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,63}$").expect("valid email regex")
    })
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-zA-ZÀ-ÿ\s'-]+$").expect("valid name regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
        && !email.contains("..")
        && !email.starts_with('.')
        && !email.ends_with('.')
}

/// At least 6 chars with an uppercase letter, a digit and a symbol
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 6
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

#[derive(Debug, Default, Deserialize)]
struct RegisterBody {
    nom: Option<String>,
    prenom: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateBody {
    nom: Option<String>,
    prenom: Option<String>,
    email: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<RegisterBody>) -> Response {
    let (Some(nom), Some(prenom), Some(email), Some(password)) = (
        non_empty(body.nom),
        non_empty(body.prenom),
        non_empty(body.email),
        non_empty(body.password),
    ) else {
        return message(
            StatusCode::BAD_REQUEST,
            "Nom, prénom, email et mot de passe sont requis",
        );
    };
    if !name_regex().is_match(&nom) || !name_regex().is_match(&prenom) {
        return message(StatusCode::BAD_REQUEST, "Nom ou prénom invalide");
    }
    if !is_valid_email(&email) {
        return message(StatusCode::BAD_REQUEST, "Email invalide ou dangereux");
    }
    if !is_strong_password(&password) {
        return message(StatusCode::BAD_REQUEST, "Mot de passe trop faible");
    }

    let role = match body.role.as_deref() {
        Some("ADMIN") => "ADMIN",
        Some("PROPRIETAIRE") => "PROPRIETAIRE",
        _ => "CLIENT",
    };

    let mut dir = state.directory.lock();
    if dir.by_email.contains_key(&email) {
        return message(StatusCode::CONFLICT, "Email déjà utilisé");
    }

    let id = dir.next_id;
    dir.next_id += 1;
    let user = StoredUser {
        id,
        nom,
        prenom,
        email: email.clone(),
        role: role.to_string(),
        password,
    };
    dir.by_email.insert(email, id);
    dir.users.insert(id, user.clone());

    (
        StatusCode::CREATED,
        Json(json!({ "message": "Utilisateur créé", "user": user })),
    )
        .into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<LoginBody>) -> Response {
    let (Some(email), Some(password)) = (non_empty(body.email), non_empty(body.password)) else {
        return message(StatusCode::BAD_REQUEST, "Email et mot de passe requis");
    };
    if !is_valid_email(&email) {
        return message(StatusCode::BAD_REQUEST, "Email invalide ou dangereux");
    }

    let mut dir = state.directory.lock();
    let Some(user) = dir.by_email.get(&email).and_then(|id| dir.users.get(id)) else {
        return message(StatusCode::UNAUTHORIZED, "Utilisateur non trouvé");
    };
    if user.password != password {
        return message(StatusCode::UNAUTHORIZED, "Mot de passe incorrect");
    }

    let user_id = user.id;
    let token = format!("mock.{}.{}", user_id, uuid::Uuid::new_v4().simple());
    let refresh_token = format!("refresh.{}.{}", user_id, uuid::Uuid::new_v4().simple());
    dir.tokens.insert(token.clone(), user_id);

    Json(json!({ "token": token, "refreshToken": refresh_token })).into_response()
}

/// `/api/utilisateur/me` and `/api/utilisateur/{id}` share one route
async fn get_profile(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(caller) = state.caller(&headers) else {
        return message(StatusCode::UNAUTHORIZED, "Token manquant ou invalide");
    };
    if id == "me" {
        return Json(&caller).into_response();
    }

    let Ok(target_id) = id.parse::<u64>() else {
        return message(StatusCode::BAD_REQUEST, "Identifiant invalide");
    };
    if target_id == caller.id {
        return Json(&caller).into_response();
    }

    match state.mode {
        AccessMode::Leaky => {
            let dir = state.directory.lock();
            match dir.users.get(&target_id) {
                Some(user) => Json(user).into_response(),
                None => Json(json!({
                    "id": target_id,
                    "nom": "Inconnu",
                    "prenom": "Utilisateur",
                    "role": "CLIENT",
                }))
                .into_response(),
            }
        }
        AccessMode::Secure => {
            if state.directory.lock().users.contains_key(&target_id) {
                message(StatusCode::FORBIDDEN, "Accès interdit")
            } else {
                message(StatusCode::NOT_FOUND, "Utilisateur non trouvé")
            }
        }
    }
}

async fn list_users(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let Some(caller) = state.caller(&headers) else {
        return message(StatusCode::UNAUTHORIZED, "Token manquant ou invalide");
    };
    if state.mode == AccessMode::Secure && caller.role != "ADMIN" {
        return message(StatusCode::FORBIDDEN, "Accès interdit");
    }

    let dir = state.directory.lock();
    let mut users: Vec<&StoredUser> = dir.users.values().collect();
    users.sort_by_key(|u| u.id);
    Json(json!(users)).into_response()
}

async fn update_user(
    State(state): State<Arc<MockState>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    Json(body): Json<UpdateBody>,
) -> Response {
    let Some(caller) = state.caller(&headers) else {
        return message(StatusCode::UNAUTHORIZED, "Token manquant ou invalide");
    };

    let mut dir = state.directory.lock();
    if !dir.users.contains_key(&id) {
        return message(StatusCode::NOT_FOUND, "Utilisateur non trouvé");
    }
    if id != caller.id && state.mode == AccessMode::Secure && caller.role != "ADMIN" {
        return message(StatusCode::FORBIDDEN, "Accès interdit");
    }

    if let Some(email) = non_empty(body.email) {
        if dir.by_email.get(&email).is_some_and(|owner| *owner != id) {
            return message(StatusCode::CONFLICT, "Cet email est déjà utilisé");
        }
        let previous = dir.users.get(&id).map(|u| u.email.clone());
        if let Some(previous) = previous {
            dir.by_email.remove(&previous);
        }
        dir.by_email.insert(email.clone(), id);
        if let Some(user) = dir.users.get_mut(&id) {
            user.email = email;
        }
    }

    let Some(user) = dir.users.get_mut(&id) else {
        return message(StatusCode::NOT_FOUND, "Utilisateur non trouvé");
    };
    if let Some(nom) = non_empty(body.nom) {
        user.nom = nom;
    }
    if let Some(prenom) = non_empty(body.prenom) {
        user.prenom = prenom;
    }

    Json(json!({ "message": "Utilisateur mis à jour", "utilisateur": user })).into_response()
}

async fn root() -> &'static str {
    "authload mock API"
}

pub fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/utilisateur/:id", get(get_profile))
        .route("/api/utilisateurs/", get(list_users))
        .route("/api/utilisateurs/:id", axum::routing::put(update_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A mock API running on a background task
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind `addr` (port 0 picks a free port) and start serving
    pub async fn start(addr: SocketAddr, mode: AccessMode) -> Result<Self, LoadError> {
        let state = Arc::new(MockState::new(mode));
        let app = router(Arc::clone(&state));

        let server = axum::Server::try_bind(&addr)
            .map_err(|e| LoadError::Server(format!("bind {}: {}", addr, e)))?
            .serve(app.into_make_service());
        let addr = server.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        let graceful = server.with_graceful_shutdown(async {
            rx.await.ok();
        });
        let handle = tokio::spawn(async move {
            if let Err(e) = graceful.await {
                tracing::error!(error = %e, "Mock server stopped with error");
            }
        });

        tracing::info!(%addr, ?mode, "Mock API listening");
        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            handle,
        })
    }

    /// Start on 127.0.0.1 with an ephemeral port
    pub async fn start_local(mode: AccessMode) -> Result<Self, LoadError> {
        Self::start(SocketAddr::from(([127, 0, 0, 1], 0)), mode).await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<MockState> {
        &self.state
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

/// Serve the mock API until Ctrl-C
pub async fn serve(port: Option<u16>, mode: AccessMode) -> Result<(), LoadError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port.unwrap_or(DEFAULT_MOCK_PORT)));
    let server = MockServer::start(addr, mode).await?;
    println!("🌐 authload mock API running on {} ({:?})", server.base_url(), mode);

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| LoadError::Server(e.to_string()))?;
    server.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("test_abcd1234@example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a..b@example.com"));
        assert!(!is_valid_email("<script>@example.com"));
    }

    #[test]
    fn test_password_strength() {
        assert!(is_strong_password("Motdepasse@123"));
        assert!(!is_strong_password("motdepasse@123"));
        assert!(!is_strong_password("Motdepasse123"));
        assert!(!is_strong_password("M@1"));
    }

    #[tokio::test]
    async fn test_server_starts_on_ephemeral_port() {
        let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
        assert_ne!(server.addr().port(), 0);
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.state().user_count(), 0);
        server.stop().await;
    }
}
