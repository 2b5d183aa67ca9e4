//! Virtual user actions.
//!
//! Every action is a free async function over a [`SessionState`] and an
//! [`HttpApi`]. Nothing here sleeps between actions or decides what runs
//! next; that belongs to the runner. Outcomes are returned, never thrown.

use crate::client::{ApiRequest, ApiResponse, HttpApi};
use crate::constants::{
    CLIENT_ROLE, FIRST_NAME_POOL, LAST_NAME_POOL, LOGIN_PATH, MY_PROFILE_PATH,
    OTHER_PROFILE_ID_MAX, OTHER_PROFILE_ID_MIN, PROFILE_PATH_PREFIX, REGISTER_PATH,
    USERS_PATH_PREFIX, USER_LIST_PATH,
};
use crate::error::TransportError;
use crate::session::SessionState;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::{Duration, Instant};

/// How a single action ended
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Success,
    /// Negative answer the script anticipates (409 on duplicate email).
    /// Still counted as a failure.
    ExpectedFailure { reason: String },
    UnexpectedFailure { status: Option<u16>, reason: String },
    /// An authorization probe received data it must not see
    AuthorizationBypass { status: u16, path: String },
    /// The request never produced a response; absorbed by the action
    Transport(TransportError),
    /// Preconditions not met, no request was sent
    Skipped { reason: &'static str },
}

impl ActionOutcome {
    pub fn unexpected_status(status: u16, context: &str) -> Self {
        Self::UnexpectedFailure {
            status: Some(status),
            reason: format!("{}: {}", context, status),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ExpectedFailure { .. }
                | Self::UnexpectedFailure { .. }
                | Self::AuthorizationBypass { .. }
                | Self::Transport(_)
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_authorization_bypass(&self) -> bool {
        matches!(self, Self::AuthorizationBypass { .. })
    }

    /// Status code behind this outcome, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedFailure { status, .. } => *status,
            Self::AuthorizationBypass { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message used to group failures in the final report
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::ExpectedFailure { reason } => Some(reason.clone()),
            Self::UnexpectedFailure { reason, .. } => Some(reason.clone()),
            Self::AuthorizationBypass { .. } => Some("authorization bypass detected".to_string()),
            Self::Transport(err) => Some(format!("transport {}", err.kind())),
            Self::Success | Self::Skipped { .. } => None,
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::ExpectedFailure { reason } => write!(f, "expected failure ({})", reason),
            Self::UnexpectedFailure { reason, .. } => write!(f, "failure ({})", reason),
            Self::AuthorizationBypass { status, path } => {
                write!(f, "authorization bypass detected on {} ({})", path, status)
            }
            Self::Transport(err) => write!(f, "transport error ({})", err),
            Self::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Outcome of one action plus the request name it is reported under
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub request: &'static str,
    pub outcome: ActionOutcome,
    /// Time spent waiting on the target; zero when nothing was sent
    pub elapsed: Duration,
}

impl ActionReport {
    fn skipped(request: &'static str, reason: &'static str) -> Self {
        Self {
            request,
            outcome: ActionOutcome::Skipped { reason },
            elapsed: Duration::ZERO,
        }
    }
}

async fn timed_send(
    api: &dyn HttpApi,
    request: ApiRequest,
) -> (Result<ApiResponse, TransportError>, Duration) {
    let start = Instant::now();
    let result = api.send(request).await;
    (result, start.elapsed())
}

/// Knobs of the register action
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub request: &'static str,
    /// Pause after a successful registration, zero disables it
    pub pause: Duration,
    /// Send a `GET /` first and log its status
    pub probe_root: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            request: "register",
            pause: Duration::ZERO,
            probe_root: false,
        }
    }
}

/// `POST /api/auth/register`
pub async fn register(
    session: &mut SessionState,
    api: &dyn HttpApi,
    options: &RegisterOptions,
) -> ActionReport {
    if options.probe_root {
        match api.send(ApiRequest::get("/")).await {
            Ok(resp) => tracing::debug!(status = resp.status, "Server connectivity probe"),
            Err(err) => tracing::debug!(error = %err, "Server connectivity probe failed"),
        }
    }

    let body = json!({
        "nom": session.identity.last_name,
        "prenom": session.identity.first_name,
        "email": session.email,
        "password": session.password,
        "role": CLIENT_ROLE,
    });

    let (result, elapsed) = timed_send(api, ApiRequest::post(REGISTER_PATH).json(body)).await;

    let outcome = match result {
        Ok(resp) if resp.status == 200 || resp.status == 201 => {
            session.mark_registered();
            tracing::debug!(email = %session.email, "Registration accepted");
            if !options.pause.is_zero() {
                tokio::time::sleep(options.pause).await;
            }
            ActionOutcome::Success
        }
        Ok(resp) if resp.status == 409 => {
            let email = session.regenerate_email();
            tracing::debug!(email = %email, "Email already in use, generated a new one");
            ActionOutcome::ExpectedFailure {
                reason: "email already in use, new email generated".to_string(),
            }
        }
        Ok(resp) => ActionOutcome::unexpected_status(resp.status, "registration failed"),
        Err(err) => {
            session.regenerate_email();
            ActionOutcome::Transport(err)
        }
    };

    ActionReport {
        request: options.request,
        outcome,
        elapsed,
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// `POST /api/auth/login`, only once registered
pub async fn login(
    session: &mut SessionState,
    api: &dyn HttpApi,
    request: &'static str,
) -> ActionReport {
    if !session.registered {
        return ActionReport::skipped(request, "not registered yet");
    }

    let body = json!({
        "email": session.email,
        "password": session.password,
    });

    let (result, elapsed) = timed_send(api, ApiRequest::post(LOGIN_PATH).json(body)).await;

    let outcome = match result {
        Ok(resp) if resp.status == 200 => {
            match resp.json::<LoginResponse>().ok().and_then(|r| r.token) {
                Some(token) => {
                    session.authenticate(token);
                    tracing::debug!(email = %session.email, "Login succeeded");
                    ActionOutcome::Success
                }
                None => ActionOutcome::UnexpectedFailure {
                    status: Some(200),
                    reason: "login response missing token".to_string(),
                },
            }
        }
        Ok(resp) => ActionOutcome::unexpected_status(resp.status, "login failed"),
        Err(err) => ActionOutcome::Transport(err),
    };

    ActionReport {
        request,
        outcome,
        elapsed,
    }
}

pub const VIEW_MY_PROFILE: &str = "01_client_view_my_profile";
pub const UPDATE_MY_PROFILE: &str = "02_client_update_my_profile";
pub const TRY_ACCESS_OTHER: &str = "03_client_try_access_other";
pub const TRY_LIST_USERS: &str = "04_client_try_list_users";

/// `GET /api/utilisateur/me`, caching the profile on success
pub async fn view_my_profile(session: &mut SessionState, api: &dyn HttpApi) -> ActionReport {
    if !session.is_authenticated() {
        return ActionReport::skipped(VIEW_MY_PROFILE, "not authenticated");
    }

    let request = ApiRequest::get(MY_PROFILE_PATH).headers(session.auth_headers());
    let (result, elapsed) = timed_send(api, request).await;

    let outcome = match result {
        Ok(resp) if resp.status == 200 => match resp.json::<Value>() {
            Ok(profile) => {
                session.user_data = Some(profile);
                ActionOutcome::Success
            }
            Err(err) => {
                tracing::debug!(error = %err, "Profile body could not be parsed");
                ActionOutcome::UnexpectedFailure {
                    status: Some(200),
                    reason: "profile body not JSON".to_string(),
                }
            }
        },
        Ok(resp) => ActionOutcome::unexpected_status(resp.status, "profile lookup failed"),
        Err(err) => ActionOutcome::Transport(err),
    };

    ActionReport {
        request: VIEW_MY_PROFILE,
        outcome,
        elapsed,
    }
}

/// `PUT /api/utilisateurs/{id}` with freshly drawn names.
///
/// Sends nothing unless a cached profile with an `id` is present.
pub async fn update_my_profile<R: Rng + Send>(
    session: &mut SessionState,
    api: &dyn HttpApi,
    rng: &mut R,
) -> ActionReport {
    if !session.is_authenticated() {
        return ActionReport::skipped(UPDATE_MY_PROFILE, "not authenticated");
    }
    let Some(user_id) = session.cached_user_id() else {
        tracing::debug!(email = %session.email, "No cached user id, update skipped");
        return ActionReport::skipped(UPDATE_MY_PROFILE, "no cached user id");
    };

    let first_name = FIRST_NAME_POOL.choose(rng).copied().unwrap_or("Marie");
    let last_name = LAST_NAME_POOL.choose(rng).copied().unwrap_or("Martin");

    let body = json!({
        "nom": last_name,
        "prenom": first_name,
        "email": session.email,
    });
    let path = format!("{}/{}", USERS_PATH_PREFIX, user_id);
    let request = ApiRequest::put(path)
        .headers(session.auth_headers())
        .json(body);

    let (result, elapsed) = timed_send(api, request).await;

    let outcome = match result {
        Ok(resp) if resp.status == 200 || resp.status == 201 => {
            tracing::debug!(first_name, last_name, "Profile updated");
            ActionOutcome::Success
        }
        Ok(resp) => ActionOutcome::unexpected_status(resp.status, "profile update failed"),
        Err(err) => ActionOutcome::Transport(err),
    };

    ActionReport {
        request: UPDATE_MY_PROFILE,
        outcome,
        elapsed,
    }
}

/// Pick an id in `[100, 200)` that is presumably not ours
pub fn other_profile_id<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.random_range(OTHER_PROFILE_ID_MIN..OTHER_PROFILE_ID_MAX)
}

/// `GET /api/utilisateur/{id}` for a random foreign id. Denial passes.
pub async fn try_access_other_profile<R: Rng + Send>(
    session: &mut SessionState,
    api: &dyn HttpApi,
    rng: &mut R,
) -> ActionReport {
    if !session.is_authenticated() {
        return ActionReport::skipped(TRY_ACCESS_OTHER, "not authenticated");
    }
    let other_id = other_profile_id(rng);
    access_profile_by_id(session, api, other_id).await
}

/// Probe one specific foreign profile id
pub async fn access_profile_by_id(
    session: &SessionState,
    api: &dyn HttpApi,
    other_id: u64,
) -> ActionReport {
    if !session.is_authenticated() {
        return ActionReport::skipped(TRY_ACCESS_OTHER, "not authenticated");
    }

    let path = format!("{}/{}", PROFILE_PATH_PREFIX, other_id);
    let request = ApiRequest::get(path.clone()).headers(session.auth_headers());
    let (result, elapsed) = timed_send(api, request).await;

    let outcome = match result {
        Ok(resp) => classify_other_profile_probe(resp.status, &path),
        Err(err) => ActionOutcome::Transport(err),
    };

    ActionReport {
        request: TRY_ACCESS_OTHER,
        outcome,
        elapsed,
    }
}

/// `GET /api/utilisateurs/`. Only 403 passes.
pub async fn try_list_all_users(session: &mut SessionState, api: &dyn HttpApi) -> ActionReport {
    if !session.is_authenticated() {
        return ActionReport::skipped(TRY_LIST_USERS, "not authenticated");
    }

    let request = ApiRequest::get(USER_LIST_PATH).headers(session.auth_headers());
    let (result, elapsed) = timed_send(api, request).await;

    let outcome = match result {
        Ok(resp) => classify_user_list_probe(resp.status),
        Err(err) => ActionOutcome::Transport(err),
    };

    ActionReport {
        request: TRY_LIST_USERS,
        outcome,
        elapsed,
    }
}

/// 403 and 404 mean access was denied, which is the passing case
pub fn classify_other_profile_probe(status: u16, path: &str) -> ActionOutcome {
    match status {
        403 | 404 => ActionOutcome::Success,
        200 => ActionOutcome::AuthorizationBypass {
            status,
            path: path.to_string(),
        },
        other => ActionOutcome::unexpected_status(other, "unexpected status"),
    }
}

pub fn classify_user_list_probe(status: u16) -> ActionOutcome {
    match status {
        403 => ActionOutcome::Success,
        200 => ActionOutcome::AuthorizationBypass {
            status,
            path: USER_LIST_PATH.to_string(),
        },
        other => ActionOutcome::unexpected_status(other, "unexpected status"),
    }
}
