//! Scenario catalogue: which tasks a virtual user runs, how often, and how
//! long it idles in between.

use crate::actions::{self, ActionReport, RegisterOptions};
use crate::client::HttpApi;
use crate::error::LoadError;
use crate::loadtest::VirtualUser;
use crate::logging::UserEvent;
use crate::session::{Identity, SessionState};
use crate::weighted::WeightedTable;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    /// Authenticated client exercising its own profile and probing others
    Profile,
    /// Register often, log in occasionally
    Auth,
    /// Register then log in on every iteration, no think time
    Smoke,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [Self::Profile, Self::Auth, Self::Smoke];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Auth => "auth",
            Self::Smoke => "smoke",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LoadError::UnknownScenario {
                name: s.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Register,
    Login,
    RegisterThenLogin,
    ViewMyProfile,
    UpdateMyProfile,
    TryAccessOtherProfile,
    TryListAllUsers,
}

/// Think time drawn uniformly from `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTime {
    pub min: Duration,
    pub max: Duration,
}

impl WaitTime {
    pub fn between(min_secs: u64, max_secs: u64) -> Self {
        Self::between_millis(min_secs * 1000, max_secs * 1000)
    }

    pub fn between_millis(min_ms: u64, max_ms: u64) -> Self {
        let (lo, hi) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self {
            min: Duration::from_millis(lo),
            max: Duration::from_millis(hi),
        }
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        if lo == hi {
            return self.min;
        }
        Duration::from_millis(rng.random_range(lo..=hi))
    }
}

/// Static description of one kind of virtual user
#[derive(Debug, Clone)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub identity: Identity,
    pub on_start: Vec<Task>,
    pub tasks: WeightedTable<Task>,
    pub wait_time: WaitTime,
    pub register: RegisterOptions,
    pub login_request: &'static str,
}

impl Scenario {
    pub fn new(kind: ScenarioKind) -> Result<Self, LoadError> {
        let scenario = match kind {
            ScenarioKind::Profile => Self {
                kind,
                identity: Identity::profile_client(),
                on_start: vec![Task::Register, Task::Login],
                tasks: WeightedTable::new(vec![
                    (Task::ViewMyProfile, 8),
                    (Task::UpdateMyProfile, 2),
                    (Task::TryAccessOtherProfile, 1),
                    (Task::TryListAllUsers, 1),
                ])?,
                wait_time: WaitTime::between(3, 8),
                register: RegisterOptions {
                    request: "client_register",
                    ..RegisterOptions::default()
                },
                login_request: "client_login",
            },
            ScenarioKind::Auth => Self {
                kind,
                identity: Identity::auth_tester(),
                on_start: vec![],
                tasks: WeightedTable::new(vec![(Task::Register, 3), (Task::Login, 1)])?,
                wait_time: WaitTime::between(1, 3),
                register: RegisterOptions::default(),
                login_request: "login",
            },
            ScenarioKind::Smoke => Self {
                kind,
                identity: Identity::auth_tester(),
                on_start: vec![],
                tasks: WeightedTable::new(vec![(Task::RegisterThenLogin, 1)])?,
                wait_time: WaitTime::none(),
                register: RegisterOptions::default(),
                login_request: "login",
            },
        };
        Ok(scenario)
    }

    pub fn with_wait_time(mut self, wait_time: WaitTime) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn with_register_pause(mut self, pause: Duration) -> Self {
        self.register.pause = pause;
        self
    }

    pub fn with_root_probe(mut self, probe_root: bool) -> Self {
        self.register.probe_root = probe_root;
        self
    }

    /// Run one task for one session and report every request it made
    pub async fn run_task<R: Rng + Send>(
        &self,
        task: Task,
        session: &mut SessionState,
        api: &dyn HttpApi,
        rng: &mut R,
    ) -> Vec<ActionReport> {
        match task {
            Task::Register => vec![actions::register(session, api, &self.register).await],
            Task::Login => vec![actions::login(session, api, self.login_request).await],
            Task::RegisterThenLogin => {
                // Each iteration is a brand-new account
                *session = SessionState::new(self.identity.clone());
                let registered = actions::register(session, api, &self.register).await;
                let logged_in = actions::login(session, api, self.login_request).await;
                vec![registered, logged_in]
            }
            Task::ViewMyProfile => vec![actions::view_my_profile(session, api).await],
            Task::UpdateMyProfile => vec![actions::update_my_profile(session, api, rng).await],
            Task::TryAccessOtherProfile => {
                vec![actions::try_access_other_profile(session, api, rng).await]
            }
            Task::TryListAllUsers => vec![actions::try_list_all_users(session, api).await],
        }
    }
}

/// Account state of a session before a task ran
#[derive(Debug, Clone)]
struct SessionMark {
    email: String,
    registered: bool,
    token: Option<String>,
}

impl SessionMark {
    fn of(session: &SessionState) -> Self {
        Self {
            email: session.email.clone(),
            registered: session.registered,
            token: session.auth_token().map(str::to_string),
        }
    }
}

/// Lifecycle events implied by how a task changed the session
fn session_events(user: usize, before: &SessionMark, after: &SessionState) -> Vec<UserEvent> {
    let mut events = Vec::new();
    let email_changed = before.email != after.email;
    if email_changed {
        events.push(UserEvent::EmailRegenerated {
            user,
            email: after.email.clone(),
        });
    }
    if after.registered && (email_changed || !before.registered) {
        events.push(UserEvent::Registered {
            user,
            email: after.email.clone(),
        });
    }
    if after.auth_token().is_some() && after.auth_token() != before.token.as_deref() {
        events.push(UserEvent::LoggedIn {
            user,
            email: after.email.clone(),
        });
    }
    events
}

/// A virtual user driven by a [`Scenario`]
pub struct ScenarioUser {
    id: usize,
    scenario: Arc<Scenario>,
    api: Arc<dyn HttpApi>,
    session: SessionState,
    rng: StdRng,
}

impl ScenarioUser {
    pub fn new(id: usize, scenario: Arc<Scenario>, api: Arc<dyn HttpApi>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
            None => StdRng::from_os_rng(),
        };
        let session = SessionState::new(scenario.identity.clone());
        Self {
            id,
            scenario,
            api,
            session,
            rng,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    async fn run_logged(&mut self, task: Task) -> Vec<ActionReport> {
        let before = SessionMark::of(&self.session);
        let reports = self
            .scenario
            .run_task(task, &mut self.session, self.api.as_ref(), &mut self.rng)
            .await;
        for event in session_events(self.id, &before, &self.session) {
            tracing::info!("{}", event);
        }
        reports
    }
}

#[async_trait]
impl VirtualUser for ScenarioUser {
    fn id(&self) -> usize {
        self.id
    }

    async fn on_start(&mut self) -> Vec<ActionReport> {
        self.session = SessionState::new(self.scenario.identity.clone());
        tracing::info!(
            "{}",
            UserEvent::Started {
                user: self.id,
                email: self.session.email.clone(),
            }
        );

        let mut reports = Vec::new();
        for task in self.scenario.on_start.clone() {
            reports.extend(self.run_logged(task).await);
        }
        reports
    }

    async fn run_next(&mut self) -> Vec<ActionReport> {
        let task = *self.scenario.tasks.choose(&mut self.rng);
        self.run_logged(task).await
    }

    fn wait_time(&mut self) -> Duration {
        self.scenario.wait_time.sample(&mut self.rng)
    }

    async fn on_stop(&mut self) {
        tracing::info!(
            "{}",
            UserEvent::Stopped {
                user: self.id,
                authenticated: self.session.is_authenticated(),
            }
        );
    }
}
