/// End-to-end runs against the in-memory mock API over real HTTP
use authload::actions::{self, RegisterOptions};
use authload::client::{HttpApi, ReqwestApi};
use authload::config::LoadTestConfig;
use authload::loadtest::run_scenario;
use authload::mock::{AccessMode, MockServer};
use authload::scenario::{ScenarioKind, WaitTime};
use authload::session::{Identity, SessionState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

fn api_for(server: &MockServer) -> ReqwestApi {
    ReqwestApi::new(server.base_url(), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn test_full_profile_session_against_secure_api() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api = api_for(&server);
    let mut rng = StdRng::seed_from_u64(1);
    let mut session = SessionState::new(Identity::profile_client());

    let register = actions::register(&mut session, &api, &RegisterOptions::default()).await;
    assert!(register.outcome.is_success(), "{}", register.outcome);

    let login = actions::login(&mut session, &api, "client_login").await;
    assert!(login.outcome.is_success(), "{}", login.outcome);
    assert!(session.auth_token().unwrap().starts_with("mock."));

    let view = actions::view_my_profile(&mut session, &api).await;
    assert!(view.outcome.is_success());
    assert_eq!(session.cached_user_id().as_deref(), Some("1"));

    let update = actions::update_my_profile(&mut session, &api, &mut rng).await;
    assert!(update.outcome.is_success(), "{}", update.outcome);

    let stored = server.state().find_by_email(&session.email).unwrap();
    assert!(["Marie", "Sophie", "Julie", "Alice", "Celine"].contains(&stored.prenom.as_str()));

    let other = actions::access_profile_by_id(&session, &api, 150).await;
    assert!(other.outcome.is_success(), "{}", other.outcome);

    let list = actions::try_list_all_users(&mut session, &api).await;
    assert!(list.outcome.is_success(), "{}", list.outcome);

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_registration_gets_conflict() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api = api_for(&server);

    let mut first = SessionState::with_email(Identity::auth_tester(), "test_abcd1234@example.com");
    let mut second = SessionState::with_email(Identity::auth_tester(), "test_abcd1234@example.com");

    let ok = actions::register(&mut first, &api, &RegisterOptions::default()).await;
    assert!(ok.outcome.is_success());

    let conflict = actions::register(&mut second, &api, &RegisterOptions::default()).await;
    assert!(conflict.outcome.is_failure());
    assert!(!conflict.outcome.is_authorization_bypass());
    assert_ne!(second.email, "test_abcd1234@example.com");

    let retry = actions::register(&mut second, &api, &RegisterOptions::default()).await;
    assert!(retry.outcome.is_success());
    assert_eq!(server.state().user_count(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_leaky_api_is_flagged() {
    let server = MockServer::start_local(AccessMode::Leaky).await.unwrap();
    let api = api_for(&server);
    let mut session = SessionState::new(Identity::profile_client());

    actions::register(&mut session, &api, &RegisterOptions::default()).await;
    actions::login(&mut session, &api, "client_login").await;

    let other = actions::access_profile_by_id(&session, &api, 150).await;
    assert!(other.outcome.is_authorization_bypass());

    let list = actions::try_list_all_users(&mut session, &api).await;
    assert!(list.outcome.is_authorization_bypass());

    server.stop().await;
}

#[tokio::test]
async fn test_unauthenticated_profile_request_is_rejected() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api = api_for(&server);

    let resp = api
        .send(authload::client::ApiRequest::get("/api/utilisateur/me"))
        .await
        .unwrap();
    assert_eq!(resp.status, 401);

    server.stop().await;
}

fn quick_config(host: String, scenario: ScenarioKind) -> LoadTestConfig {
    LoadTestConfig {
        host,
        scenario,
        users: 5,
        spawn_rate: 0.0,
        run_time: Duration::from_secs(10),
        request_timeout: Duration::from_secs(5),
        register_pause: Duration::ZERO,
        wait_time: Some(WaitTime::between_millis(1, 5)),
        max_iterations: Some(20),
        seed: Some(2024),
        probe_root: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_profile_scenario_run_secure() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api: Arc<dyn HttpApi> = Arc::new(api_for(&server));

    let metrics = run_scenario(quick_config(server.base_url(), ScenarioKind::Profile), api)
        .await
        .unwrap();

    assert_eq!(metrics.scenario, "profile");
    assert_eq!(metrics.users_spawned, 5);
    assert_eq!(metrics.authorization_bypasses, 0);
    assert_eq!(metrics.failed_operations, 0, "{:?}", metrics.errors_by_type);

    let register = metrics.request("client_register").unwrap();
    assert_eq!(register.total, 5);
    let login = metrics.request("client_login").unwrap();
    assert_eq!(login.successes, 5);

    // on_start sends two requests, then 20 tasks per user; updates before
    // the first profile view are skipped without a request
    assert_eq!(
        metrics.total_operations + metrics.skipped_actions,
        5 * 2 + 5 * 20
    );
    assert!(metrics.request("01_client_view_my_profile").is_some());
    assert_eq!(server.state().user_count(), 5);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_profile_scenario_run_leaky_detects_bypass() {
    let server = MockServer::start_local(AccessMode::Leaky).await.unwrap();
    let api: Arc<dyn HttpApi> = Arc::new(api_for(&server));

    let metrics = run_scenario(quick_config(server.base_url(), ScenarioKind::Profile), api)
        .await
        .unwrap();

    // 100 weighted tasks with 1/6 probe share: a probe is all but certain
    assert!(metrics.authorization_bypasses > 0);
    assert_eq!(metrics.failed_operations, metrics.authorization_bypasses);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_auth_scenario_run() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api: Arc<dyn HttpApi> = Arc::new(api_for(&server));

    let metrics = run_scenario(quick_config(server.base_url(), ScenarioKind::Auth), api)
        .await
        .unwrap();

    assert_eq!(metrics.scenario, "auth");
    let register = metrics.request("register").unwrap();
    assert!(register.successes > 0);
    // Re-registering an account conflicts; that is the only failure allowed
    assert!(metrics
        .errors_by_type
        .keys()
        .all(|k| k == "register: email already in use, new email generated"));
    if let Some(login) = metrics.request("login") {
        assert_eq!(login.failures, 0);
    }

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_smoke_scenario_run() {
    let server = MockServer::start_local(AccessMode::Secure).await.unwrap();
    let api: Arc<dyn HttpApi> = Arc::new(api_for(&server));

    let mut config = quick_config(server.base_url(), ScenarioKind::Smoke);
    config.max_iterations = Some(4);

    let metrics = run_scenario(config, api).await.unwrap();

    assert_eq!(metrics.failed_operations, 0, "{:?}", metrics.errors_by_type);
    assert_eq!(metrics.request("register").unwrap().total, 20);
    assert_eq!(metrics.request("login").unwrap().successes, 20);
    assert_eq!(server.state().user_count(), 20);

    server.stop().await;
}
