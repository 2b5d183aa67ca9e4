// Centralized constants for authload to avoid magic numbers and literal paths

/// Registration endpoint
pub const REGISTER_PATH: &str = "/api/auth/register";

/// Login endpoint, returns `{"token": ...}` on success
pub const LOGIN_PATH: &str = "/api/auth/login";

/// Profile of the authenticated user
pub const MY_PROFILE_PATH: &str = "/api/utilisateur/me";

/// Prefix for single-profile reads (`/api/utilisateur/{id}`)
pub const PROFILE_PATH_PREFIX: &str = "/api/utilisateur";

/// Prefix for profile updates (`/api/utilisateurs/{id}`)
pub const USERS_PATH_PREFIX: &str = "/api/utilisateurs";

/// Full user listing, forbidden for a CLIENT
pub const USER_LIST_PATH: &str = "/api/utilisateurs/";

/// Password shared by every virtual user
pub const DEFAULT_PASSWORD: &str = "Motdepasse@123";

/// Role sent on registration
pub const CLIENT_ROLE: &str = "CLIENT";

pub const EMAIL_DOMAIN: &str = "example.com";

/// Number of hex characters taken from a v4 UUID for email uniqueness
pub const EMAIL_ENTROPY_CHARS: usize = 8;

/// First names drawn for profile updates
pub const FIRST_NAME_POOL: [&str; 5] = ["Marie", "Sophie", "Julie", "Alice", "Celine"];

/// Last names drawn for profile updates
pub const LAST_NAME_POOL: [&str; 5] = ["Martin", "Dubois", "Leroy", "Garcia", "Navarro"];

/// Lower bound (inclusive) of ids probed as "someone else's profile"
pub const OTHER_PROFILE_ID_MIN: u64 = 100;

/// Upper bound (exclusive) of ids probed as "someone else's profile"
pub const OTHER_PROFILE_ID_MAX: u64 = 200;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Pause after a successful registration so the next login sees the new row
pub const DEFAULT_REGISTER_PAUSE_MS: u64 = 500;

/// Default number of concurrent virtual users
pub const DEFAULT_USERS: usize = 10;

/// Default number of users started per second
pub const DEFAULT_SPAWN_RATE: f64 = 1.0;

/// Default run duration in seconds
pub const DEFAULT_RUN_TIME_SECS: u64 = 60;

/// Longest accepted run duration (one week)
pub const MAX_RUN_TIME_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted per-request timeout
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Longest accepted think time or registration pause
pub const MAX_WAIT_SECS: u64 = 3600;

/// Slowest accepted non-zero spawn rate: one user every 1000 seconds
pub const MIN_SPAWN_RATE: f64 = 0.001;

/// Deadline used when a run time cannot be added to the clock
pub const FAR_FUTURE_SECS: u64 = 86400 * 365 * 30;

/// Grace period granted to in-flight users once the run deadline passes
pub const SHUTDOWN_GRACE_SECS: u64 = 15;

/// Default target host for local runs against `authload mock-server`
pub const DEFAULT_HOST: &str = "http://127.0.0.1:8089";

/// Default port of the mock target API
pub const DEFAULT_MOCK_PORT: u16 = 8089;
