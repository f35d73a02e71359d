// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

// Store configuration constants
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_CONNECT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

// Tokens live for three days
pub const TOKEN_LIFETIME_SECS: u64 = 3 * 24 * 3600;

/// Reserved administrator role, seeded at initialization and never deletable
pub const ADMIN_ROLE_ID: u64 = 1;
pub const ADMIN_ROLE_LABEL: &str = "admin";
pub const ADMIN_ROLE_PERMISSION: &str = "read,write,admin";

// Failed logins take at least this long
pub const MIN_LOGIN_DURATION_MS: u64 = 100;
