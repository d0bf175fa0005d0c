// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5002;
pub const WS_PATH: &str = "ws";

// Hot-path budgets
pub const DEFAULT_RATE_LIMIT_MAX_MESSAGES: u64 = 10_000;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

// Key and channel naming in the shared distributed store
pub const SESSION_KEY_PREFIX: &str = "session:";
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";
pub const ROOM_CHANNEL_PREFIX: &str = "room:";
