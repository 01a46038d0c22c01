//! System-wide constants for the Tapeline matching engine.

/// Default circuit-breaker deviation threshold, in percent.
pub const DEFAULT_BREAKER_THRESHOLD_PCT: i64 = 10;

/// Default circuit-breaker rolling window in milliseconds.
pub const DEFAULT_BREAKER_WINDOW_MS: u64 = 60_000;

/// Default circuit-breaker cool-down in milliseconds.
pub const DEFAULT_BREAKER_COOLDOWN_MS: u64 = 30_000;

/// Upper bound on prints kept in the breaker window.
pub const MAX_BREAKER_WINDOW_PRINTS: usize = 10_000;

/// Default price collar around the reference price, in percent.
pub const DEFAULT_PRICE_COLLAR_PCT: i64 = 20;

/// Maximum open orders per account (default).
pub const DEFAULT_MAX_OPEN_ORDERS: usize = 200;

/// Maximum absolute position per account and symbol, in lots (default).
pub const DEFAULT_MAX_POSITION_LOTS: u64 = 1_000_000;

/// Rate limit window for order submission (milliseconds).
pub const ORDER_RATE_LIMIT_WINDOW_MS: u64 = 1000;

/// Maximum orders per account within the rate limit window.
pub const ORDER_RATE_LIMIT_COUNT: usize = 50;

/// Number of terminal order ids remembered for `AlreadyTerminal` answers.
pub const TERMINAL_CACHE_SIZE: usize = 100_000;

/// Default depth of each symbol actor's command queue.
pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 1024;

/// Default audit writer backlog (in intents) before intake answers `Busy`.
pub const DEFAULT_AUDIT_WATERMARK: usize = 256;

/// Default per-subscriber market-data buffer.
pub const DEFAULT_MARKET_DATA_CAPACITY: usize = 4096;

/// Default number of levels in a depth snapshot.
pub const DEFAULT_SNAPSHOT_DEPTH: usize = 20;

/// Domain tag mixed into every audit record hash.
pub const AUDIT_CHAIN_TAG: &[u8] = b"tapeline:audit:v1:";

/// Domain tag for book digests.
pub const BOOK_DIGEST_TAG: &[u8] = b"tapeline:book:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Tapeline";
