//! Canonical default values shared by the scanner, gateway, and launcher.

/// Well-known identifier of the protocol's Root folder, the default top of the tree.
pub const ROOT_NODE_ID: &str = "i=84";
pub const DEFAULT_API_URL: &str = "http://api/";
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_AVAILABILITY_RETRY_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENT_SERVERS: usize = 1;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
pub const DEFAULT_TRACES_SAMPLE_RATE: f64 = 1.0;
/// Path stored for a node whose path computation was cancelled.
pub const CANCELLED_PATH: &str = "CancelledError";
