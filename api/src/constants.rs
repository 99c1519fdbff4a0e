//! Application constants

/// Graph API version used for Instagram and Facebook calls
pub const GRAPH_API_VERSION: &str = "v19.0";

pub const DEFAULT_GRAPH_API_BASE: &str = "https://graph.facebook.com";
pub const DEFAULT_TIKTOK_API_BASE: &str = "https://open.tiktokapis.com";
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com";

/// Maximum due posts claimed by one sweep invocation
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 20;

/// Apalis cron expression (with seconds): top of every minute
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 * * * * *";

/// Upper bound for one adapter call, including Instagram readiness polling
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 180;

pub const DEFAULT_INSTAGRAM_POLL_INITIAL_MS: u64 = 2_000;
pub const DEFAULT_INSTAGRAM_POLL_MAX_MS: u64 = 15_000;
pub const DEFAULT_INSTAGRAM_POLL_TIMEOUT_SECS: u64 = 120;

/// TikTok accepts a single upload chunk up to 64 MiB
pub const DEFAULT_TIKTOK_MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// TikTok rejects titles longer than this
pub const TIKTOK_TITLE_MAX_CHARS: usize = 2_200;

/// Header the upstream session layer uses to forward the authenticated user
pub const USER_ID_HEADER: &str = "x-user-id";

/// Default page size for paginated list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Maximum page size for paginated list endpoints
pub const MAX_PAGE_SIZE: i64 = 100;
