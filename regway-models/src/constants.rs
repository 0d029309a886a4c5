// Constants shared across the regway crates

/// The default configuration file name for the application.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "regway.toml";

/// Directory (relative to the runtime dir) that receives rolling log files.
pub const LOG_DIR: &str = "logs";

/// File name prefix for the daily rolling log.
pub const LOG_FILE_NAME: &str = "regway.log";

/// Tag key carrying the originating device name on every persisted point.
pub const DEVICE_TAG: &str = "device";

/// Trailing window applied to history queries without explicit bounds.
pub const DEFAULT_HISTORY_WINDOW_DAYS: i64 = 7;

/// Rendering format for history row timestamps (and accepted as a query bound).
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Device filter meaning "every device" in subscriptions and snapshots.
pub const ALL_DEVICES: &str = "*";
