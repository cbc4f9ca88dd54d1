use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// MQTT broker host.
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Broker credentials; empty username means anonymous.
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_keepalive_secs: u64,
    /// Topic the camera publishes frame payloads to.
    pub topic_frame: String,
    /// Topic results are published back to.
    pub topic_result: String,
    /// Path to the SQLite database file (identities + attendance log).
    pub db_path: PathBuf,
    /// Maximum Euclidean distance for a positive match (smaller = stricter).
    pub tolerance: f32,
    /// Seconds before the same identity may produce another event.
    pub cooldown_secs: u64,
    /// Expected encoding vector length.
    pub encoding_dim: usize,
    /// Seconds between scheduled identity reloads from the store.
    pub reload_interval_secs: u64,
    /// Bind address for the HTTP admin API.
    pub http_addr: String,
}

impl Config {
    /// Load configuration from `TALLY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("tally");

        let db_path = std::env::var("TALLY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            mqtt_host: env_string("TALLY_MQTT_HOST", "127.0.0.1"),
            mqtt_port: env_u64("TALLY_MQTT_PORT", 1883) as u16,
            mqtt_username: std::env::var("TALLY_MQTT_USERNAME").unwrap_or_default(),
            mqtt_password: std::env::var("TALLY_MQTT_PASSWORD").unwrap_or_default(),
            mqtt_keepalive_secs: env_u64("TALLY_MQTT_KEEPALIVE_SECS", 60),
            topic_frame: env_string("TALLY_TOPIC_FRAME", "attendance/camera/frame"),
            topic_result: env_string("TALLY_TOPIC_RESULT", "attendance/result"),
            db_path,
            tolerance: env_f32("TALLY_TOLERANCE", 0.5),
            cooldown_secs: env_u64("TALLY_COOLDOWN_SECS", 30),
            encoding_dim: env_usize("TALLY_ENCODING_DIM", 128),
            reload_interval_secs: env_u64("TALLY_RELOAD_INTERVAL_SECS", 300),
            http_addr: env_string("TALLY_HTTP_ADDR", "0.0.0.0:8000"),
        }
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
