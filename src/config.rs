//! Configuration and paths

use std::path::PathBuf;

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub db_file: PathBuf,
    pub cursor_file: PathBuf,
    pub send_sms: PathBuf,
    /// Number the service sends from. Passed explicitly to the notifier,
    /// never read from process-wide state.
    pub from_number: String,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        let data_dir = home.join(".local/share/tipline");

        Self {
            db_file: data_dir.join("tipline.db"),
            cursor_file: data_dir.join("state/last_inbound_id.txt"),
            send_sms: home.join("code/sms-cli/send-sms"),
            from_number: DEFAULT_FROM_NUMBER.to_string(),
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            db_file: temp_dir.join("tipline.db"),
            cursor_file: temp_dir.join("state/last_inbound_id.txt"),
            send_sms: temp_dir.join("send-sms"),
            from_number: "+447700900000".to_string(),
            poll_interval_ms: 100,
        }
    }
}

/// Fallback outbound number; real deployments override this
pub const DEFAULT_FROM_NUMBER: &str = "+447700900000";

/// Bet type labels as stored and rendered
pub const BET_TYPE_WIN: &str = "win";
pub const BET_TYPE_EACH_WAY: &str = "e/w";
