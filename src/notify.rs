//! Outbound SMS delivery
//!
//! The engine only needs the ability to send a text to a phone number; the
//! production implementation shells out to a send-sms CLI.

use crate::config::Config;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Capability to send a text message to a phone number
pub trait Notifier {
    fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Sends via the configured send-sms binary
pub struct SmsCliNotifier {
    send_sms: PathBuf,
    from_number: String,
}

impl SmsCliNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            send_sms: config.send_sms.clone(),
            from_number: config.from_number.clone(),
        }
    }
}

impl Notifier for SmsCliNotifier {
    fn send(&self, to: &str, body: &str) -> Result<()> {
        debug!(to = to, from = %self.from_number, "sending SMS");

        let output = Command::new(&self.send_sms)
            .arg("--from")
            .arg(&self.from_number)
            .arg(to)
            .arg(body)
            .output()
            .map_err(|e| Error::Notify(format!("send-sms: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Notify(format!(
                "send-sms to {} failed: {}",
                to,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

/// In-memory notifier for tests; records every send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(String, String)>>,
    failing: std::sync::Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to the given number fail
    pub fn fail_for(&self, to: &str) {
        self.failing.lock().unwrap().push(to.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, to: &str, body: &str) -> Result<()> {
        if self.failing.lock().unwrap().iter().any(|n| n == to) {
            return Err(Error::Notify(format!("simulated failure for {}", to)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
