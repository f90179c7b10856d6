use crate::app::Freshness;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

const LOG_FILE_NAME: &str = "switch.log";
const ROTATED_LOG_FILE_NAME: &str = "switch.log.1";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    Add,
    Import,
    Refresh,
    Reauth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Refreshed,
    InvalidGrant,
    Failed,
}

// Tokens only ever appear here as fingerprints.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SwitchEvent<'a> {
    ProfileSaved {
        profile: &'a str,
        #[serde(rename = "type")]
        kind: &'static str,
        reason: SaveReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        access_fp: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_fp: Option<String>,
    },
    ProfileRemoved {
        profile: &'a str,
    },
    RefreshStart {
        profile: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_fp: Option<String>,
        expires_at: u64,
    },
    RefreshResult {
        profile: &'a str,
        outcome: RefreshOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ReauthStart {
        profile: &'a str,
    },
    ReauthResult {
        profile: &'a str,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    KeychainWriteFailed {
        profile: &'a str,
        error: String,
    },
    SwitchApplied {
        profile: &'a str,
        #[serde(rename = "type")]
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        freshness: Option<Freshness>,
        #[serde(skip_serializing_if = "Option::is_none")]
        access_fp: Option<String>,
    },
    ExecPrepared {
        profile: &'a str,
        program: &'a str,
        env: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        token_fp: Option<String>,
    },
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a SwitchEvent<'a>,
}

pub struct EventLog {
    log_dir: PathBuf,
    max_bytes: u64,
}

impl EventLog {
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            max_bytes: MAX_LOG_BYTES,
        }
    }

    // Best-effort: a log that cannot be written never fails the caller.
    pub fn record(&self, event: &SwitchEvent<'_>) {
        let _ = self.append(event);
    }

    fn append(&self, event: &SwitchEvent<'_>) -> std::io::Result<()> {
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        let line = serde_json::to_string(&line)?;

        fs::create_dir_all(&self.log_dir)?;
        let path = self.log_dir.join(LOG_FILE_NAME);
        if fs::metadata(&path).is_ok_and(|metadata| metadata.len() > self.max_bytes) {
            fs::rename(&path, self.log_dir.join(ROTATED_LOG_FILE_NAME))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&path)?;
        writeln!(file, "{}", line)
    }
}

pub fn token_fingerprint(token: &str) -> Option<String> {
    let raw = token.trim();
    if raw.is_empty() {
        return None;
    }
    let digest = Sha256::digest(raw.as_bytes());
    Some(hex::encode(&digest[..8]))
}
