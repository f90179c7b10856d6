use crate::paths::Settings;
#[cfg(target_os = "macos")]
use crate::process::default_process_runner;
use crate::process::ProcessRunner;
use crate::profile::OAuthCredentials;
use serde_json::Value;
use thiserror::Error;

pub const CLAUDE_KEYCHAIN_SERVICE_NAME: &str = "Claude Code-credentials";

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("failed to encode credentials for keychain: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to update keychain (exit {status}): {stderr}")]
    Command { status: i32, stderr: String },
}

pub trait CredentialStore {
    /// The stored `claudeAiOauth` blob, or `None` on any failure.
    fn read(&self) -> Option<Value>;

    fn write(&self, credentials: &OAuthCredentials) -> Result<(), KeychainError>;
}

#[cfg_attr(target_os = "macos", allow(dead_code))]
pub struct NoopCredentialStore;

impl CredentialStore for NoopCredentialStore {
    fn read(&self) -> Option<Value> {
        None
    }

    fn write(&self, _credentials: &OAuthCredentials) -> Result<(), KeychainError> {
        Ok(())
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub struct SecurityKeychain {
    security_executable: String,
    service_name: String,
    account: Option<String>,
    process_runner: ProcessRunner,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl SecurityKeychain {
    pub fn new(settings: &Settings, process_runner: ProcessRunner) -> Self {
        Self {
            security_executable: settings.security_executable.clone(),
            service_name: CLAUDE_KEYCHAIN_SERVICE_NAME.to_string(),
            account: settings.keychain_account.clone(),
            process_runner,
        }
    }
}

impl CredentialStore for SecurityKeychain {
    fn read(&self) -> Option<Value> {
        let account = self.account.as_ref()?;
        let args = vec![
            "find-generic-password".to_string(),
            "-s".to_string(),
            self.service_name.clone(),
            "-a".to_string(),
            account.clone(),
            "-w".to_string(),
        ];
        let result = (self.process_runner)(&self.security_executable, &args);
        if !result.success() {
            return None;
        }
        let mut document = serde_json::from_str::<Value>(result.stdout.trim()).ok()?;
        document
            .as_object_mut()?
            .remove("claudeAiOauth")
            .filter(Value::is_object)
    }

    fn write(&self, credentials: &OAuthCredentials) -> Result<(), KeychainError> {
        let Some(account) = self.account.as_ref() else {
            return Ok(());
        };
        let document = serde_json::json!({ "claudeAiOauth": credentials });
        let raw = serde_json::to_string(&document)?;

        let args = vec![
            "add-generic-password".to_string(),
            "-U".to_string(),
            "-s".to_string(),
            self.service_name.clone(),
            "-a".to_string(),
            account.clone(),
            "-w".to_string(),
            raw,
        ];
        let result = (self.process_runner)(&self.security_executable, &args);
        if !result.success() {
            return Err(KeychainError::Command {
                status: result.status,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
pub fn platform_credential_store(settings: &Settings) -> Box<dyn CredentialStore> {
    Box::new(SecurityKeychain::new(
        settings,
        std::sync::Arc::new(default_process_runner),
    ))
}

#[cfg(not(target_os = "macos"))]
pub fn platform_credential_store(_settings: &Settings) -> Box<dyn CredentialStore> {
    Box::new(NoopCredentialStore)
}
