use crate::claude_config::ConfigPatcher;
use crate::error::{RefreshError, SwitchError, SwitchResult};
use crate::event_log::{token_fingerprint, EventLog, RefreshOutcome, SaveReason, SwitchEvent};
use crate::keychain::{platform_credential_store, CredentialStore};
use crate::oauth::{is_expired, now_ms, TokenRefresher};
use crate::paths::Settings;
use crate::process::{interactive_process_runner, ProcessRunner};
use crate::profile::{validate_profile_name, OAuthAccount, OAuthCredentials, Profile, ProfileStore};
use crate::state::StateStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::os::unix::process::CommandExt;
use std::process::Command as ProcessCommand;
use std::sync::Arc;

pub const OAUTH_TOKEN_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const NO_PROFILES_HINT: &str =
    "No profiles. Use 'claude-switch add <name>' or 'claude-switch import <name>' to create one.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Refreshed,
    Reauthenticated,
}

#[derive(Debug)]
struct FreshCredentials {
    credentials: OAuthCredentials,
    account: Option<Box<OAuthAccount>>,
    freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub program: String,
    pub args: Vec<String>,
    pub env_key: &'static str,
    pub env_value: String,
}

pub struct SwitchApp {
    profiles: ProfileStore,
    state: StateStore,
    patcher: ConfigPatcher,
    refresher: TokenRefresher,
    event_log: EventLog,
    claude_executable: String,
    login_runner: ProcessRunner,
}

impl SwitchApp {
    pub fn new(settings: Settings) -> Self {
        let credential_store = platform_credential_store(&settings);
        let refresher = TokenRefresher::new(&settings);
        Self::with_clients(
            settings,
            credential_store,
            refresher,
            Arc::new(interactive_process_runner),
        )
    }

    pub fn with_clients(
        settings: Settings,
        credential_store: Box<dyn CredentialStore>,
        refresher: TokenRefresher,
        login_runner: ProcessRunner,
    ) -> Self {
        let paths = settings.paths;
        let state = StateStore::new(paths.state);
        let profiles = ProfileStore::new(paths.profiles, state.clone());
        let patcher = ConfigPatcher::new(
            paths.claude_credentials,
            paths.claude_json,
            credential_store,
        );

        Self {
            profiles,
            state,
            patcher,
            refresher,
            event_log: EventLog::new(paths.log_dir),
            claude_executable: settings.claude_executable,
            login_runner,
        }
    }

    pub fn print_usage(&self) {
        println!(
            "claude-switch - manage multiple Claude Code accounts\n\n\
             Usage:\n\
               claude-switch add <name> [--label <text>]     Log in fresh and save as a profile\n\
               claude-switch import <name> [--label <text>]  Save the current session as a profile\n\
               claude-switch use <name>                      Make a profile Claude Code's active login\n\
               claude-switch list                            List profiles\n\
               claude-switch remove <name>                   Delete a profile\n\
               claude-switch exec <name> [--] <command...>   Run a command with a profile's credentials\n\
               claude-switch help                            Show this help"
        );
    }

    pub fn add_profile(&self, name: &str, label: Option<String>) -> SwitchResult<()> {
        self.ensure_new_profile(name)?;

        self.patcher.clear_owned_keys()?;
        self.run_login()?;
        let profile = self
            .import_current_credentials()
            .map_err(|err| match err {
                SwitchError::NoCredentials(_) => SwitchError::NoCredentials(
                    "no credentials found after login; did authentication complete?".to_string(),
                ),
                other => other,
            })?
            .with_label(label);

        self.save_profile(name, &profile, SaveReason::Add)?;
        self.state.set_active(name)?;
        eprintln!("Saved profile '{}' ({})", name, describe_profile(&profile));
        Ok(())
    }

    pub fn import_profile(&self, name: &str, label: Option<String>) -> SwitchResult<()> {
        self.ensure_new_profile(name)?;

        let profile = self.import_current_credentials()?.with_label(label);
        self.save_profile(name, &profile, SaveReason::Import)?;
        self.state.set_active(name)?;

        match &profile {
            Profile::OAuth { .. } => eprintln!(
                "Imported current session as '{}' ({}, {})",
                name,
                display_email(&profile),
                profile.plan().unwrap_or("-")
            ),
            Profile::ApiKey { .. } => {
                eprintln!("Imported current session as '{}' (API key)", name)
            }
        }
        Ok(())
    }

    pub fn use_profile(&self, name: &str) -> SwitchResult<Freshness> {
        match self.profiles.load(name)? {
            Profile::OAuth {
                credentials,
                account,
                label,
            } => {
                let fresh = self.resolve_fresh(name, credentials, account, label)?;
                self.apply_oauth(name, &fresh.credentials, fresh.account.as_deref())?;
                self.event_log.record(&SwitchEvent::SwitchApplied {
                    profile: name,
                    kind: "oauth",
                    freshness: Some(fresh.freshness),
                    access_fp: token_fingerprint(&fresh.credentials.access_token),
                });
                match fresh.freshness {
                    Freshness::Reauthenticated => {
                        eprintln!("Switched to '{}' (re-authenticated)", name)
                    }
                    _ => eprintln!("Switched to '{}'", name),
                }
                Ok(fresh.freshness)
            }
            Profile::ApiKey { api_key, .. } => {
                self.state.set_active(name)?;
                self.event_log.record(&SwitchEvent::SwitchApplied {
                    profile: name,
                    kind: "api_key",
                    freshness: None,
                    access_fp: None,
                });
                eprintln!("API key profiles can't be written to Claude's config files.");
                eprintln!("Use one of these instead:");
                eprintln!();
                eprintln!("  export {}={}", API_KEY_ENV, api_key);
                eprintln!("  claude-switch exec {} -- claude", name);
                Ok(Freshness::Fresh)
            }
        }
    }

    pub fn list_profiles(&self) -> SwitchResult<()> {
        let lines = self.profile_list_lines()?;
        if lines.is_empty() {
            eprintln!("{}", NO_PROFILES_HINT);
            return Ok(());
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }

    pub fn profile_list_lines(&self) -> SwitchResult<Vec<String>> {
        let names = self.profiles.list()?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let active = self.state.load().active_profile;

        let mut rows = vec![["", "NAME", "TYPE", "EMAIL", "ORG", "PLAN", "EXPIRES"].map(String::from)];
        for name in names {
            let marker = if active.as_deref() == Some(name.as_str()) {
                "*"
            } else {
                ""
            };
            let row = match self.profiles.load(&name) {
                Ok(profile) => [
                    marker.to_string(),
                    name,
                    profile.kind().to_string(),
                    display_email(&profile).to_string(),
                    profile.organization().unwrap_or("-").to_string(),
                    profile.plan().unwrap_or("-").to_string(),
                    profile
                        .expires_at()
                        .map(format_expiry)
                        .unwrap_or_else(|| "-".to_string()),
                ],
                Err(_) => [
                    marker.to_string(),
                    name,
                    "error".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ],
            };
            rows.push(row);
        }

        Ok(render_columns(&rows))
    }

    pub fn remove_profile(&self, name: &str) -> SwitchResult<()> {
        self.profiles.remove(name)?;
        self.event_log
            .record(&SwitchEvent::ProfileRemoved { profile: name });
        eprintln!("Removed profile '{}'", name);
        Ok(())
    }

    // Refreshes persist to the profile only; Claude Code's files are left alone.
    pub fn exec_plan(&self, name: &str, command: &[String]) -> SwitchResult<ExecPlan> {
        let Some((program, args)) = command.split_first() else {
            return Err(SwitchError::Usage(
                "usage: claude-switch exec <name> [--] <command...>".to_string(),
            ));
        };

        let (env_key, env_value) = match self.profiles.load(name)? {
            Profile::OAuth {
                credentials,
                account,
                label,
            } => {
                let fresh = self.resolve_fresh(name, credentials, account, label)?;
                (OAUTH_TOKEN_ENV, fresh.credentials.access_token)
            }
            Profile::ApiKey { api_key, .. } => (API_KEY_ENV, api_key),
        };

        self.event_log.record(&SwitchEvent::ExecPrepared {
            profile: name,
            program,
            env: env_key,
            token_fp: token_fingerprint(&env_value),
        });
        Ok(ExecPlan {
            program: program.clone(),
            args: args.to_vec(),
            env_key,
            env_value,
        })
    }

    pub fn exec_profile(&self, name: &str, command: &[String]) -> SwitchResult<()> {
        let plan = self.exec_plan(name, command)?;
        let source = ProcessCommand::new(&plan.program)
            .args(&plan.args)
            .env(plan.env_key, &plan.env_value)
            .exec();
        Err(SwitchError::Exec {
            program: plan.program,
            source,
        })
    }

    fn ensure_new_profile(&self, name: &str) -> SwitchResult<()> {
        validate_profile_name(name)?;
        if self.profiles.exists(name) {
            return Err(SwitchError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn save_profile(&self, name: &str, profile: &Profile, reason: SaveReason) -> SwitchResult<()> {
        self.profiles.save(name, profile)?;
        let (access_fp, refresh_fp) = match profile {
            Profile::OAuth { credentials, .. } => (
                token_fingerprint(&credentials.access_token),
                token_fingerprint(&credentials.refresh_token),
            ),
            Profile::ApiKey { api_key, .. } => (token_fingerprint(api_key), None),
        };
        self.event_log.record(&SwitchEvent::ProfileSaved {
            profile: name,
            kind: profile.kind(),
            reason,
            access_fp,
            refresh_fp,
        });
        Ok(())
    }

    // OAuth wins over a legacy `primaryApiKey`.
    fn import_current_credentials(&self) -> SwitchResult<Profile> {
        let api_key = self.patcher.read_primary_api_key();

        if let Some(blob) = self.patcher.read_oauth_blob() {
            let credentials: OAuthCredentials = serde_json::from_value(blob).map_err(|err| {
                SwitchError::NoCredentials(format!("failed to parse OAuth credentials: {}", err))
            })?;
            let account = self
                .patcher
                .read_oauth_account_blob()
                .and_then(|blob| serde_json::from_value::<OAuthAccount>(blob).ok())
                .map(Box::new);
            return Ok(Profile::OAuth {
                credentials,
                account,
                label: None,
            });
        }

        match api_key {
            Some(api_key) => Ok(Profile::ApiKey {
                api_key,
                label: None,
            }),
            None => Err(SwitchError::NoCredentials(
                "no credentials found; is Claude Code logged in?".to_string(),
            )),
        }
    }

    fn resolve_fresh(
        &self,
        name: &str,
        credentials: OAuthCredentials,
        account: Option<Box<OAuthAccount>>,
        label: Option<String>,
    ) -> SwitchResult<FreshCredentials> {
        if !is_expired(&credentials, now_ms()) {
            return Ok(FreshCredentials {
                credentials,
                account,
                freshness: Freshness::Fresh,
            });
        }

        eprintln!("Token for '{}' expired, refreshing...", name);
        self.event_log.record(&SwitchEvent::RefreshStart {
            profile: name,
            refresh_fp: token_fingerprint(&credentials.refresh_token),
            expires_at: credentials.expires_at,
        });

        match self.refresher.refresh(&credentials) {
            Ok(refreshed) => {
                self.log_refresh_result(name, RefreshOutcome::Refreshed, None);
                let profile = Profile::OAuth {
                    credentials: refreshed.clone(),
                    account: account.clone(),
                    label,
                };
                self.save_profile(name, &profile, SaveReason::Refresh)?;
                Ok(FreshCredentials {
                    credentials: refreshed,
                    account,
                    freshness: Freshness::Refreshed,
                })
            }
            Err(RefreshError::InvalidGrant) => {
                self.log_refresh_result(name, RefreshOutcome::InvalidGrant, None);
                let (credentials, account) = self.reauthenticate(name, label)?;
                Ok(FreshCredentials {
                    credentials,
                    account,
                    freshness: Freshness::Reauthenticated,
                })
            }
            Err(err) => {
                self.log_refresh_result(name, RefreshOutcome::Failed, Some(err.to_string()));
                Err(err.into())
            }
        }
    }

    fn log_refresh_result(&self, name: &str, outcome: RefreshOutcome, error: Option<String>) {
        self.event_log.record(&SwitchEvent::RefreshResult {
            profile: name,
            outcome,
            error,
        });
    }

    fn reauthenticate(
        &self,
        name: &str,
        label: Option<String>,
    ) -> SwitchResult<(OAuthCredentials, Option<Box<OAuthAccount>>)> {
        eprintln!(
            "Refresh token for profile '{}' is no longer valid. Please log in again...",
            name
        );
        self.event_log
            .record(&SwitchEvent::ReauthStart { profile: name });

        let outcome = self.reauthenticate_inner(name, label);
        self.event_log.record(&SwitchEvent::ReauthResult {
            profile: name,
            ok: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
        });
        outcome
    }

    fn reauthenticate_inner(
        &self,
        name: &str,
        label: Option<String>,
    ) -> SwitchResult<(OAuthCredentials, Option<Box<OAuthAccount>>)> {
        self.patcher.clear_owned_keys()?;
        self.run_login()?;

        let imported = self.import_current_credentials().map_err(|err| match err {
            SwitchError::NoCredentials(_) => SwitchError::NoCredentials(
                "no credentials found after login; did authentication complete?".to_string(),
            ),
            other => other,
        })?;
        let Profile::OAuth {
            credentials,
            account,
            ..
        } = imported
        else {
            return Err(SwitchError::NoCredentials(
                "re-authentication produced an API key instead of OAuth credentials".to_string(),
            ));
        };

        let profile = Profile::OAuth {
            credentials: credentials.clone(),
            account: account.clone(),
            label,
        };
        self.save_profile(name, &profile, SaveReason::Reauth)?;
        eprintln!("Re-authenticated profile '{}' ({})", name, describe_profile(&profile));
        Ok((credentials, account))
    }

    fn run_login(&self) -> SwitchResult<()> {
        let result = (self.login_runner)(&self.claude_executable, &["/login".to_string()]);
        if result.success() {
            return Ok(());
        }
        let status = match result.stderr.trim() {
            "" => format!("status {}", result.status),
            reason => format!("error ({})", reason),
        };
        Err(SwitchError::LoginFailed {
            program: self.claude_executable.clone(),
            status,
        })
    }

    fn apply_oauth(
        &self,
        name: &str,
        credentials: &OAuthCredentials,
        account: Option<&OAuthAccount>,
    ) -> SwitchResult<()> {
        self.patcher.write_credentials(credentials)?;
        if let Err(err) = self.patcher.write_keychain(credentials) {
            self.event_log.record(&SwitchEvent::KeychainWriteFailed {
                profile: name,
                error: err.to_string(),
            });
            eprintln!("warning: {}", err);
        }
        self.patcher.write_oauth_account(account)?;
        self.state.set_active(name)
    }
}

fn display_email(profile: &Profile) -> &str {
    match profile {
        Profile::OAuth { .. } => profile.email().unwrap_or("(unknown)"),
        Profile::ApiKey { .. } => "-",
    }
}

fn describe_profile(profile: &Profile) -> String {
    let base = match profile {
        Profile::OAuth { .. } => display_email(profile),
        Profile::ApiKey { .. } => "API key",
    };
    match profile.label() {
        Some(label) => format!("{}, \"{}\"", base, label),
        None => base.to_string(),
    }
}

fn format_expiry(expires_at: u64) -> String {
    i64::try_from(expires_at)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|time| time.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn render_columns(rows: &[[String; 7]]) -> Vec<String> {
    let mut widths = [0usize; 7];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            let mut line = String::new();
            for (index, cell) in row.iter().enumerate() {
                if index + 1 == row.len() {
                    line.push_str(cell);
                } else {
                    line.push_str(&format!("{:<width$}  ", cell, width = widths[index]));
                }
            }
            line.trim_end().to_string()
        })
        .collect()
}
