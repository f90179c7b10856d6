use std::ffi::OsString;
use std::path::PathBuf;

pub const CLAUDE_TOKEN_ENDPOINT: &str = "https://platform.claude.com/v1/oauth/token";
const DEFAULT_SECURITY_BIN: &str = "/usr/bin/security";
const DEFAULT_CLAUDE_BIN: &str = "claude";

#[derive(Debug, Clone)]
pub struct Paths {
    pub profiles: PathBuf,
    pub state: PathBuf,
    pub log_dir: PathBuf,
    pub claude_credentials: PathBuf,
    pub claude_json: PathBuf,
}

impl Paths {
    pub fn new(home: PathBuf, config_root: PathBuf, claude_root: PathBuf) -> Self {
        let profiles = config_root.join("profiles");
        let state = config_root.join("state.json");
        let log_dir = config_root.join("logs");
        let claude_credentials = claude_root.join(".credentials.json");
        let claude_json = home.join(".claude.json");
        Self {
            profiles,
            state,
            log_dir,
            claude_credentials,
            claude_json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: Paths,
    pub token_endpoint: String,
    pub security_executable: String,
    pub claude_executable: String,
    pub keychain_account: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var_os(key);
        let home = resolve_home_with(var("HOME"));
        let config_root =
            resolve_config_root_with(&home, var("CLAUDE_SWITCH_HOME"), var("XDG_CONFIG_HOME"));
        let claude_root = resolve_claude_root_with(&home, var("CLAUDE_CONFIG_DIR"));

        Self {
            paths: Paths::new(home, config_root, claude_root),
            token_endpoint: string_or(var("CLAUDE_CODE_TOKEN_URL"), CLAUDE_TOKEN_ENDPOINT),
            security_executable: string_or(var("CLAUDE_SWITCH_SECURITY_BIN"), DEFAULT_SECURITY_BIN),
            claude_executable: string_or(var("CLAUDE_SWITCH_CLAUDE_BIN"), DEFAULT_CLAUDE_BIN),
            keychain_account: non_empty_string(var("USER")),
        }
    }

    #[cfg(test)]
    pub fn for_home(home: &std::path::Path) -> Self {
        let home = home.to_path_buf();
        let config_root = home.join(".config/claude-switch");
        let claude_root = home.join(".claude");
        Self {
            paths: Paths::new(home, config_root, claude_root),
            token_endpoint: CLAUDE_TOKEN_ENDPOINT.to_string(),
            security_executable: DEFAULT_SECURITY_BIN.to_string(),
            claude_executable: DEFAULT_CLAUDE_BIN.to_string(),
            keychain_account: Some("tester".to_string()),
        }
    }
}

fn resolve_home_with(home: Option<OsString>) -> PathBuf {
    non_empty_path(home).unwrap_or_else(|| PathBuf::from("."))
}

fn resolve_config_root_with(
    home: &std::path::Path,
    switch_home: Option<OsString>,
    xdg_config_home: Option<OsString>,
) -> PathBuf {
    if let Some(path) = non_empty_path(switch_home) {
        return path;
    }
    non_empty_path(xdg_config_home)
        .unwrap_or_else(|| home.join(".config"))
        .join("claude-switch")
}

fn resolve_claude_root_with(home: &std::path::Path, claude_config_dir: Option<OsString>) -> PathBuf {
    non_empty_path(claude_config_dir).unwrap_or_else(|| home.join(".claude"))
}

fn non_empty_path(value: Option<OsString>) -> Option<PathBuf> {
    value.filter(|raw| !raw.is_empty()).map(PathBuf::from)
}

fn non_empty_string(value: Option<OsString>) -> Option<String> {
    let raw = value?.into_string().ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn string_or(value: Option<OsString>, fallback: &str) -> String {
    non_empty_string(value).unwrap_or_else(|| fallback.to_string())
}
