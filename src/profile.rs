use crate::error::{SwitchError, SwitchResult};
use crate::fs_util::{read_optional, write_file_atomic};
use crate::state::StateStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: u64,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_tier: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_extra_usage_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Profile {
    #[serde(rename = "oauth")]
    OAuth {
        credentials: OAuthCredentials,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account: Option<Box<OAuthAccount>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    #[serde(rename = "api_key")]
    ApiKey {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl Profile {
    pub fn kind(&self) -> &'static str {
        match self {
            Profile::OAuth { .. } => "oauth",
            Profile::ApiKey { .. } => "api_key",
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Profile::OAuth { label, .. } | Profile::ApiKey { label, .. } => label.as_deref(),
        }
    }

    pub fn with_label(mut self, new_label: Option<String>) -> Self {
        match &mut self {
            Profile::OAuth { label, .. } | Profile::ApiKey { label, .. } => *label = new_label,
        }
        self
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Profile::OAuth { account, .. } => account.as_ref()?.email_address.as_deref(),
            Profile::ApiKey { .. } => None,
        }
    }

    pub fn organization(&self) -> Option<&str> {
        match self {
            Profile::OAuth { account, .. } => account.as_ref()?.organization_name.as_deref(),
            Profile::ApiKey { .. } => None,
        }
    }

    pub fn plan(&self) -> Option<&str> {
        match self {
            Profile::OAuth { credentials, .. } => credentials.subscription_type.as_deref(),
            Profile::ApiKey { .. } => None,
        }
    }

    pub fn expires_at(&self) -> Option<u64> {
        match self {
            Profile::OAuth { credentials, .. } => Some(credentials.expires_at),
            Profile::ApiKey { .. } => None,
        }
    }
}

pub fn validate_profile_name(name: &str) -> SwitchResult<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if !single_normal || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(SwitchError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub struct ProfileStore {
    dir: PathBuf,
    state: StateStore,
}

impl ProfileStore {
    pub fn new(dir: PathBuf, state: StateStore) -> Self {
        Self { dir, state }
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn save(&self, name: &str, profile: &Profile) -> SwitchResult<()> {
        validate_profile_name(name)?;
        let data = serde_json::to_vec_pretty(profile).map_err(|source| SwitchError::Encode {
            what: "profile",
            source,
        })?;
        write_file_atomic(&self.profile_path(name), &data)
    }

    pub fn load(&self, name: &str) -> SwitchResult<Profile> {
        validate_profile_name(name)?;
        let path = self.profile_path(name);
        let data = read_optional(&path)?.ok_or_else(|| SwitchError::NotFound(name.to_string()))?;
        serde_json::from_slice(&data).map_err(|source| SwitchError::Corrupt { path, source })
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_profile_name(name).is_ok() && self.profile_path(name).is_file()
    }

    pub fn list(&self) -> SwitchResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SwitchError::io("failed to read", &self.dir, err)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SwitchError::io("failed to read", &self.dir, err))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_profile_name(stem).is_ok() {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn remove(&self, name: &str) -> SwitchResult<()> {
        validate_profile_name(name)?;
        let path = self.profile_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SwitchError::NotFound(name.to_string()));
            }
            Err(err) => return Err(SwitchError::io("failed to remove", path, err)),
        }

        let mut state = self.state.load();
        if state.active_profile.as_deref() == Some(name) {
            state.active_profile = None;
            self.state.save(&state)?;
        }
        Ok(())
    }
}
