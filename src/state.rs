use crate::error::{SwitchError, SwitchResult};
use crate::fs_util::write_file_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> State {
        fs::read(&self.path)
            .ok()
            .and_then(|data| serde_json::from_slice(&data).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, state: &State) -> SwitchResult<()> {
        let data = serde_json::to_vec_pretty(state).map_err(|source| SwitchError::Encode {
            what: "state",
            source,
        })?;
        write_file_atomic(&self.path, &data)
    }

    pub fn set_active(&self, name: &str) -> SwitchResult<()> {
        let mut state = self.load();
        state.active_profile = Some(name.to_string());
        self.save(&state)
    }
}
