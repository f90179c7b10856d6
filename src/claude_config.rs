use crate::error::{SwitchError, SwitchResult};
use crate::fs_util::{read_optional, resolve_write_target, write_file_atomic};
use crate::keychain::{CredentialStore, KeychainError};
use crate::profile::{OAuthAccount, OAuthCredentials};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

const OAUTH_KEY: &str = "claudeAiOauth";
const ACCOUNT_KEY: &str = "oauthAccount";
const PRIMARY_API_KEY: &str = "primaryApiKey";

pub struct ConfigPatcher {
    credentials_path: PathBuf,
    claude_json_path: PathBuf,
    credential_store: Box<dyn CredentialStore>,
}

impl ConfigPatcher {
    pub fn new(
        credentials_path: PathBuf,
        claude_json_path: PathBuf,
        credential_store: Box<dyn CredentialStore>,
    ) -> Self {
        Self {
            credentials_path,
            claude_json_path,
            credential_store,
        }
    }

    pub fn read_oauth_blob(&self) -> Option<Value> {
        if let Some(mut document) = peek_document(&self.credentials_path) {
            if let Some(blob) = document.remove(OAUTH_KEY) {
                return Some(blob);
            }
        }
        self.credential_store.read()
    }

    pub fn read_primary_api_key(&self) -> Option<String> {
        match peek_document(&self.claude_json_path)?.remove(PRIMARY_API_KEY)? {
            Value::String(key) if !key.trim().is_empty() => Some(key),
            _ => None,
        }
    }

    pub fn read_oauth_account_blob(&self) -> Option<Value> {
        peek_document(&self.claude_json_path)?
            .remove(ACCOUNT_KEY)
            .filter(|blob| !blob.is_null())
    }

    pub fn write_credentials(&self, credentials: &OAuthCredentials) -> SwitchResult<()> {
        let value = encode(credentials, "credentials")?;
        let mut document = load_for_update(&self.credentials_path)?.unwrap_or_default();
        document.insert(OAUTH_KEY.to_string(), value);
        write_document(&self.credentials_path, document)
    }

    pub fn write_keychain(&self, credentials: &OAuthCredentials) -> Result<(), KeychainError> {
        self.credential_store.write(credentials)
    }

    /// `None` drops any account left behind by the previous login.
    pub fn write_oauth_account(&self, account: Option<&OAuthAccount>) -> SwitchResult<()> {
        match account {
            Some(account) => {
                let value = encode(account, "account")?;
                let mut document = load_for_update(&self.claude_json_path)?.unwrap_or_default();
                document.insert(ACCOUNT_KEY.to_string(), value);
                write_document(&self.claude_json_path, document)
            }
            None => remove_keys(&self.claude_json_path, &[ACCOUNT_KEY]),
        }
    }

    pub fn clear_owned_keys(&self) -> SwitchResult<()> {
        remove_keys(&self.credentials_path, &[OAUTH_KEY])?;
        remove_keys(&self.claude_json_path, &[ACCOUNT_KEY, PRIMARY_API_KEY])
    }
}

fn encode<T: Serialize>(value: &T, what: &'static str) -> SwitchResult<Value> {
    serde_json::to_value(value).map_err(|source| SwitchError::Encode { what, source })
}

fn parse_object(data: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(data).ok()? {
        Value::Object(document) => Some(document),
        _ => None,
    }
}

fn peek_document(path: &Path) -> Option<Map<String, Value>> {
    parse_object(&read_optional(path).ok()??)
}

// Read errors propagate so a file we cannot see is never overwritten. Only a
// missing file (`None`) or unparseable content (empty map) is recoverable.
fn load_for_update(path: &Path) -> SwitchResult<Option<Map<String, Value>>> {
    Ok(read_optional(path)?.map(|data| parse_object(&data).unwrap_or_default()))
}

fn write_document(path: &Path, document: Map<String, Value>) -> SwitchResult<()> {
    let mut data =
        serde_json::to_vec_pretty(&Value::Object(document)).map_err(|source| SwitchError::Encode {
            what: "config document",
            source,
        })?;
    data.push(b'\n');
    write_file_atomic(&resolve_write_target(path)?, &data)
}

fn remove_keys(path: &Path, keys: &[&str]) -> SwitchResult<()> {
    let Some(mut document) = load_for_update(path)? else {
        return Ok(());
    };
    for key in keys {
        document.shift_remove(*key);
    }
    write_document(path, document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::NoopCredentialStore;
    use crate::profile::tests::sample_credentials;
    use serde_json::json;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct MemoryStore {
        blob: Option<Value>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    impl CredentialStore for MemoryStore {
        fn read(&self) -> Option<Value> {
            self.blob.clone()
        }

        fn write(&self, credentials: &OAuthCredentials) -> Result<(), KeychainError> {
            if let Ok(mut writes) = self.writes.lock() {
                writes.push(credentials.access_token.clone());
            }
            Ok(())
        }
    }

    fn patcher_with(temp: &TempDir, store: Box<dyn CredentialStore>) -> ConfigPatcher {
        ConfigPatcher::new(
            temp.path().join(".claude/.credentials.json"),
            temp.path().join(".claude.json"),
            store,
        )
    }

    fn patcher(temp: &TempDir) -> ConfigPatcher {
        patcher_with(temp, Box::new(NoopCredentialStore))
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_slice(&fs::read(path).expect("read")).expect("json")
    }

    fn seed(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, contents).expect("seed");
    }

    #[test]
    fn write_oauth_account_preserves_unrelated_keys() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude.json");
        seed(
            &path,
            r#"{"oauthAccount":{"emailAddress":"a@example.com"},"unrelated":{"deep":[1,2,{"x":null}]}}"#,
        );

        let account = OAuthAccount {
            email_address: Some("b@example.com".to_string()),
            ..OAuthAccount::default()
        };
        patcher(&temp)
            .write_oauth_account(Some(&account))
            .expect("write");

        assert_eq!(
            read_json(&path),
            json!({
                "oauthAccount": {"emailAddress": "b@example.com"},
                "unrelated": {"deep": [1, 2, {"x": null}]}
            })
        );
    }

    #[test]
    fn rewrite_keeps_original_key_order() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude/.credentials.json");
        seed(&path, r#"{"zeta":1,"claudeAiOauth":{},"alpha":2}"#);

        patcher(&temp)
            .write_credentials(&sample_credentials("at", "rt", 1))
            .expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        let zeta = raw.find("\"zeta\"").expect("zeta");
        let oauth = raw.find("\"claudeAiOauth\"").expect("oauth");
        let alpha = raw.find("\"alpha\"").expect("alpha");
        assert!(zeta < oauth && oauth < alpha, "order changed: {raw}");
    }

    #[test]
    fn write_credentials_creates_missing_and_heals_corrupt_documents() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude/.credentials.json");
        let patcher = patcher(&temp);

        patcher
            .write_credentials(&sample_credentials("at-1", "rt-1", 1))
            .expect("create");
        assert_eq!(read_json(&path)["claudeAiOauth"]["accessToken"], "at-1");

        seed(&path, "{broken");
        patcher
            .write_credentials(&sample_credentials("at-2", "rt-2", 2))
            .expect("heal");
        let document = read_json(&path);
        assert_eq!(document["claudeAiOauth"]["accessToken"], "at-2");
        assert_eq!(document.as_object().map(Map::len), Some(1));
    }

    #[test]
    fn primary_document_wins_over_credential_store() {
        let temp = TempDir::new().expect("temp dir");
        let store = MemoryStore {
            blob: Some(json!({"accessToken": "from-keychain"})),
            ..MemoryStore::default()
        };
        let patcher = patcher_with(&temp, Box::new(store));
        seed(
            &temp.path().join(".claude/.credentials.json"),
            r#"{"claudeAiOauth":{"accessToken":"from-file"}}"#,
        );

        let blob = patcher.read_oauth_blob().expect("blob");
        assert_eq!(blob["accessToken"], "from-file");
    }

    #[test]
    fn credential_store_is_fallback_for_absent_corrupt_or_keyless_document() {
        let temp = TempDir::new().expect("temp dir");
        let store = MemoryStore {
            blob: Some(json!({"accessToken": "from-keychain"})),
            ..MemoryStore::default()
        };
        let patcher = patcher_with(&temp, Box::new(store));
        let path = temp.path().join(".claude/.credentials.json");

        assert_eq!(
            patcher.read_oauth_blob().expect("absent")["accessToken"],
            "from-keychain"
        );

        seed(&path, "not json");
        assert_eq!(
            patcher.read_oauth_blob().expect("corrupt")["accessToken"],
            "from-keychain"
        );

        seed(&path, r#"{"other":true}"#);
        assert_eq!(
            patcher.read_oauth_blob().expect("keyless")["accessToken"],
            "from-keychain"
        );
    }

    #[test]
    fn nothing_anywhere_reads_as_absent() {
        let temp = TempDir::new().expect("temp dir");
        let patcher = patcher(&temp);
        assert!(patcher.read_oauth_blob().is_none());
        assert!(patcher.read_primary_api_key().is_none());
        assert!(patcher.read_oauth_account_blob().is_none());
    }

    #[test]
    fn primary_api_key_must_be_a_non_empty_string() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude.json");
        let patcher = patcher(&temp);

        seed(&path, r#"{"primaryApiKey":"sk-ant-1"}"#);
        assert_eq!(patcher.read_primary_api_key().as_deref(), Some("sk-ant-1"));

        seed(&path, r#"{"primaryApiKey":""}"#);
        assert!(patcher.read_primary_api_key().is_none());

        seed(&path, r#"{"primaryApiKey":42}"#);
        assert!(patcher.read_primary_api_key().is_none());
    }

    #[test]
    fn clear_owned_keys_leaves_everything_else() {
        let temp = TempDir::new().expect("temp dir");
        let credentials = temp.path().join(".claude/.credentials.json");
        let claude_json = temp.path().join(".claude.json");
        seed(&credentials, r#"{"claudeAiOauth":{"accessToken":"x"},"mcpOAuth":{"k":1}}"#);
        seed(
            &claude_json,
            r#"{"numStartups":12,"oauthAccount":{"emailAddress":"a"},"primaryApiKey":"sk","projects":{}}"#,
        );

        patcher(&temp).clear_owned_keys().expect("clear");

        assert_eq!(read_json(&credentials), json!({"mcpOAuth": {"k": 1}}));
        assert_eq!(
            read_json(&claude_json),
            json!({"numStartups": 12, "projects": {}})
        );
    }

    #[test]
    fn clear_owned_keys_tolerates_missing_documents() {
        let temp = TempDir::new().expect("temp dir");
        patcher(&temp).clear_owned_keys().expect("clear");
        assert!(!temp.path().join(".claude.json").exists());
        assert!(!temp.path().join(".claude/.credentials.json").exists());
    }

    #[test]
    fn keychain_write_passes_through_to_store() {
        let temp = TempDir::new().expect("temp dir");
        let store = MemoryStore::default();
        let writes = store.writes.clone();
        let patcher = patcher_with(&temp, Box::new(store));

        patcher
            .write_keychain(&sample_credentials("at-kc", "rt", 1))
            .expect("write");
        assert_eq!(*writes.lock().expect("writes"), vec!["at-kc".to_string()]);
    }

    #[test]
    fn write_without_account_drops_stale_account_only() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join(".claude.json");
        let patcher = patcher(&temp);

        patcher.write_oauth_account(None).expect("absent document");
        assert!(!path.exists());

        seed(&path, r#"{"oauthAccount":{"emailAddress":"old@example.com"},"theme":"dark"}"#);
        patcher.write_oauth_account(None).expect("drop");
        assert_eq!(read_json(&path), json!({"theme": "dark"}));
    }

    #[test]
    fn writes_land_in_symlink_target() {
        let temp = TempDir::new().expect("temp dir");
        let target = temp.path().join("dotfiles/claude.json");
        let link = temp.path().join(".claude.json");
        seed(&target, r#"{"theme":"dark"}"#);
        std::os::unix::fs::symlink(&target, &link).expect("symlink");

        let account = OAuthAccount {
            email_address: Some("b@example.com".to_string()),
            ..OAuthAccount::default()
        };
        patcher(&temp)
            .write_oauth_account(Some(&account))
            .expect("write");

        let metadata = fs::symlink_metadata(&link).expect("link metadata");
        assert!(metadata.file_type().is_symlink());
        assert_eq!(
            read_json(&target),
            json!({"theme": "dark", "oauthAccount": {"emailAddress": "b@example.com"}})
        );
    }

    #[test]
    fn unreadable_document_is_never_replaced() {
        let temp = TempDir::new().expect("temp dir");
        let claude_json = temp.path().join(".claude.json");
        let credentials = temp.path().join(".claude/.credentials.json");
        fs::create_dir_all(temp.path().join(".claude")).expect("mkdir");
        std::os::unix::fs::symlink(&claude_json, &claude_json).expect("loop");
        std::os::unix::fs::symlink(&credentials, &credentials).expect("loop");
        let patcher = patcher(&temp);

        let account = OAuthAccount::default();
        assert!(matches!(
            patcher.write_oauth_account(Some(&account)),
            Err(SwitchError::Io { .. })
        ));
        assert!(matches!(
            patcher.write_credentials(&sample_credentials("at", "rt", 1)),
            Err(SwitchError::Io { .. })
        ));
        assert!(matches!(
            patcher.clear_owned_keys(),
            Err(SwitchError::Io { .. })
        ));

        for path in [&claude_json, &credentials] {
            let metadata = fs::symlink_metadata(path).expect("metadata");
            assert!(metadata.file_type().is_symlink(), "{} was replaced", path.display());
        }
    }
}
