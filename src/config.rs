use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// JSON object, or path to a JSON file, with the app's project settings
pub const FIREBASE_CONFIG_ENV: &str = "FIREBASE_CONFIG";
pub const GOOGLE_CLOUD_PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";
pub const GCLOUD_PROJECT_ENV: &str = "GCLOUD_PROJECT";
pub use nova_firebase_auth::AUTH_EMULATOR_HOST_ENV;

/// Project-level settings shared by the auth and messaging clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    pub project_id: Option<String>,
    pub service_account_id: Option<String>,
    /// `host:port` of a local Auth emulator; enables unsigned tokens
    #[serde(skip)]
    pub auth_emulator_host: Option<String>,
}

impl FirebaseConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup, e.g. a map in tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut config = match non_empty(FIREBASE_CONFIG_ENV) {
            Some(value) if value.trim_start().starts_with('{') => {
                Self::from_json(&value).with_context(|| format!("{} is not valid JSON", FIREBASE_CONFIG_ENV))?
            }
            Some(path) => Self::from_file(path.trim())?,
            None => Self::default(),
        };

        if config.project_id.is_none() {
            config.project_id = non_empty(GOOGLE_CLOUD_PROJECT_ENV).or_else(|| non_empty(GCLOUD_PROJECT_ENV));
        }
        config.auth_emulator_host = non_empty(AUTH_EMULATOR_HOST_ENV);

        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json).context("failed to parse Firebase config")?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read Firebase config file {}", path.display()))?;
        Self::from_json(&contents).with_context(|| format!("invalid Firebase config file {}", path.display()))
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_auth_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.auth_emulator_host = Some(host.into());
        self
    }

    pub fn is_auth_emulated(&self) -> bool {
        self.auth_emulator_host.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_inline_json_config() {
        let config = FirebaseConfig::from_lookup(lookup(&[(
            FIREBASE_CONFIG_ENV,
            r#"{"projectId": "inline-project", "serviceAccountId": "sa@example.com"}"#,
        )]))
        .unwrap();

        assert_eq!(config.project_id.as_deref(), Some("inline-project"));
        assert_eq!(config.service_account_id.as_deref(), Some("sa@example.com"));
        assert!(!config.is_auth_emulated());
    }

    #[test]
    fn test_config_file_path() {
        let path = std::env::temp_dir().join(format!("firebase-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"projectId": "file-project"}"#).unwrap();

        let config =
            FirebaseConfig::from_lookup(lookup(&[(FIREBASE_CONFIG_ENV, path.to_str().unwrap())])).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.project_id.as_deref(), Some("file-project"));
        assert_eq!(config.service_account_id, None);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = FirebaseConfig::from_lookup(lookup(&[(FIREBASE_CONFIG_ENV, "/nonexistent/firebase.json")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_project_id_falls_back_to_cloud_env() {
        let config = FirebaseConfig::from_lookup(lookup(&[
            (GCLOUD_PROJECT_ENV, "gcloud-project"),
            (GOOGLE_CLOUD_PROJECT_ENV, "cloud-project"),
        ]))
        .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("cloud-project"));

        let config = FirebaseConfig::from_lookup(lookup(&[(GCLOUD_PROJECT_ENV, "gcloud-project")])).unwrap();
        assert_eq!(config.project_id.as_deref(), Some("gcloud-project"));

        let config = FirebaseConfig::from_lookup(lookup(&[
            (FIREBASE_CONFIG_ENV, r#"{"projectId": "explicit"}"#),
            (GOOGLE_CLOUD_PROJECT_ENV, "cloud-project"),
        ]))
        .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_emulator_host_enables_emulation() {
        let config = FirebaseConfig::from_lookup(lookup(&[
            (GOOGLE_CLOUD_PROJECT_ENV, "demo-project"),
            (AUTH_EMULATOR_HOST_ENV, "localhost:9099"),
        ]))
        .unwrap();

        assert!(config.is_auth_emulated());
        assert_eq!(config.auth_emulator_host.as_deref(), Some("localhost:9099"));
    }

    #[test]
    fn test_empty_environment() {
        assert_eq!(FirebaseConfig::from_lookup(lookup(&[])).unwrap(), FirebaseConfig::default());
    }
}
