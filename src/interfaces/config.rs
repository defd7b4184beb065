use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Minimum spacing between consecutive sink edits per watcher.
    pub cooldown_seconds: Option<u64>,
    /// e.g. "sqlite:/data/state.db"; in-memory store when absent.
    pub database_url: Option<String>,
    pub listen_addr: Option<String>,
    pub api_token: Option<String>,
    /// Source bridge for reconciliation fetches; fake source when absent.
    pub source_base_url: Option<String>,
    pub source_token: Option<String>,
    pub telegram_bot_token: Option<String>,
    /// Owner scopes recovered on startup.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let raw = expand_env(&raw);
        let cfg: Config = serde_yaml::from_str(&raw)?;
        Ok(cfg)
    }

    pub fn cooldown(&self) -> std::time::Duration {
        self.cooldown_seconds
            .map(std::time::Duration::from_secs)
            .unwrap_or(crate::application::DEFAULT_COOLDOWN)
    }

    pub fn listen_addr(&self) -> String {
        self.listen_addr
            .clone()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
    }
}

/// very small ${VAR} expansion to keep config simple
fn expand_env(s: &str) -> String {
    let mut out = s.to_string();
    for (k, v) in std::env::vars() {
        out = out.replace(&format!("${{{}}}", k), &v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_env_placeholders() {
        std::env::set_var("STATUSBRIDGE_TEST_TOKEN", "sekrit");
        let out = expand_env("api_token: \"${STATUSBRIDGE_TEST_TOKEN}\"");
        assert_eq!(out, "api_token: \"sekrit\"");
    }

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.cooldown(), crate::application::DEFAULT_COOLDOWN);
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert!(cfg.scopes.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join("statusbridge-config-malformed.yaml");
        std::fs::write(&path, "scopes: [unclosed").unwrap();
        assert!(Config::load_from_file(path.to_str().unwrap()).is_err());
        assert!(Config::load_from_file("/definitely/not/there.yaml").is_err());
    }
}
