use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "facultyd.toml";
/// One week.
pub const MAX_RESET_TOKEN_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Json,
    Sqlite,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Json => "json",
            Backend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub ids: IdConfig,
    pub accounts: AccountsConfig,
    pub import: ImportConfig,
    pub reports: ReportsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: Backend,
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Json,
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdConfig {
    pub faculty_prefix: String,
    pub session_prefix: String,
    pub padding: usize,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            faculty_prefix: "FAC".to_string(),
            session_prefix: "SES".to_string(),
            padding: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountsConfig {
    pub default_admin_username: String,
    pub default_admin_password: String,
    pub default_admin_email: String,
    pub default_admin_full_name: String,
    pub min_password_length: usize,
    pub reset_token_minutes: i64,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            default_admin_username: "admin".to_string(),
            default_admin_password: "admin123".to_string(),
            default_admin_email: "admin@system.com".to_string(),
            default_admin_full_name: "System Administrator".to_string(),
            min_password_length: 6,
            reset_token_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub default_duration: f64,
    pub default_honorarium: f64,
    pub preview_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            default_duration: 2.0,
            default_honorarium: 0.0,
            preview_rows: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportsConfig {
    pub recent_sessions_limit: usize,
    pub currency_symbol: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            recent_sessions_limit: 10,
            currency_symbol: "₹".to_string(),
        }
    }
}

impl Config {
    /// Reads `facultyd.toml` from the workspace; a missing file yields defaults.
    pub fn load(workspace: &Path) -> anyhow::Result<Config> {
        let path = workspace.join(CONFIG_FILENAME);
        if !path.is_file() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
        let cfg = Self::parse(&text)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))?;
        Ok(cfg)
    }

    pub fn parse(text: &str) -> anyhow::Result<Config> {
        let cfg: Config = toml::from_str(text)?;
        if cfg.ids.padding == 0 || cfg.ids.padding > 12 {
            anyhow::bail!("ids.padding must be in 1..=12");
        }
        if cfg.ids.faculty_prefix.is_empty() || cfg.ids.session_prefix.is_empty() {
            anyhow::bail!("id prefixes must not be empty");
        }
        if cfg.ids.faculty_prefix == cfg.ids.session_prefix {
            anyhow::bail!("faculty and session prefixes must differ");
        }
        if !(1..=MAX_RESET_TOKEN_MINUTES).contains(&cfg.accounts.reset_token_minutes) {
            anyhow::bail!("accounts.reset_token_minutes must be in 1..={MAX_RESET_TOKEN_MINUTES}");
        }
        if cfg.storage.data_dir.trim().is_empty() {
            anyhow::bail!("storage.data_dir must not be empty");
        }
        Ok(cfg)
    }
}
