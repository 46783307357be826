use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::SyncArgs;

pub const DEFAULT_CONFIG_FILE_NAME: &str = ".calilist.yaml";
pub const DEFAULT_ANILIST_URL: &str = "https://graphql.anilist.co";
pub const TOKEN_ENV: &str = "CALILIST_TOKEN";

/// On-disk configuration, every key optional. Unknown keys are ignored so the
/// file can be shared with older/newer versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anilist_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapters_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Settings for one sync run, resolved once at startup.
#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub app_db: PathBuf,
    pub metadata_db: PathBuf,
    pub anilist_url: Url,
    pub identifier_type: String,
    pub chapters_column: String,
    pub window_days: u32,
    pub pace: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &"<redacted>")
            .field("app_db", &self.app_db)
            .field("metadata_db", &self.metadata_db)
            .field("anilist_url", &self.anilist_url.as_str())
            .field("identifier_type", &self.identifier_type)
            .field("chapters_column", &self.chapters_column)
            .field("window_days", &self.window_days)
            .field("pace", &self.pace)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(DEFAULT_CONFIG_FILE_NAME))
}

/// Resolves the config path: the explicit one when given, else the default
/// under the home directory.
pub fn config_path(explicit: Option<&str>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(PathBuf::from(path)),
        None => default_config_path(),
    }
}

/// Loads the config file. A missing file is only an error when the path was
/// given explicitly.
pub fn load(explicit: Option<&str>) -> anyhow::Result<ConfigFile> {
    let path = config_path(explicit)?;
    match std::fs::read_to_string(&path) {
        Ok(raw) => {
            tracing::debug!(path = %path.display(), "using config file");
            parse(&raw).with_context(|| format!("parse config: {}", path.display()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(ConfigFile::default())
        }
        Err(err) => Err(err).with_context(|| format!("read config: {}", path.display())),
    }
}

pub fn parse(raw: &str) -> anyhow::Result<ConfigFile> {
    if raw.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(raw).context("deserialize config yaml")
}

impl Config {
    pub fn resolve(file: ConfigFile, args: &SyncArgs) -> anyhow::Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or(file.token)
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("missing AniList token (run `calilist login` or set {TOKEN_ENV})")
            })?;

        let app_db = args
            .app_db
            .clone()
            .or(file.app_db)
            .ok_or_else(|| anyhow::anyhow!("missing --app-db (calibre-web app.db location)"))?;
        let metadata_db = args.metadata_db.clone().or(file.metadata_db).ok_or_else(|| {
            anyhow::anyhow!("missing --metadata-db (calibre metadata.db location)")
        })?;

        let anilist_url = file
            .anilist_url
            .as_deref()
            .unwrap_or(DEFAULT_ANILIST_URL);
        let anilist_url = Url::parse(anilist_url).context("parse anilist_url")?;
        if anilist_url.scheme() != "http" && anilist_url.scheme() != "https" {
            anyhow::bail!("anilist_url must be http/https: {anilist_url}");
        }

        let identifier_type = file.identifier_type.unwrap_or_else(|| "anilist".to_owned());
        if identifier_type.trim().is_empty() {
            anyhow::bail!("identifier_type must not be empty");
        }

        let chapters_column = file
            .chapters_column
            .unwrap_or_else(|| "custom_column_15".to_owned());
        validate_sql_identifier(&chapters_column).context("invalid chapters_column")?;

        let window_days = file.window_days.unwrap_or(30);
        if window_days == 0 {
            anyhow::bail!("window_days must be > 0");
        }

        let request_timeout_secs = file.request_timeout_secs.unwrap_or(30);
        if request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be > 0");
        }

        Ok(Self {
            token,
            app_db: PathBuf::from(app_db),
            metadata_db: PathBuf::from(metadata_db),
            anilist_url,
            identifier_type,
            chapters_column,
            window_days,
            pace: Duration::from_millis(file.pace_ms.unwrap_or(1000)),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

/// The chapters column names a table, which cannot be bound as a query
/// parameter.
pub fn validate_sql_identifier(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        anyhow::bail!("identifier is empty");
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        anyhow::bail!("identifier must start with a letter or '_': {name:?}");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("identifier may only contain [A-Za-z0-9_]: {name:?}");
    }
    Ok(())
}

/// Writes `token` into the config file at `path`, keeping every other key.
pub fn store_token(path: &Path, token: &str) -> anyhow::Result<()> {
    let mut doc = match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => serde_yaml::from_str::<serde_yaml::Value>(&raw)
            .with_context(|| format!("parse config: {}", path.display()))?,
        Ok(_) => serde_yaml::Value::Mapping(Default::default()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            serde_yaml::Value::Mapping(Default::default())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read config: {}", path.display()));
        }
    };

    let serde_yaml::Value::Mapping(map) = &mut doc else {
        anyhow::bail!("config root must be a mapping: {}", path.display());
    };
    map.insert(
        serde_yaml::Value::String("token".to_owned()),
        serde_yaml::Value::String(token.to_owned()),
    );

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config dir: {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(&doc).context("serialize config yaml")?;
    std::fs::write(path, yaml).with_context(|| format!("write config: {}", path.display()))?;
    Ok(())
}
