use std::{collections::HashMap, fmt, fs, io, path::Path, str::FromStr};

use anyhow::{anyhow, bail, Context};

const DEFAULT_CONFIG_FILE: &str = "shoplist.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    #[default]
    Local,
    Supabase,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" | "sqlite" => Ok(Self::Local),
            "supabase" => Ok(Self::Supabase),
            other => Err(anyhow!(
                "unknown backend '{other}', expected 'local' or 'supabase'"
            )),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Supabase => f.write_str("supabase"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend: Backend,
    pub database_url: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            database_url: "sqlite://./data/shoplist.db".into(),
            supabase_url: None,
            supabase_anon_key: None,
        }
    }
}

impl Settings {
    fn apply_file(&mut self, file_cfg: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(v) = file_cfg.get("backend") {
            self.backend = v.parse()?;
        }
        if let Some(v) = file_cfg.get("database_url") {
            self.database_url = v.clone();
        }
        if let Some(v) = file_cfg.get("supabase_url") {
            self.supabase_url = Some(v.clone());
        }
        if let Some(v) = file_cfg.get("supabase_anon_key") {
            self.supabase_anon_key = Some(v.clone());
        }
        Ok(())
    }

    /// Later names win, so the app-specific variables override the generic
    /// ones.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("SHOPLIST__BACKEND") {
            self.backend = v.parse().context("invalid SHOPLIST__BACKEND")?;
        }

        if let Some(v) = var("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = var("SHOPLIST__DATABASE_URL") {
            self.database_url = v;
        }

        if let Some(v) = var("NEXT_PUBLIC_SUPABASE_URL") {
            self.supabase_url = Some(v);
        }
        if let Some(v) = var("SUPABASE_URL") {
            self.supabase_url = Some(v);
        }

        if let Some(v) = var("NEXT_PUBLIC_SUPABASE_ANON_KEY") {
            self.supabase_anon_key = Some(v);
        }
        if let Some(v) = var("SUPABASE_ANON_KEY") {
            self.supabase_anon_key = Some(v);
        }
        Ok(())
    }

    pub fn supabase_credentials(&self) -> anyhow::Result<(&str, &str)> {
        let url = self
            .supabase_url
            .as_deref()
            .filter(|url| !url.trim().is_empty());
        let key = self
            .supabase_anon_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());
        match (url, key) {
            (Some(url), Some(key)) => Ok((url, key)),
            (None, _) => bail!("supabase backend needs SUPABASE_URL or supabase_url"),
            (_, None) => bail!("supabase backend needs SUPABASE_ANON_KEY or supabase_anon_key"),
        }
    }
}

/// Defaults, then the toml file, then environment variables. A missing
/// default file is fine; a missing file passed explicitly is not.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            settings.apply_file(&file_cfg)?;
        }
        Err(error) if config_path.is_none() && error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    settings.apply_env(|key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Turns plain file paths into `sqlite://` urls; other urls pass through.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url);
    format!("sqlite://{}", path.replace('\\', "/"))
}
