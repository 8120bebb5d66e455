// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use routinely_app::DEFAULT_SYSTEM_PROMPT;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_CHAT_ENDPOINT: &str = "http://localhost:8787/";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_CHAT_TIMEOUT: &str = "60s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub chat: Chat,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            catalog: CatalogSection::default(),
            storage: Storage::default(),
            chat: Chat::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSection {
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_CHAT_ENDPOINT.to_owned()),
            model: Some(DEFAULT_CHAT_MODEL.to_owned()),
            timeout: Some(DEFAULT_CHAT_TIMEOUT.to_owned()),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub path: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("ROUTINELY_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set ROUTINELY_CONFIG_PATH to the config file")
        })?;
        Ok(config_root
            .join(routinely_db::APP_NAME)
            .join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [catalog], [storage], [chat], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "config {} has version {}; expected 1",
                path.display(),
                self.version
            );
        }

        if let Some(db_path) = &self.storage.db_path {
            routinely_db::validate_db_path(db_path)?;
        }

        if let Some(catalog) = &self.catalog.path
            && catalog.trim().is_empty()
        {
            bail!("catalog.path in {} must not be empty", path.display());
        }

        if let Some(endpoint) = &self.chat.endpoint
            && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            bail!(
                "chat.endpoint in {} must be an http:// or https:// URL, got {:?}",
                path.display(),
                endpoint
            );
        }

        if let Some(model) = &self.chat.model
            && model.trim().is_empty()
        {
            bail!("chat.model in {} must not be empty", path.display());
        }

        if let Some(timeout) = &self.chat.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "chat.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        Ok(())
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog.path.as_deref().map(PathBuf::from)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => routinely_db::default_db_path(),
        }
    }

    pub fn chat_endpoint(&self) -> &str {
        self.chat
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_CHAT_ENDPOINT)
    }

    pub fn chat_model(&self) -> &str {
        self.chat.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL)
    }

    pub fn chat_timeout(&self) -> Result<Duration> {
        parse_duration(self.chat.timeout.as_deref().unwrap_or(DEFAULT_CHAT_TIMEOUT))
    }

    pub fn system_prompt(&self) -> &str {
        self.chat
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log.path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(routinely_db::data_dir()?.join("routinely.log")),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# routinely config\n# Place this file at: {}\n\nversion = 1\n\n[catalog]\n# Required unless you pass --catalog or --demo\n# path = \"/absolute/path/to/products.json\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/routinely/routinely.db)\n# db_path = \"/absolute/path/to/routinely.db\"\n\n[chat]\nendpoint = \"{}\"\nmodel = \"{}\"\ntimeout = \"{}\"\n# system_prompt = \"You are a helpful skincare expert.\"\n\n[log]\nlevel = \"{}\"\n# path = \"/absolute/path/to/routinely.log\"\n",
            path.display(),
            DEFAULT_CHAT_ENDPOINT,
            DEFAULT_CHAT_MODEL,
            DEFAULT_CHAT_TIMEOUT,
            DEFAULT_LOG_LEVEL,
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 60s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use routinely_app::DEFAULT_SYSTEM_PROMPT;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.chat_endpoint(), "http://localhost:8787/");
        assert_eq!(config.chat_model(), "gpt-4o");
        assert_eq!(config.chat_timeout()?, Duration::from_secs(60));
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.catalog_path(), None);
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[chat]\nmodel=\"gpt-4o\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[chat]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[catalog]\npath = \"/srv/products.json\"\n[chat]\nendpoint = \"https://proxy.example/chat\"\nmodel = \"small\"\ntimeout = \"1500ms\"\nsystem_prompt = \"Be brief.\"\n[log]\nlevel = \"debug\"\npath = \"/tmp/routinely-test.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.catalog_path(), Some(PathBuf::from("/srv/products.json")));
        assert_eq!(config.chat_endpoint(), "https://proxy.example/chat");
        assert_eq!(config.chat_model(), "small");
        assert_eq!(config.chat_timeout()?, Duration::from_millis(1500));
        assert_eq!(config.system_prompt(), "Be brief.");
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_path()?, PathBuf::from("/tmp/routinely-test.log"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROUTINELY_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROUTINELY_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_storage_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROUTINELY_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROUTINELY_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_storage_db_path_missing() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("ROUTINELY_DB_PATH", "/from/env-only.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("ROUTINELY_DB_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_storage_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[storage]\ndb_path = \"https://evil.example/routinely.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        let message = error.to_string();
        assert!(
            message.contains("looks like a URI") || message.contains("filesystem path"),
            "unexpected message: {message}"
        );
        Ok(())
    }

    #[test]
    fn chat_values_are_validated() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[chat]\nendpoint = \"ftp://proxy\"\n")?;
        let error = Config::load(&path).expect_err("ftp endpoint should fail");
        assert!(error.to_string().contains("chat.endpoint"));

        let (_temp, path) = write_config("version = 1\n[chat]\nmodel = \"  \"\n")?;
        let error = Config::load(&path).expect_err("blank model should fail");
        assert!(error.to_string().contains("chat.model"));

        let (_temp, path) = write_config("version = 1\n[chat]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));
        Ok(())
    }

    #[test]
    fn timeout_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn timeout_rejects_invalid_duration() {
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        let message = error.to_string();
        assert!(
            message.contains("invalid duration") || message.contains("invalid timeout duration"),
            "unexpected message: {message}"
        );
    }

    #[test]
    fn blank_system_prompt_falls_back_to_default() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[chat]\nsystem_prompt = \"\"\n")?;
        let config = Config::load(&path)?;
        assert_eq!(config.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        Ok(())
    }

    #[test]
    fn example_config_round_trips() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, Config::example_config(&path))?;
        let config = Config::load(&path)?;
        assert_eq!(config.version, 1);
        assert_eq!(config.chat_model(), "gpt-4o");
        Ok(())
    }
}
