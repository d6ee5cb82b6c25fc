use anyhow::{Context, Result};
use mirror::{PreservationOptions, SyncOptions, SyncRequest, DEFAULT_REPORT_INTERVAL};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub defaults: RunDefaults,
    #[serde(default)]
    pub jobs: Vec<MirrorJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaults {
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub report_detail: bool,
    #[serde(default)]
    pub preserve_mtime: bool,
    #[serde(with = "humantime_serde", default = "default_report_interval")]
    pub report_interval: Duration,
}

/// A named source/target pair with optional per-job overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorJob {
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_detail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_mtime: Option<bool>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            defaults: RunDefaults::default(),
            jobs: vec![Self::default_job()],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            log_file: None,
        }
    }
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            validate: false,
            report_detail: false,
            preserve_mtime: false,
            report_interval: default_report_interval(),
        }
    }
}

impl MirrorConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let config: MirrorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Load `path` if given, otherwise the default location when it exists,
    /// otherwise built-in defaults with no jobs.
    pub async fn load_or_default(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path).await;
        }

        match default_config_path() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => Self::load(&path).await,
            _ => Ok(Self {
                jobs: Vec::new(),
                ..Self::default()
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for job in &self.jobs {
            if job.name.is_empty() {
                anyhow::bail!("Mirror job name cannot be empty");
            }
            if !names.insert(job.name.as_str()) {
                anyhow::bail!("Duplicate mirror job name: {}", job.name);
            }
            if job.source == job.target {
                anyhow::bail!("Job '{}' uses the same directory as source and target", job.name);
            }
        }

        parse_level(&self.logging.log_level)
            .with_context(|| format!("Invalid log level '{}'", self.logging.log_level))?;

        Ok(())
    }

    pub fn job(&self, name: &str) -> Result<&MirrorJob> {
        self.jobs
            .iter()
            .find(|job| job.name == name)
            .with_context(|| format!("No mirror job named '{}'", name))
    }

    /// Engine options from the run defaults
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            report_detail: self.defaults.report_detail,
            report_interval: self.defaults.report_interval,
            preservation_options: PreservationOptions {
                preserve_mtime: self.defaults.preserve_mtime,
            },
        }
    }

    fn default_job() -> MirrorJob {
        MirrorJob {
            name: "default".to_string(),
            source: PathBuf::from("./source"),
            target: PathBuf::from("./backup"),
            validate: Some(true),
            report_detail: None,
            preserve_mtime: None,
        }
    }
}

impl MirrorJob {
    /// Request and engine options for this job, falling back to `defaults`
    pub fn resolve(&self, defaults: &RunDefaults) -> (SyncRequest, SyncOptions) {
        let request = SyncRequest::new(&self.source, &self.target)
            .validate(self.validate.unwrap_or(defaults.validate))
            .report_detail(self.report_detail.unwrap_or(defaults.report_detail));
        let options = SyncOptions {
            report_detail: request.report_detail,
            report_interval: defaults.report_interval,
            preservation_options: PreservationOptions {
                preserve_mtime: self.preserve_mtime.unwrap_or(defaults.preserve_mtime),
            },
        };
        (request, options)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mirror").join("mirror.toml"))
}

pub fn parse_level(level: &str) -> Result<tracing::Level> {
    level
        .parse::<tracing::Level>()
        .map_err(|e| anyhow::anyhow!("{}", e))
}

fn default_log_level() -> String { "info".to_string() }
fn default_report_interval() -> Duration { DEFAULT_REPORT_INTERVAL }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let content = r#"
            [logging]
            log_level = "debug"

            [defaults]
            validate = true
            report_interval = "500ms"

            [[jobs]]
            name = "photos"
            source = "/home/me/photos"
            target = "/mnt/backup/photos"
            report_detail = true
        "#;

        let config: MirrorConfig = toml::from_str(content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.defaults.report_interval, Duration::from_millis(500));
        let (request, options) = config.job("photos").unwrap().resolve(&config.defaults);
        assert!(request.validate);
        assert!(request.report_detail);
        assert!(options.report_detail);
        assert!(!options.preservation_options.preserve_mtime);
        assert_eq!(options.report_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: MirrorConfig = toml::from_str("").unwrap();
        assert_eq!(config.logging.log_level, "info");
        assert_eq!(config.defaults.report_interval, Duration::from_secs(3));
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_duplicate_job_names_rejected() {
        let mut config = MirrorConfig::default();
        config.jobs.push(config.jobs[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = MirrorConfig::default();
        config.logging.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_job() {
        let config = MirrorConfig::default();
        assert!(config.job("nope").is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mirror.toml");

        let config = MirrorConfig::default();
        config.save(&path).await.unwrap();
        let loaded = MirrorConfig::load(&path).await.unwrap();

        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].name, "default");
        assert_eq!(loaded.defaults.report_interval, config.defaults.report_interval);
    }
}
