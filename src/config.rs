use anyhow::Result;
use clap::Parser;
use ffmpeg_next as ffmpeg;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure that can be loaded from CLI or a config file
///
/// Example configuration file content
/// # Audio Transcode Configuration
///
/// listen_on_port = 32145
/// workspace = "./data"
/// ffmpeg_log_level = "error"
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, default_value_t = 32145)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Working directory for scratch output files
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Native FFmpeg log level: quiet, panic, fatal, error, warning, info,
    /// verbose, debug or trace
    #[arg(short, long, default_value = "error")]
    #[serde(default = "default_ffmpeg_log_level")]
    pub ffmpeg_log_level: String,

    /// Configuration file path (overrides all other arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            workspace: default_workspace(),
            ffmpeg_log_level: default_ffmpeg_log_level(),
            config: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.ffmpeg_log_level == default_ffmpeg_log_level() {
            self.ffmpeg_log_level = file_config.ffmpeg_log_level;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.workspace.is_empty() {
            return Err(anyhow::anyhow!("workspace must not be empty"));
        }
        self.parsed_ffmpeg_log_level()?;
        Ok(())
    }

    /// The configured native log level, for [`ffmpeg::util::log::set_level`].
    pub fn parsed_ffmpeg_log_level(&self) -> Result<ffmpeg::util::log::Level> {
        use ffmpeg::util::log::Level;
        match self.ffmpeg_log_level.as_str() {
            "quiet" => Ok(Level::Quiet),
            "panic" => Ok(Level::Panic),
            "fatal" => Ok(Level::Fatal),
            "error" => Ok(Level::Error),
            "warning" => Ok(Level::Warning),
            "info" => Ok(Level::Info),
            "verbose" => Ok(Level::Verbose),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            level => Err(anyhow::anyhow!("unknown ffmpeg log level: {level:?}")),
        }
    }
}

fn default_port() -> u16 {
    32145
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_ffmpeg_log_level() -> String {
    "error".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_on_port, 32145);
    }

    #[test]
    fn file_config_fills_defaults() {
        let file: Config = toml::from_str(
            r#"
            listen_on_port = 8080
            workspace = "/tmp/audio"
            "#,
        )
        .unwrap();
        let merged = Config::default().merge_with_file(file);
        assert_eq!(merged.listen_on_port, 8080);
        assert_eq!(merged.workspace, "/tmp/audio");
        assert_eq!(merged.ffmpeg_log_level, "error");
    }

    #[test]
    fn bad_log_level_fails_validation() {
        let config = Config {
            ffmpeg_log_level: "loud".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
