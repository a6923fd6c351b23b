use crate::config::DEFAULT_CONFIG_PATH;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Name of the optional settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "fwconfig.yaml";

/// Prefix of the environment variables that override settings, e.g.
/// `FWCONFIG_CONFIG_PATH` or `FWCONFIG_DEBUG`.
pub const ENV_PREFIX: &str = "FWCONFIG";

/// Application settings, as opposed to the firewall configuration the tool
/// manages.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Location of the configuration document
    pub config_path: Utf8PathBuf,

    pub log_dir: Utf8PathBuf,

    pub log_prefix: String,

    /// Log at debug instead of info
    pub debug: bool,

    /// Also log to stderr
    pub console_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: Utf8PathBuf::from(DEFAULT_CONFIG_PATH),
            log_dir: Utf8PathBuf::from("logs"),
            log_prefix: "fwconfig".to_string(),
            debug: false,
            console_log: false,
        }
    }
}

impl Settings {
    /// Layer defaults, the settings file and the environment, later sources
    /// winning.
    ///
    /// `file` overrides the default [`SETTINGS_FILE`]; a missing file is not
    /// an error.
    pub fn load(file: Option<&Utf8Path>) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let file = file.unwrap_or(Utf8Path::new(SETTINGS_FILE));

        let settings = Config::builder()
            .set_default("config_path", defaults.config_path.as_str())?
            .set_default("log_dir", defaults.log_dir.as_str())?
            .set_default("log_prefix", defaults.log_prefix.as_str())?
            .set_default("debug", defaults.debug)?
            .set_default("console_log", defaults.console_log)?
            .add_source(File::from(file.as_std_path()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        tracing::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }
}
