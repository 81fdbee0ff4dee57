use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main application configuration with strongly-typed global sections
/// and a flexible per-component configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging configuration (optional, uses defaults if None).
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    /// Lifecycle tunables applied to the built app.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Directory with one YAML file per config key (optional).
    #[serde(default)]
    pub components_dir: Option<String>,
    /// Per-component configuration bag: config key → arbitrary JSON/YAML value.
    #[serde(default)]
    pub components: HashMap<String, serde_json::Value>,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/compkit.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>, // How many files to keep
    #[serde(default)]
    pub max_size_mb: Option<u64>, // Max size of the file in MB
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Per-probe limit for healthchecks; 0 disables the limit.
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    /// Per-component limit for singleton stop hooks; 0 disables the limit.
    #[serde(default)]
    pub stop_timeout_ms: u64,
}

const fn default_health_timeout_ms() -> u64 {
    5_000
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            health_timeout_ms: default_health_timeout_ms(),
            stop_timeout_ms: 0,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl LifecycleConfig {
    pub fn app_options(&self) -> compkit::AppOptions {
        compkit::AppOptions {
            health_timeout: millis(self.health_timeout_ms),
            stop_timeout: millis(self.stop_timeout_ms),
        }
    }
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/compkit.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: Some(default_logging_config()),
            lifecycle: LifecycleConfig::default(),
            components_dir: None,
            components: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let config_path = config_path.as_ref();

        // Optional sections stay None unless YAML/ENV provide them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path))
            // Example: APP__COMPONENTS__DATABASE__DSN=... maps to components.database.dsn
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        if let Some(dir) = config.components_dir.clone() {
            let dir = match config_path.parent() {
                Some(parent) if Path::new(&dir).is_relative() => parent.join(dir),
                _ => dir.into(),
            };
            merge_component_files(&mut config.components, &dir)
                .with_context(|| format!("Failed to read components_dir {}", dir.display()))?;
        }

        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => Ok(Self::default()),
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }
}

/// Command line flags that override loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// `-v` count: 1 raises the default console level to debug, 2+ to trace.
    pub verbose: u8,
}

/// Each `<key>.yaml` / `<key>.yml` file becomes `components[<key>]`,
/// overriding an entry with the same key from the main file.
fn merge_component_files(bag: &mut HashMap<String, serde_json::Value>, dir: &Path) -> Result<()> {
    use std::fs;
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if ext != "yml" && ext != "yaml" {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        let raw = fs::read_to_string(&path)?;
        let val: serde_yaml::Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?;
        bag.insert(key, serde_json::to_value(val)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
