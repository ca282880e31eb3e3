//! Configuration system for Lens
//!
//! Loads configuration from TOML file at `~/.config/lens/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Environment variable naming a test input replay stream
pub const TEST_INPUT_ENV: &str = "LENS_TEST_INPUT";

/// Upper bound for tap radius and move sensitivity, in pixels
pub const MAX_TOUCH_THRESHOLD: u32 = 1000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub screen: ScreenConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            let mut config = Self::default();
            config.apply_env();
            return Ok(config);
        }

        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load and validate a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let mut config = Self::parse(&content)?;
        config.validate();

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Reset out-of-range values to their defaults. Returns the names of the
    /// fields that were reset.
    pub fn validate(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();
        let defaults = InputConfig::default();
        if self.input.tap_radius > MAX_TOUCH_THRESHOLD {
            error!(
                "tap_radius {} out of range 0..={}, using {}",
                self.input.tap_radius, MAX_TOUCH_THRESHOLD, defaults.tap_radius
            );
            self.input.tap_radius = defaults.tap_radius;
            reset.push("input.tap_radius");
        }
        if self.input.move_sensitivity > MAX_TOUCH_THRESHOLD {
            error!(
                "move_sensitivity {} out of range 0..={}, using {}",
                self.input.move_sensitivity, MAX_TOUCH_THRESHOLD, defaults.move_sensitivity
            );
            self.input.move_sensitivity = defaults.move_sensitivity;
            reset.push("input.move_sensitivity");
        }
        if self.screen.width <= 0 || self.screen.height <= 0 {
            warn!(
                "Invalid screen size {}x{}, using defaults",
                self.screen.width, self.screen.height
            );
            let screen = ScreenConfig::default();
            self.screen.width = screen.width;
            self.screen.height = screen.height;
            reset.push("screen.size");
        }
        reset
    }

    /// `LENS_TEST_INPUT` overrides `input.test_input`.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(TEST_INPUT_ENV) {
            self.set_test_input(&path);
        }
    }

    fn set_test_input(&mut self, path: &str) {
        if path.is_empty() {
            self.input.test_input = None;
        } else {
            info!("Using test input stream {}", path);
            self.input.test_input = Some(PathBuf::from(path));
        }
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("lens");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = Self::default();
        let toml_string = toml::to_string_pretty(&default_config)
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Movement (pixels) a fresh touch may make and still count as a tap
    pub tap_radius: u32,
    /// Movement (pixels) a dragging touch must make to report a move
    pub move_sensitivity: u32,
    /// Report every contact of multi-touch screens instead of the primary one
    pub use_multi_touch: bool,
    /// Take exclusive access to opened devices
    pub grab_devices: bool,
    /// Replay stream used instead of device discovery
    pub test_input: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tap_radius: 20,
            move_sensitivity: 20,
            use_multi_touch: false,
            grab_devices: true,
            test_input: None,
        }
    }
}

/// Display backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Headless,
    Framebuffer,
}

/// Screen configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub platform: PlatformKind,
    /// Headless screen geometry
    pub width: i32,
    pub height: i32,
    pub depth: u32,
    pub resolution_x: u32,
    pub resolution_y: u32,
    /// Framebuffer device name under /dev
    pub framebuffer: String,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            platform: PlatformKind::Headless,
            width: 800,
            height: 600,
            depth: 32,
            resolution_x: 72,
            resolution_y: 72,
            framebuffer: "fb0".into(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "lens=info".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_use_defaults() {
        let config = Config::parse("[input]\nuse_multi_touch = true\n").unwrap();
        assert!(config.input.use_multi_touch);
        assert_eq!(config.input.tap_radius, 20);
        assert_eq!(config.screen.platform, PlatformKind::Headless);
        assert_eq!(config.logging.filter, "lens=info");
    }

    #[test]
    fn out_of_range_thresholds_fall_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input]\ntap_radius = 5000\nmove_sensitivity = 7").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.input.tap_radius, 20);
        assert_eq!(config.input.move_sensitivity, 7);
    }

    #[test]
    fn validate_reports_reset_fields() {
        let mut config = Config::parse("[input]\nmove_sensitivity = 1001\n[screen]\nwidth = 0").unwrap();
        assert_eq!(config.validate(), vec!["input.move_sensitivity", "screen.size"]);
        assert_eq!(config.input.move_sensitivity, 20);
        assert!(config.screen.width > 0);

        let mut config = Config::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn platform_names_are_lowercase() {
        let config = Config::parse("[screen]\nplatform = \"framebuffer\"\nframebuffer = \"fb1\"").unwrap();
        assert_eq!(config.screen.platform, PlatformKind::Framebuffer);
        assert_eq!(config.screen.framebuffer, "fb1");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::parse(&text).unwrap();
        assert_eq!(config.screen.width, 800);
        assert!(config.input.grab_devices);
    }

    #[test]
    fn empty_test_input_disables_replay() {
        let mut config = Config::default();
        config.set_test_input("/tmp/replay");
        assert_eq!(config.input.test_input, Some(PathBuf::from("/tmp/replay")));
        config.set_test_input("");
        assert_eq!(config.input.test_input, None);
    }
}
