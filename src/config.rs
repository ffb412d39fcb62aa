use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::platform::lock::LockPlan;

pub const DEFAULT_SETTINGS_PATH: &str = "/var/lib/dream-frame/prefs.json";
pub const DEFAULT_PREFERENCES_NAMESPACE: &str = "dream_frame_prefs";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// JSON file holding the persisted folder reference and lock enrollment.
    pub settings_path: PathBuf,
    /// Namespace inside the preferences file.
    pub preferences_namespace: String,
    /// Play GIFs as animations. When false only the first frame is shown.
    pub animated_playback: bool,
    /// How long a still image stays up before the device locks.
    #[serde(with = "humantime_serde")]
    pub static_dwell: Duration,
    /// How long a GIF's first frame stays up when animation is disabled.
    #[serde(with = "humantime_serde")]
    pub gif_fallback_dwell: Duration,
    /// Upper bound on animated playback before the device locks anyway.
    #[serde(with = "humantime_serde")]
    pub gif_safety_timeout: Duration,
    /// Device lock commands.
    pub lock: LockConfig,
    /// Output surface.
    pub display: DisplayConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "configuration file not found; using defaults"
            );
            return Ok(Self::default());
        }
        Self::from_yaml_file(path)
            .with_context(|| format!("failed to parse configuration {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.settings_path.as_os_str().is_empty(),
            "settings-path must not be empty"
        );
        ensure!(
            !self.preferences_namespace.trim().is_empty(),
            "preferences-namespace must not be blank"
        );
        ensure!(
            !self.static_dwell.is_zero(),
            "static-dwell must be greater than zero"
        );
        ensure!(
            !self.gif_fallback_dwell.is_zero(),
            "gif-fallback-dwell must be greater than zero"
        );
        ensure!(
            self.gif_safety_timeout >= self.gif_fallback_dwell,
            "gif-safety-timeout must not be shorter than gif-fallback-dwell"
        );
        self.lock.validate().context("invalid lock configuration")?;
        self.display
            .validate()
            .context("invalid display configuration")?;
        Ok(self)
    }

    pub fn timings(&self) -> PlaybackTimings {
        PlaybackTimings {
            static_dwell: self.static_dwell,
            gif_fallback_dwell: self.gif_fallback_dwell,
            gif_safety_timeout: self.gif_safety_timeout,
            animated_playback: self.animated_playback,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from(DEFAULT_SETTINGS_PATH),
            preferences_namespace: DEFAULT_PREFERENCES_NAMESPACE.to_string(),
            animated_playback: true,
            static_dwell: Duration::from_secs(3),
            gif_fallback_dwell: Duration::from_secs(5),
            gif_safety_timeout: Duration::from_secs(50),
            lock: LockConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Delays that pace one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTimings {
    pub static_dwell: Duration,
    pub gif_fallback_dwell: Duration,
    pub gif_safety_timeout: Duration,
    pub animated_playback: bool,
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Configuration::default().timings()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LockConfig {
    /// Shell command that locks the device, e.g. `loginctl lock-sessions`.
    pub command: Option<String>,
    /// Shell command that exits 0 when the device is already locked.
    pub locked_probe: Option<String>,
}

impl LockConfig {
    fn validate(&self) -> Result<()> {
        if let Some(cmd) = &self.command {
            ensure!(!cmd.trim().is_empty(), "lock.command must not be blank");
        }
        if let Some(cmd) = &self.locked_probe {
            ensure!(!cmd.trim().is_empty(), "lock.locked-probe must not be blank");
        }
        Ok(())
    }

    pub fn plan(&self) -> LockPlan {
        LockPlan {
            lock_command: self.command.clone(),
            locked_probe: self.locked_probe.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Framebuffer device to draw into. Headless when absent.
    pub framebuffer: Option<PathBuf>,
    /// Framebuffer width in pixels.
    pub width: u32,
    /// Framebuffer height in pixels.
    pub height: u32,
}

impl DisplayConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.width > 0 && self.height > 0,
            "display.width and display.height must be positive"
        );
        Ok(())
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            framebuffer: None,
            width: 1920,
            height: 1080,
        }
    }
}
