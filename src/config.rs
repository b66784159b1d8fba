// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Loads window, graphics and debug settings from config.toml, falling back
// to defaults if the file is missing or broken. The file can be watched so
// clear colour and FPS display change without restarting.

use anyhow::{Context, Result};
use glam::Vec4;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendKind, ContextDesc, PowerPreference, PresentMode};

pub const DEFAULT_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Graphics Provider".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub backend: BackendKind,
    pub present_mode: PresentMode,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
    pub power_preference: PowerPreference,
    /// Case-insensitive substring of the adapter name
    pub adapter: Option<String>,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            present_mode: PresentMode::Fifo,
            clear_color: [0.1, 0.2, 0.8, 1.0],
            frames_in_flight: 2,
            power_preference: PowerPreference::HighPerformance,
            adapter: None,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Vulkan validation layer / D3D12 debug layer (debug builds only)
    pub validation: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    pub hot_reload: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: true,
            log_to_file: false,
            log_file: "graphics_debug.log".to_string(),
            show_fps: true,
            hot_reload: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_PATH).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", DEFAULT_PATH, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.graphics.frames_in_flight = config.graphics.frames_in_flight.clamp(2, 3);
        Ok(config)
    }

    pub fn clear_color(&self) -> Vec4 {
        Vec4::from_array(self.graphics.clear_color)
    }

    /// Context creation parameters. Validation only applies to debug builds.
    pub fn context_desc(&self, width: u32, height: u32) -> ContextDesc {
        ContextDesc {
            app_name: self.window.title.clone(),
            width,
            height,
            present_mode: self.graphics.present_mode,
            frames_in_flight: self.graphics.frames_in_flight,
            validation: cfg!(debug_assertions) && self.debug.validation,
            power_preference: self.graphics.power_preference,
            adapter_filter: self.graphics.adapter.clone(),
        }
    }
}

/// Watches the config file and keeps the latest successfully parsed
/// version until the host picks it up.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    pending: Arc<Mutex<Option<Config>>>,
}

impl ConfigWatcher {
    /// Watches the parent directory, so saves that rename a temp file over
    /// the config are still picked up.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .with_context(|| format!("Config path {:?} has no file name", path))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let pending = Arc::new(Mutex::new(None));
        let slot = pending.clone();
        let watched = path.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            match event {
                Ok(event)
                    if (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str())) =>
                {
                    if !watched.exists() {
                        return;
                    }
                    match Config::load_from_path(&watched) {
                        Ok(config) => {
                            log::info!("Reloaded {:?}", watched);
                            *slot.lock() = Some(config);
                        }
                        Err(e) => log::warn!("Ignoring config change: {:#}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => log::warn!("Config watch error: {}", e),
            }
        })
        .context("Failed to create config watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;

        Ok(Self {
            _watcher: watcher,
            pending,
        })
    }

    /// Latest reloaded config, if the file changed since the last call.
    pub fn take_update(&self) -> Option<Config> {
        self.pending.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.graphics.backend, BackendKind::Auto);
    }

    #[test]
    fn full_file_parses() {
        let config = Config::from_toml_str(
            r#"
            [window]
            title = "Demo"
            width = 640
            height = 480

            [graphics]
            backend = "d3d12"
            present_mode = "mailbox"
            clear_color = [0.0, 0.5, 0.25, 1.0]
            frames_in_flight = 3
            power_preference = "low_power"
            adapter = "radeon"

            [debug]
            validation = false
            show_fps = false
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "Demo");
        assert_eq!((config.window.width, config.window.height), (640, 480));
        assert_eq!(config.graphics.backend, BackendKind::Direct3D12);
        assert_eq!(config.graphics.present_mode, PresentMode::Mailbox);
        assert_eq!(config.clear_color(), Vec4::new(0.0, 0.5, 0.25, 1.0));
        assert_eq!(config.graphics.power_preference, PowerPreference::LowPower);
        assert_eq!(config.graphics.adapter.as_deref(), Some("radeon"));
        assert!(!config.debug.validation);
        // unspecified keys keep their defaults
        assert!(config.debug.hot_reload);
    }

    #[test]
    fn backend_names() {
        for (name, kind) in [
            ("auto", BackendKind::Auto),
            ("vulkan", BackendKind::Vulkan),
            ("direct3d12", BackendKind::Direct3D12),
        ] {
            let config = Config::from_toml_str(&format!("[graphics]\nbackend = \"{name}\"")).unwrap();
            assert_eq!(config.graphics.backend, kind);
        }
    }

    #[test]
    fn unknown_present_mode_is_an_error() {
        assert!(Config::from_toml_str("[graphics]\npresent_mode = \"vsync-ish\"").is_err());
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let low = Config::from_toml_str("[graphics]\nframes_in_flight = 1").unwrap();
        let high = Config::from_toml_str("[graphics]\nframes_in_flight = 8").unwrap();
        assert_eq!(low.graphics.frames_in_flight, 2);
        assert_eq!(high.graphics.frames_in_flight, 3);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    /// Polls until a reloaded config satisfies `accept`. A plain write
    /// truncates first, so an empty file may be picked up on the way.
    fn wait_for_update(watcher: &ConfigWatcher, accept: impl Fn(&Config) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if watcher.take_update().is_some_and(|config| accept(&config)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn watcher_follows_in_place_and_renamed_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[debug]\nshow_fps = true\n").unwrap();

        let watcher = ConfigWatcher::new(&path).unwrap();
        assert!(watcher.take_update().is_none());

        std::fs::write(&path, "[debug]\nshow_fps = false\n").unwrap();
        assert!(wait_for_update(&watcher, |c| !c.debug.show_fps));

        // Editor-style save: write a sibling file, rename it over the config
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let temp = dir.path().join("config.toml.tmp");
        std::fs::write(&temp, "[graphics]\nclear_color = [1.0, 0.0, 0.0, 1.0]\n").unwrap();
        std::fs::rename(&temp, &path).unwrap();
        assert!(wait_for_update(&watcher, |c| c.clear_color() == red));

        // The watch must survive the rename
        let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
        std::fs::write(&path, "[graphics]\nclear_color = [0.0, 1.0, 0.0, 1.0]\n").unwrap();
        assert!(wait_for_update(&watcher, |c| c.clear_color() == green));
    }

    #[test]
    fn watcher_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let watcher = ConfigWatcher::new(&path).unwrap();
        std::fs::write(dir.path().join("other.toml"), "[debug]\nshow_fps = false\n").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(watcher.take_update().is_none());
    }

    #[test]
    fn context_desc_carries_settings() {
        let mut config = Config::default();
        config.graphics.adapter = Some("nvidia".to_string());
        config.graphics.present_mode = PresentMode::Immediate;

        let desc = config.context_desc(800, 600);
        assert_eq!((desc.width, desc.height), (800, 600));
        assert_eq!(desc.present_mode, PresentMode::Immediate);
        assert_eq!(desc.adapter_filter.as_deref(), Some("nvidia"));
        assert_eq!(desc.validation, cfg!(debug_assertions));
    }
}
