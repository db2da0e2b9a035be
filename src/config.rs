use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Highest decode rate a scanner may be configured with
pub const MAX_SCANNER_FPS: u32 = 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArScanConfig {
    pub scanner: ScannerConfig,
    pub resolver: ResolverConfig,
    pub recorder: RecorderConfig,
    pub ar: ArConfig,
    pub playback: PlaybackConfig,
    pub directory: DirectoryConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    /// Target decode rate in frames per second
    #[serde(default = "default_scanner_fps")]
    pub fps: u32,

    /// Detection region (width, height) centered in the frame
    #[serde(default = "default_qrbox")]
    pub qrbox: (u32, u32),

    /// Requested camera aspect ratio
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,

    /// Skip mirrored decode attempts
    #[serde(default)]
    pub disable_flip: bool,

    /// Decoder messages that only mean "no code in this frame"
    #[serde(default = "default_noise_patterns")]
    pub noise_patterns: Vec<String>,

    /// Upper bound when waiting for the decode loop to release the camera
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
    /// Path markers that precede a code identifier in printed URLs
    #[serde(default = "default_path_markers")]
    pub path_markers: Vec<String>,

    /// Short-code prefixes stripped before retrying a match
    #[serde(default = "default_short_code_prefixes")]
    pub short_code_prefixes: Vec<String>,

    /// Trim surrounding whitespace from decoded payloads
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecorderConfig {
    /// Maximum number of scan events kept per code
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Attach best-effort location to scan events
    #[serde(default = "default_true")]
    pub geolocation_enabled: bool,

    /// IP geolocation endpoint
    #[serde(default = "default_geolocation_url")]
    pub geolocation_url: String,

    #[serde(default = "default_geolocation_timeout_ms")]
    pub geolocation_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArConfig {
    /// Immersive session mode requested from the XR runtime
    #[serde(default = "default_session_mode")]
    pub session_mode: String,

    #[serde(default = "default_required_features")]
    pub required_features: Vec<String>,

    /// Width / height of the video plane
    #[serde(default = "default_plane_aspect_ratio")]
    pub plane_aspect_ratio: f32,

    /// Height of the video plane in meters
    #[serde(default = "default_plane_height")]
    pub plane_height: f32,

    /// Maximum tilt of a hit pose still treated as a horizontal surface
    #[serde(default = "default_horizontal_tolerance")]
    pub horizontal_tolerance_degrees: f32,

    /// Tick interval of the simulated walkthrough
    #[serde(default = "default_simulation_tick_ms")]
    pub simulation_tick_ms: u64,

    /// Progress increment per simulation tick
    #[serde(default = "default_simulation_step")]
    pub simulation_step: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_true")]
    pub loop_video: bool,

    #[serde(default)]
    pub muted: bool,

    /// Prefer the low bandwidth rendition on save-data or slow connections
    #[serde(default = "default_true")]
    pub downgrade_on_constrained_network: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    Snapshot,
    Rest,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_backend")]
    pub backend: DirectoryBackend,

    /// JSON snapshot with `codes` and `videos` arrays
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,

    /// Base URL of the remote data service
    #[serde(default)]
    pub rest_url: String,

    /// Environment variable holding the data service API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,

    /// Public base URL printed into generated codes
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl ArScanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("arscan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.fps", default_scanner_fps())?
            .set_default("scanner.qrbox", vec![default_qrbox().0, default_qrbox().1])?
            .set_default("scanner.aspect_ratio", default_aspect_ratio())?
            .set_default("scanner.disable_flip", false)?
            .set_default("scanner.noise_patterns", default_noise_patterns())?
            .set_default("scanner.stop_timeout_ms", default_stop_timeout_ms())?
            .set_default("resolver.path_markers", default_path_markers())?
            .set_default("resolver.short_code_prefixes", default_short_code_prefixes())?
            .set_default("resolver.trim_whitespace", true)?
            .set_default("recorder.history_limit", default_history_limit() as i64)?
            .set_default("recorder.geolocation_enabled", true)?
            .set_default("recorder.geolocation_url", default_geolocation_url())?
            .set_default(
                "recorder.geolocation_timeout_ms",
                default_geolocation_timeout_ms(),
            )?
            .set_default("ar.session_mode", default_session_mode())?
            .set_default("ar.required_features", default_required_features())?
            .set_default("ar.plane_aspect_ratio", default_plane_aspect_ratio() as f64)?
            .set_default("ar.plane_height", default_plane_height() as f64)?
            .set_default(
                "ar.horizontal_tolerance_degrees",
                default_horizontal_tolerance() as f64,
            )?
            .set_default("ar.simulation_tick_ms", default_simulation_tick_ms())?
            .set_default("ar.simulation_step", default_simulation_step() as i64)?
            .set_default("playback.loop_video", true)?
            .set_default("playback.muted", false)?
            .set_default("playback.downgrade_on_constrained_network", true)?
            .set_default("directory.backend", "snapshot")?
            .set_default("directory.snapshot_path", default_snapshot_path())?
            .set_default("directory.rest_url", "")?
            .set_default("directory.api_key_env", default_api_key_env())?
            .set_default("directory.timeout_secs", default_directory_timeout_secs())?
            .set_default("directory.app_base_url", default_app_base_url())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with ARSCAN_ prefix
            .add_source(Environment::with_prefix("ARSCAN").separator("_"))
            .build()?;

        let config: ArScanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SCANNER_FPS).contains(&self.scanner.fps) {
            return Err(ConfigError::Message(format!(
                "Scanner fps must be between 1 and {}",
                MAX_SCANNER_FPS
            )));
        }

        if self.scanner.qrbox.0 == 0 || self.scanner.qrbox.1 == 0 {
            return Err(ConfigError::Message(
                "Scanner qrbox must be greater than 0".to_string(),
            ));
        }

        if self.scanner.aspect_ratio <= 0.0 {
            return Err(ConfigError::Message(
                "Scanner aspect_ratio must be positive".to_string(),
            ));
        }

        if self
            .resolver
            .path_markers
            .iter()
            .chain(self.resolver.short_code_prefixes.iter())
            .any(|s| s.is_empty())
        {
            return Err(ConfigError::Message(
                "Resolver markers and prefixes must not be empty".to_string(),
            ));
        }

        if self.recorder.history_limit == 0 {
            return Err(ConfigError::Message(
                "Recorder history_limit must be greater than 0".to_string(),
            ));
        }

        if self.ar.plane_aspect_ratio <= 0.0 || self.ar.plane_height <= 0.0 {
            return Err(ConfigError::Message(
                "AR plane dimensions must be positive".to_string(),
            ));
        }

        if self.ar.simulation_step == 0 || self.ar.simulation_step > 100 {
            return Err(ConfigError::Message(
                "AR simulation_step must be between 1 and 100".to_string(),
            ));
        }

        if self.directory.backend == DirectoryBackend::Rest && self.directory.rest_url.is_empty()
        {
            return Err(ConfigError::Message(
                "Directory rest_url is required for the rest backend".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ArScanConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            resolver: ResolverConfig::default(),
            recorder: RecorderConfig::default(),
            ar: ArConfig::default(),
            playback: PlaybackConfig::default(),
            directory: DirectoryConfig {
                backend: default_directory_backend(),
                snapshot_path: default_snapshot_path(),
                rest_url: String::new(),
                api_key_env: default_api_key_env(),
                timeout_secs: default_directory_timeout_secs(),
                app_base_url: default_app_base_url(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            fps: default_scanner_fps(),
            qrbox: default_qrbox(),
            aspect_ratio: default_aspect_ratio(),
            disable_flip: false,
            noise_patterns: default_noise_patterns(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            path_markers: default_path_markers(),
            short_code_prefixes: default_short_code_prefixes(),
            trim_whitespace: true,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            geolocation_enabled: true,
            geolocation_url: default_geolocation_url(),
            geolocation_timeout_ms: default_geolocation_timeout_ms(),
        }
    }
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            session_mode: default_session_mode(),
            required_features: default_required_features(),
            plane_aspect_ratio: default_plane_aspect_ratio(),
            plane_height: default_plane_height(),
            horizontal_tolerance_degrees: default_horizontal_tolerance(),
            simulation_tick_ms: default_simulation_tick_ms(),
            simulation_step: default_simulation_step(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            loop_video: true,
            muted: false,
            downgrade_on_constrained_network: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_scanner_fps() -> u32 {
    10
}
fn default_qrbox() -> (u32, u32) {
    (250, 250)
}
fn default_aspect_ratio() -> f64 {
    1.0
}
fn default_noise_patterns() -> Vec<String> {
    vec![
        "No MultiFormat Readers were able to detect the code".to_string(),
        "NotFoundException".to_string(),
    ]
}
fn default_stop_timeout_ms() -> u64 {
    3000
}

fn default_path_markers() -> Vec<String> {
    vec!["/ar/".to_string()]
}
fn default_short_code_prefixes() -> Vec<String> {
    vec!["preview-".to_string()]
}

fn default_history_limit() -> usize {
    500
}
fn default_geolocation_url() -> String {
    "https://ipapi.co/json/".to_string()
}
fn default_geolocation_timeout_ms() -> u64 {
    1500
}

fn default_session_mode() -> String {
    "immersive-ar".to_string()
}
fn default_required_features() -> Vec<String> {
    vec!["hit-test".to_string(), "dom-overlay".to_string()]
}
fn default_plane_aspect_ratio() -> f32 {
    16.0 / 9.0
}
fn default_plane_height() -> f32 {
    1.0
}
fn default_horizontal_tolerance() -> f32 {
    20.0
}
fn default_simulation_tick_ms() -> u64 {
    200
}
fn default_simulation_step() -> u8 {
    10
}

fn default_directory_backend() -> DirectoryBackend {
    DirectoryBackend::Snapshot
}
fn default_snapshot_path() -> String {
    "./directory.json".to_string()
}
fn default_api_key_env() -> String {
    "ARSCAN_API_KEY".to_string()
}
fn default_directory_timeout_secs() -> u64 {
    10
}
fn default_app_base_url() -> String {
    "https://epicmoments.app".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ArScanConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.fps, 10);
        assert_eq!(config.scanner.qrbox, (250, 250));
        assert_eq!(config.resolver.path_markers, vec!["/ar/".to_string()]);
        assert_eq!(config.directory.backend, DirectoryBackend::Snapshot);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ArScanConfig::default();
        config.scanner.fps = 0;
        assert!(config.validate().is_err());

        config.scanner.fps = 2000;
        assert!(config.validate().is_err());

        config.scanner.fps = MAX_SCANNER_FPS;
        assert!(config.validate().is_ok());

        config.scanner.fps = 10;
        config.resolver.short_code_prefixes.push(String::new());
        assert!(config.validate().is_err());

        config.resolver.short_code_prefixes.pop();
        config.directory.backend = DirectoryBackend::Rest;
        assert!(config.validate().is_err());

        config.directory.rest_url = "https://data.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scanner]
fps = 15

[recorder]
history_limit = 20
geolocation_enabled = false

[ar]
simulation_step = 25
"#
        )
        .unwrap();

        let config = ArScanConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.scanner.fps, 15);
        assert_eq!(config.scanner.qrbox, (250, 250));
        assert_eq!(config.recorder.history_limit, 20);
        assert!(!config.recorder.geolocation_enabled);
        assert_eq!(config.ar.simulation_step, 25);
        assert!(config.validate().is_ok());
    }
}
