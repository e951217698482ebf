//! Capture configuration – reads/writes `~/.mocap/config.toml`.
//!
//! ```toml
//! bind_addr = "0.0.0.0"
//! udp_port = 12345
//! recv_timeout_ms = 1000
//! sample_interval_ms = 50
//! clear_store_on_start = true
//!
//! [[rig.armatures]]
//! name = "Armature"
//! joints = ["head", "spine"]
//! mappings = [{ channel = "head", joint = "head" }]
//!
//! [[rig.objects]]
//! name = "marker1"
//! channels = ["marker1"]
//! ```

use mocap_runtime::SessionConfig;
use mocap_types::JointMapping;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One armature in the simulated rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmatureConfig {
    pub name: String,
    pub joints: Vec<String>,
    #[serde(default)]
    pub mappings: Vec<JointMapping>,
}

/// One positionable object in the simulated rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    /// Channels driving this object's position; the first one with a sample
    /// wins each tick.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Scene description for headless capture runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default)]
    pub armatures: Vec<ArmatureConfig>,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

impl RigConfig {
    /// A head-tracking armature plus one marker object.
    pub fn demo() -> Self {
        Self {
            armatures: vec![ArmatureConfig {
                name: "Armature".to_string(),
                joints: vec!["head".to_string(), "spine".to_string()],
                mappings: vec![JointMapping::new("head", "head")],
            }],
            objects: vec![ObjectConfig {
                name: "marker1".to_string(),
                channels: vec!["marker1".to_string()],
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.armatures.is_empty() && self.objects.is_empty()
    }
}

/// Persisted capture configuration stored in `~/.mocap/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interface the UDP listener binds.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// UDP port the sensor device streams to.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// Socket receive timeout; bounds how long `stop` waits for the listener.
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Sample tick period.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Forget samples from a previous session when capture starts.
    #[serde(default = "default_clear_store_on_start")]
    pub clear_store_on_start: bool,

    #[serde(default = "RigConfig::demo")]
    pub rig: RigConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_udp_port() -> u16 {
    12345
}
fn default_recv_timeout_ms() -> u64 {
    1000
}
fn default_sample_interval_ms() -> u64 {
    50
}
fn default_clear_store_on_start() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            udp_port: default_udp_port(),
            recv_timeout_ms: default_recv_timeout_ms(),
            sample_interval_ms: default_sample_interval_ms(),
            clear_store_on_start: default_clear_store_on_start(),
            rig: RigConfig::demo(),
        }
    }
}

impl Config {
    /// Convert to the runtime's session settings.
    ///
    /// # Errors
    ///
    /// Returns a message if `bind_addr` is not an IP address or the timing
    /// values are zero.
    pub fn to_session_config(&self) -> Result<SessionConfig, String> {
        let bind_ip: IpAddr = self
            .bind_addr
            .parse()
            .map_err(|e| format!("Invalid bind_addr '{}': {}", self.bind_addr, e))?;
        let session = SessionConfig {
            bind_ip,
            port: self.udp_port,
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            clear_store_on_start: self.clear_store_on_start,
            ..SessionConfig::default()
        };
        session.validate().map_err(|e| e.to_string())?;
        Ok(session)
    }
}

/// Return the path to `~/.mocap/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mocap").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.  Environment overrides are applied to a loaded config.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MOCAP_*` environment variable overrides to `cfg`.  Unparsable
/// values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `MOCAP_BIND_ADDR` | `bind_addr` |
/// | `MOCAP_UDP_PORT` | `udp_port` |
/// | `MOCAP_RECV_TIMEOUT_MS` | `recv_timeout_ms` |
/// | `MOCAP_SAMPLE_INTERVAL_MS` | `sample_interval_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MOCAP_BIND_ADDR")
        && v.parse::<IpAddr>().is_ok()
    {
        cfg.bind_addr = v;
    }
    if let Ok(v) = std::env::var("MOCAP_UDP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.udp_port = port;
    }
    if let Ok(v) = std::env::var("MOCAP_RECV_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.recv_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("MOCAP_SAMPLE_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.sample_interval_ms = ms;
    }
}

/// Save the config to a specific path, creating its directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
