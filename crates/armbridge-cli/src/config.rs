//! Configuration – reads/writes `~/.armbridge/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use armbridge_calibration::{DEFAULT_UNIT_SCALE, DEFAULT_WORK_SURFACE_HEIGHT, PipelineConfig};
use armbridge_kinematics::SolverConfig;
use armbridge_motion::{DispatcherConfig, TcpControllerLink};
use armbridge_types::{ArmError, FailurePolicy, RowPolicy};

/// Persisted configuration stored in `~/.armbridge/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Interchange store (SQLite file).
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default = "default_controller_host")]
    pub controller_host: String,

    #[serde(default = "default_controller_port")]
    pub controller_port: u16,

    /// Speed appended to every motion command.
    #[serde(default = "default_speed")]
    pub speed: u32,

    #[serde(default = "default_command_delay_secs")]
    pub command_delay_secs: f64,

    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: f64,

    /// Applies to both send and receive.
    #[serde(default = "default_timeout_secs")]
    pub io_timeout_secs: f64,

    /// Read one response frame after each command.
    #[serde(default = "default_await_response")]
    pub await_response: bool,

    #[serde(default = "default_joint_count")]
    pub joint_count: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Fixed physical Z of the work surface, in metres.
    #[serde(default = "default_work_surface_height")]
    pub work_surface_height: f64,

    #[serde(default = "default_unit_scale")]
    pub unit_scale: f64,

    #[serde(default)]
    pub row_policy: RowPolicy,

    #[serde(default)]
    pub solver: SolverConfig,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("armbridge.db")
}
fn default_controller_host() -> String {
    "192.168.1.159".to_string()
}
fn default_controller_port() -> u16 {
    5001
}
fn default_speed() -> u32 {
    500
}
fn default_command_delay_secs() -> f64 {
    2.0
}
fn default_timeout_secs() -> f64 {
    5.0
}
fn default_await_response() -> bool {
    true
}
fn default_joint_count() -> usize {
    7
}
fn default_work_surface_height() -> f64 {
    DEFAULT_WORK_SURFACE_HEIGHT
}
fn default_unit_scale() -> f64 {
    DEFAULT_UNIT_SCALE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            controller_host: default_controller_host(),
            controller_port: default_controller_port(),
            speed: default_speed(),
            command_delay_secs: default_command_delay_secs(),
            connect_timeout_secs: default_timeout_secs(),
            io_timeout_secs: default_timeout_secs(),
            await_response: default_await_response(),
            joint_count: default_joint_count(),
            failure_policy: FailurePolicy::default(),
            work_surface_height: default_work_surface_height(),
            unit_scale: default_unit_scale(),
            row_policy: RowPolicy::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_surface_height: self.work_surface_height,
            unit_scale: self.unit_scale,
            row_policy: self.row_policy,
        }
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig, ArmError> {
        if self.joint_count == 0 {
            return Err(ArmError::Config("joint_count must be at least 1".to_string()));
        }
        Ok(DispatcherConfig {
            speed: self.speed,
            command_delay: seconds("command_delay_secs", self.command_delay_secs)?,
            joint_count: self.joint_count,
            failure_policy: self.failure_policy,
        })
    }

    pub fn controller_link(&self) -> Result<TcpControllerLink, ArmError> {
        Ok(TcpControllerLink::new(
            self.controller_host.clone(),
            self.controller_port,
            seconds("connect_timeout_secs", self.connect_timeout_secs)?,
            seconds("io_timeout_secs", self.io_timeout_secs)?,
        )?
        .with_await_response(self.await_response))
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ArmError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ArmError::Config(format!("invalid {field} = {value}: {e}")))
}

/// Return the path to `~/.armbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".armbridge").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
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

/// Load `path`, falling back to defaults (plus env overrides) when absent.
pub fn load_or_default(path: &Path) -> Result<Config, String> {
    Ok(load_from(path)?.unwrap_or_else(|| {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

/// Apply `ARMBRIDGE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ARMBRIDGE_STORE` | `store_path` |
/// | `ARMBRIDGE_CONTROLLER_HOST` | `controller_host` |
/// | `ARMBRIDGE_CONTROLLER_PORT` | `controller_port` |
/// | `ARMBRIDGE_SPEED` | `speed` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ARMBRIDGE_STORE") {
        cfg.store_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("ARMBRIDGE_CONTROLLER_HOST") {
        cfg.controller_host = v;
    }
    if let Ok(v) = std::env::var("ARMBRIDGE_CONTROLLER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.controller_port = port;
    }
    if let Ok(v) = std::env::var("ARMBRIDGE_SPEED")
        && let Ok(speed) = v.parse::<u32>()
    {
        cfg.speed = speed;
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
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
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.speed, 500);
        assert_eq!(loaded.store_path, PathBuf::from("armbridge.db"));
        assert_eq!(loaded.joint_count, 7);
        assert_eq!(loaded.failure_policy, FailurePolicy::ContinueOnError);
        assert_eq!(loaded.solver, SolverConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "work_surface_height = 0.1\nfailure_policy = \"abort\"\n\n[solver]\nkind = \"http\"\nurl = \"http://ik.local/solve\"\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.work_surface_height, 0.1);
        assert_eq!(cfg.failure_policy, FailurePolicy::AbortOnFirstFailure);
        assert_eq!(cfg.command_delay_secs, 2.0);
        assert_eq!(cfg.row_policy, RowPolicy::Lenient);
        assert_eq!(
            cfg.solver,
            SolverConfig::Http { url: "http://ik.local/solve".to_string(), timeout_secs: 30.0 }
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "speed = \"fast\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_armbridge_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".armbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_controller() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("ARMBRIDGE_CONTROLLER_HOST", "arm.local");
            std::env::set_var("ARMBRIDGE_CONTROLLER_PORT", "6001");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.controller_host, "arm.local");
        assert_eq!(cfg.controller_port, 6001);
        unsafe {
            std::env::remove_var("ARMBRIDGE_CONTROLLER_HOST");
            std::env::remove_var("ARMBRIDGE_CONTROLLER_PORT");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_speed() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("ARMBRIDGE_SPEED", "very-fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.speed, 500);
        unsafe { std::env::remove_var("ARMBRIDGE_SPEED") };
    }

    #[test]
    fn dispatcher_config_converts_delay() {
        let cfg = Config { command_delay_secs: 0.25, ..Config::default() };
        let dc = cfg.dispatcher_config().unwrap();
        assert_eq!(dc.command_delay, Duration::from_millis(250));
        assert_eq!(dc.speed, 500);
    }

    #[test]
    fn negative_delay_is_config_error() {
        let cfg = Config { command_delay_secs: -1.0, ..Config::default() };
        assert!(matches!(cfg.dispatcher_config(), Err(ArmError::Config(_))));
    }

    #[test]
    fn zero_joint_count_is_config_error() {
        let cfg = Config { joint_count: 0, ..Config::default() };
        assert!(matches!(cfg.dispatcher_config(), Err(ArmError::Config(_))));
    }

    #[test]
    fn zero_io_timeout_is_config_error() {
        let cfg = Config { io_timeout_secs: 0.0, ..Config::default() };
        assert!(matches!(cfg.controller_link(), Err(ArmError::Config(_))));
    }
}
