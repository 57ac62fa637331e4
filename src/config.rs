//! Configuration the sinks read.
//!
//! Resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `LOGSRVD_RELAY_DIR`, `LOGSRVD_IOLOG_UID`,
//!    `LOGSRVD_IOLOG_GID`
//! 2. **Config file** — path passed to [`LogConfig::load`], or `logsrvd.toml`
//!    in the current directory
//! 3. **Compiled defaults** — see each field's default value below
//!
//! Each field is read-only to the core once loaded; a host may reload and
//! swap in a fresh `LogConfig` between sessions without restarting one in
//! progress.
//!
//! ```toml
//! relay_dir = "/var/log/sudo-io/relay"
//! iolog_mode = 0o600
//! iolog_dir_mode = 0o700
//! iolog_uid = 0
//! iolog_gid = 0
//! server_timeout = 30
//! message_size_max = 1048576
//! random_drop_percent = 0.0
//! ```

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Root directory containing `incoming/` and `outgoing/` journal spools.
    #[serde(default = "default_relay_dir")]
    pub relay_dir: String,
    /// Root directory under which the local sink generates per-session
    /// `NN/NN/NN` log-id directories. Not one of the wire-protocol config
    /// keys the journal/local sinks otherwise consume verbatim, but a local
    /// I/O log needs a root somewhere to be generated under.
    #[serde(default = "default_iolog_dir")]
    pub iolog_dir: String,
    /// Mode bits for newly created per-stream I/O log data files.
    #[serde(default = "default_iolog_mode")]
    pub iolog_mode: u32,
    /// Mode bits for newly created I/O log directories.
    #[serde(default = "default_iolog_dir_mode")]
    pub iolog_dir_mode: u32,
    /// Owning uid for I/O log directories; also the uid the NFS-root retry
    /// swaps the effective uid to.
    #[serde(default)]
    pub iolog_uid: u32,
    /// Owning gid for I/O log directories.
    #[serde(default)]
    pub iolog_gid: u32,
    /// Seconds a host should wait for the client to become writable after
    /// queuing a `LogId` reply before tearing the session down. The core
    /// itself has no timeouts; this value is read by the host event loop.
    #[serde(default = "default_server_timeout")]
    pub server_timeout: u64,
    /// Maximum accepted frame length, in bytes, for a single wire message.
    #[serde(default = "default_message_size_max")]
    pub message_size_max: u32,
    /// Probability in `[0, 1]` that a successful `iobuf` call is made to
    /// fail anyway, for exercising client-side restart logic. Parsed from a
    /// percentage via [`LogConfig::set_random_drop_percent`].
    #[serde(default)]
    pub random_drop_percent: f64,
}

fn default_relay_dir() -> String {
    "/var/log/sudo-io/relay".to_string()
}
fn default_iolog_dir() -> String {
    "/var/log/sudo-io".to_string()
}
fn default_iolog_mode() -> u32 {
    0o600
}
fn default_iolog_dir_mode() -> u32 {
    0o700
}
fn default_server_timeout() -> u64 {
    30
}
fn default_message_size_max() -> u32 {
    1024 * 1024
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            relay_dir: default_relay_dir(),
            iolog_dir: default_iolog_dir(),
            iolog_mode: default_iolog_mode(),
            iolog_dir_mode: default_iolog_dir_mode(),
            iolog_uid: 0,
            iolog_gid: 0,
            server_timeout: default_server_timeout(),
            message_size_max: default_message_size_max(),
            random_drop_percent: 0.0,
        }
    }
}

impl LogConfig {
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("failed to read config file {p}: {e}"));
            toml::from_str(&content).unwrap_or_else(|e| panic!("failed to parse config file {p}: {e}"))
        } else if Path::new("logsrvd.toml").exists() {
            let content =
                std::fs::read_to_string("logsrvd.toml").expect("failed to read logsrvd.toml");
            toml::from_str(&content).expect("failed to parse logsrvd.toml")
        } else {
            LogConfig::default()
        };

        if let Ok(dir) = std::env::var("LOGSRVD_RELAY_DIR") {
            config.relay_dir = dir;
        }
        if let Ok(uid) = std::env::var("LOGSRVD_IOLOG_UID") {
            if let Ok(uid) = uid.parse() {
                config.iolog_uid = uid;
            }
        }
        if let Ok(gid) = std::env::var("LOGSRVD_IOLOG_GID") {
            if let Ok(gid) = gid.parse() {
                config.iolog_gid = gid;
            }
        }

        config
    }

    /// Parse a percentage string (e.g. `"5.0"` for 5%) into the stored
    /// `[0, 1]` probability, matching `set_random_drop`'s `strtod` + `/100`.
    pub fn set_random_drop_percent(&mut self, pct: &str) -> Result<(), std::num::ParseFloatError> {
        self.random_drop_percent = pct.parse::<f64>()? / 100.0;
        Ok(())
    }
}
