//! Configuration loading: a JSON file under `$PDISTCC_DIR` or
//! `~/.config/pdistcc/`, the same place and format the donor project's
//! own `config.py` looked for `client.json`/`server.json`.

use std::env;
use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use log::warn;
use serde_derive::Deserialize;

use compiler::Settings as CompilerSettings;
use sched::HostSpec;

fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var("PDISTCC_DIR") {
        return Some(PathBuf::from(dir));
    }
    ProjectDirs::from("", "", "pdistcc").map(|dirs| dirs.config_dir().to_path_buf())
}

fn load_json<T: for<'de> Deserialize<'de>>(filename: &str) -> Option<T> {
    let dir = config_dir()?;
    let path = dir.join(filename);
    let data = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// On-disk shape of `client.json`. `Default` supplies what a fresh
/// install gets with no config file at all: compile everything locally
/// (empty host list means "no remote worker configured").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub distcc_hosts: Vec<String>,
    pub gcc_compiler_dir: Option<PathBuf>,
    pub msvc_distcc_compat: bool,
    pub msvc_use_clang: bool,
    pub msvc_clang_path: String,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        let defaults = CompilerSettings::default();
        ClientConfig {
            distcc_hosts: Vec::new(),
            gcc_compiler_dir: defaults.gcc_compiler_dir,
            msvc_distcc_compat: defaults.msvc_distcc_compat,
            msvc_use_clang: defaults.msvc_use_clang,
            msvc_clang_path: defaults.msvc_clang_path,
        }
    }
}

impl ClientConfig {
    pub fn load() -> ClientConfig {
        load_json("client.json").unwrap_or_default()
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            gcc_compiler_dir: self.gcc_compiler_dir.clone(),
            msvc_distcc_compat: self.msvc_distcc_compat,
            msvc_use_clang: self.msvc_use_clang,
            msvc_clang_path: self.msvc_clang_path.clone(),
        }
    }

    /// `DISTCC_HOSTS` (space-separated) takes priority over the config
    /// file's `distcc_hosts`, matching §6.
    pub fn hosts(&self) -> Vec<HostSpec> {
        let raw: Vec<String> = match env::var("DISTCC_HOSTS") {
            Ok(s) => s.split_whitespace().map(str::to_owned).collect(),
            Err(_) => self.distcc_hosts.clone(),
        };
        raw.iter()
            .filter_map(|s| match s.parse() {
                Ok(h) => Some(h),
                Err(e) => {
                    warn!("ignoring invalid host spec {:?}: {}", s, e);
                    None
                }
            })
            .collect()
    }
}

/// On-disk shape of `server.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 3632,
        }
    }
}

impl ServerConfig {
    pub fn load() -> ServerConfig {
        load_json("server.json").unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert!(config.distcc_hosts.is_empty());
        assert!(config.msvc_clang_path == "clang-cl");
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3632);
    }

    #[test]
    fn test_hosts_parses_distcc_hosts_env() {
        env::set_var("DISTCC_HOSTS", "10.0.0.1:3632/10 10.0.0.2:3632/20");
        let config = ClientConfig::default();
        let hosts = config.hosts();
        env::remove_var("DISTCC_HOSTS");
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[1].weight, 20);
    }
}
