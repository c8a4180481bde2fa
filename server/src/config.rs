use config::{Config, File};
use serde::Deserialize;
use std::{env, error::Error, path::{Path, PathBuf}};

/// Configuration for the relay server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number for the TCP listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between heartbeat PING sweeps
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_secs() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl ServerConfig {
    /// Load the server configuration. An explicitly given file must exist;
    /// otherwise `Config.toml` in the working directory is used when present,
    /// and built-in defaults apply when it is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let path: Option<PathBuf> = match explicit {
            Some(p) => {
                if !p.exists() {
                    return Err(format!("configuration file not found: {}", p.display()).into());
                }
                Some(p.to_path_buf())
            }
            None => {
                let candidate = env::current_dir()?.join("Config.toml");
                candidate.exists().then_some(candidate)
            }
        };

        let Some(path) = path else {
            return Ok(ServerConfig::default());
        };

        let file = File::with_name(path.to_str().ok_or("non-UTF8 config path")?);
        let cfg = Config::builder().add_source(file).build()?;
        Ok(cfg.try_deserialize::<ServerConfig>()?)
    }

    /// Get the listener address as a string
    pub fn get_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
