use serde::{Deserialize, Serialize};
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins
    pub cors_origins: Option<String>,

    /// Base URL of the project store service
    pub project_store_url: Option<String>,

    /// Base URL of the remote execution service
    pub exec_service_url: Option<String>,

    /// Quiet period before a file tree snapshot is persisted
    #[serde(default = "default_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Interpreter binary for JS-family run requests
    #[serde(default = "default_node_bin")]
    pub node_bin: String,

    /// Interpreter binary for Python-family run requests
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: None,
            project_store_url: None,
            exec_service_url: None,
            persist_debounce_ms: default_debounce_ms(),
            node_bin: default_node_bin(),
            python_bin: default_python_bin(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_node_bin() -> String {
    "node".to_string()
}

fn default_python_bin() -> String {
    "python3".to_string()
}
