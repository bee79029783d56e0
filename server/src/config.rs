use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pairchat 1:1 chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "pairchat-server", version, about = "Pairchat realtime chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PAIRCHAT_PORT", default_value = "8001")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PAIRCHAT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pairchat.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PAIRCHAT_JSON_LOGS")]
    pub json_logs: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long, env = "PAIRCHAT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "PAIRCHAT_TOKEN_TTL_MINUTES", default_value = "30")]
    pub token_ttl_minutes: i64,

    /// Allowed CORS origins (loaded from TOML; CLI parse leaves this
    /// unset so it never masks the file value in the figment merge)
    #[arg(skip)]
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8001,
            bind_address: "0.0.0.0".to_string(),
            config: "./pairchat.toml".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            token_ttl_minutes: 30,
            allowed_origins: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PAIRCHAT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PAIRCHAT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    /// Configured CORS origins, defaulting to the local dev frontend.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .clone()
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()])
    }
}
