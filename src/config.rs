use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command line options for the server.
#[derive(Parser, Debug, Default)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Credential fields handed to the browser client by `/api/config/firebase`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// Base directory for the SQLite database and server secrets.
    pub data_dir: PathBuf,
    /// Single origin allowed by CORS.
    pub frontend_origin: String,
    /// Server-held OMDb key for the film proxy. Absent key fails proxy calls.
    pub omdb_api_key: Option<String>,
    /// Client credential fields, served verbatim.
    pub client: ClientConfig,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    cors: FileCors,
    #[serde(default)]
    catalog: FileCatalog,
    #[serde(default)]
    firebase: FileFirebase,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileCors {
    #[serde(default)]
    frontend_origin: Option<String>,
}

#[derive(Deserialize, Default)]
struct FileCatalog {
    #[serde(default)]
    omdb_api_key: Option<String>,
}

#[derive(Deserialize, Default)]
struct FileFirebase {
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    auth_domain: String,
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    storage_bucket: String,
    #[serde(default)]
    messaging_sender_id: String,
    #[serde(default)]
    app_id: String,
}

fn default_port() -> u16 {
    3000
}

fn default_logging() -> bool {
    true
}

fn default_frontend_origin() -> String {
    "http://localhost:5173".into()
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

fn env_or(field: &str, current: String) -> String {
    std::env::var(field).unwrap_or(current)
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // built-in defaults
        let mut port = default_port();
        let mut logging = default_logging();
        let mut frontend_origin = default_frontend_origin();
        let mut omdb_api_key: Option<String> = None;
        let mut client = ClientConfig::default();

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| {
                std::env::var("FICTION_FOLDER_CONFIG")
                    .ok()
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("config/fiction_folder.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            port = file_cfg.server.port;
            logging = file_cfg.logging.enabled;
            if let Some(origin) = file_cfg.cors.frontend_origin {
                frontend_origin = origin;
            }
            omdb_api_key = file_cfg.catalog.omdb_api_key;
            client = ClientConfig {
                api_key: file_cfg.firebase.api_key,
                auth_domain: file_cfg.firebase.auth_domain,
                project_id: file_cfg.firebase.project_id,
                storage_bucket: file_cfg.firebase.storage_bucket,
                messaging_sender_id: file_cfg.firebase.messaging_sender_id,
                app_id: file_cfg.firebase.app_id,
            };
        }

        // environment overrides
        if let Ok(p) = std::env::var("PORT") {
            if let Ok(p) = p.parse::<u16>() {
                port = p;
            }
        }
        if let Ok(l) = std::env::var("FICTION_FOLDER_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        frontend_origin = env_or("FRONTEND_URL", frontend_origin);
        if let Ok(key) = std::env::var("OMDB_API_KEY") {
            omdb_api_key = Some(key);
        }
        client.api_key = env_or("FIREBASE_API_KEY", client.api_key);
        client.auth_domain = env_or("FIREBASE_AUTH_DOMAIN", client.auth_domain);
        client.project_id = env_or("FIREBASE_PROJECT_ID", client.project_id);
        client.storage_bucket = env_or("FIREBASE_STORAGE_BUCKET", client.storage_bucket);
        client.messaging_sender_id =
            env_or("FIREBASE_MESSAGING_SENDER_ID", client.messaging_sender_id);
        client.app_id = env_or("FIREBASE_APP_ID", client.app_id);

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        // validate port range
        if !(1024..=65535).contains(&port) {
            anyhow::bail!("invalid_port");
        }

        // bind address precedence for host override
        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("BIND") {
            b
        } else {
            format!("127.0.0.1:{}", port)
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Ok(Self {
            bind,
            data_dir,
            frontend_origin,
            omdb_api_key,
            client,
            logging_enabled: logging,
        })
    }
}

/// Determine the default data directory for the server.
pub fn default_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/fiction_folder");
        p
    } else {
        PathBuf::from("./fiction_folder_data")
    }
}
