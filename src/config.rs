//! Configuration management

use std::{env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mtls::MtlsConfig;
use crate::mtls::listener::{DEFAULT_HOST, DEFAULT_PLAIN_PORT, DEFAULT_TLS_PORT};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before `${VAR}` expansion.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// TLS configuration
    pub tls: MtlsConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // TLS_FRONTEND_TLS__KEY_STORE=... → tls.key_store
        figment = figment.merge(Env::prefixed("TLS_FRONTEND_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Port to bind: the configured one, else the default for the listener kind.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.server.port.unwrap_or(if self.tls.enabled {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        })
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!(path = %expanded, "Env file not found (skipped)");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!(path = %expanded, "Loaded env file"),
                Err(e) => tracing::warn!(path = %expanded, error = %e, "Failed to load env file"),
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in store paths and the passphrase.
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        self.tls.trust_store = expand_string(&re, &self.tls.trust_store);
        self.tls.key_store = expand_string(&re, &self.tls.key_store);
        let password = expand_string(&re, self.tls.key_store_password.expose());
        self.tls.key_store_password = crate::mtls::KeyStorePassword::new(password);

        Ok(())
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on; defaults to 8443 with TLS, 8080 without
    pub port: Option<u16>,
    /// How the client certificate reaches request handlers
    pub customizer: CustomizerKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            customizer: CustomizerKind::default(),
        }
    }
}

/// Request customizer selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomizerKind {
    /// Requests carry no client certificate
    #[default]
    None,
    /// Use the certificate presented in this server's own TLS handshake
    DirectTls,
    /// Use the certificate a reverse proxy forwarded in `X-ClientCert`
    ForwardedHeader,
}
