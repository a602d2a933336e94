use crate::digitalocean::DigitalOcean;
use crate::proxmox::Proxmox;
use anyhow::{bail, Context, Result};
use cloug_common::Provider;
use serde::Deserialize;
use std::path::Path;

/// Configuration of one HTTP-backed provider, tagged by `provider`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    Proxmox(ProxmoxConfig),
    DigitalOcean(DigitalOceanConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxmoxConfig {
    /// Base URL without the `/api2/json` suffix, e.g. `https://pve:8006`.
    #[serde(alias = "url")]
    pub api_url: String,
    /// Ticket authentication.
    pub username: Option<String>,
    pub password: Option<String>,
    /// API token authentication, preferred when both are given.
    pub api_token_id: Option<String>,
    pub api_token_secret: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_proxmox_storage")]
    pub storage: String,
    pub bridge: Option<String>,
}

/// How requests to the Proxmox API are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxmoxAuth {
    Ticket { username: String, password: String },
    Token { id: String, secret: String },
}

impl ProxmoxConfig {
    pub fn auth(&self) -> Result<ProxmoxAuth> {
        match (
            &self.api_token_id,
            &self.api_token_secret,
            &self.username,
            &self.password,
        ) {
            (Some(id), Some(secret), _, _) => Ok(ProxmoxAuth::Token {
                id: id.clone(),
                secret: secret.clone(),
            }),
            (_, _, Some(username), Some(password)) => Ok(ProxmoxAuth::Ticket {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => bail!("Proxmox config needs api_token_id/api_token_secret or username/password"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigitalOceanConfig {
    pub token: String,
    #[serde(default = "default_digitalocean_url")]
    pub api_url: String,
    #[serde(default = "default_digitalocean_region")]
    pub default_region: String,
}

impl ProviderConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Accepts the flat JSON object form, e.g. `{"provider": "digitalocean", "token": "..."}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse provider JSON config")
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            ProviderConfig::Proxmox(_) => "proxmox",
            ProviderConfig::DigitalOcean(_) => "digitalocean",
        }
    }
}

/// Builds the configured adapter. No request is sent until the first operation.
pub fn provider_from_config(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match config {
        ProviderConfig::Proxmox(cfg) => Box::new(Proxmox::new(cfg)?),
        ProviderConfig::DigitalOcean(cfg) => Box::new(DigitalOcean::new(cfg)?),
    };
    tracing::debug!("Configured {} provider", config.provider_name());
    Ok(provider)
}

fn default_proxmox_storage() -> String {
    "local".to_string()
}

fn default_digitalocean_url() -> String {
    "https://api.digitalocean.com".to_string()
}

fn default_digitalocean_region() -> String {
    "nyc3".to_string()
}
