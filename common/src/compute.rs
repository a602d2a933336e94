use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::Display;

/// Instance state as reported by a provider.
///
/// `Online` and `Offline` are the two states every adapter normalizes to;
/// anything else is kept as the lowercased provider value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Other(String),
}

impl InstanceStatus {
    /// Normalizes a provider-reported state: case is folded, `online` and
    /// `offline` map to their variants, anything else is kept as `Other`.
    pub fn from_provider(status: &str) -> Self {
        InstanceStatus::from(status.to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Unknown => "",
            InstanceStatus::Online => "online",
            InstanceStatus::Offline => "offline",
            InstanceStatus::Other(status) => status,
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(status: String) -> Self {
        let status = status.to_lowercase();
        match status.as_str() {
            "" => InstanceStatus::Unknown,
            "online" => InstanceStatus::Online,
            "offline" => InstanceStatus::Offline,
            _ => InstanceStatus::Other(status),
        }
    }
}

impl From<InstanceStatus> for String {
    fn from(status: InstanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageType {
    #[default]
    Template,
    Iso,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageStatus {
    Available,
    Pending,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Architecture {
    Amd64,
    I386,
}

/// Compute size. As a match query, zero numeric fields mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    pub num_cores: u32,
    pub disk_gb: u32,
    pub memory_mb: u32,
    pub transfer_gb: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    #[serde(rename = "type")]
    pub image_type: ImageType,
    /// Disk format (qcow2, iso, raw). Required when creating from a URL.
    pub format: String,
    pub status: Option<ImageStatus>,
    pub public: bool,
    /// Bytes.
    pub size: i64,

    pub source_instance: String,
    pub source_url: String,

    pub distribution: String,
    pub version: String,
    pub architecture: Option<Architecture>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

/// Either a provider key handle (`id`) or raw key material (`key`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub id: String,
    pub label: String,
    pub key: String,
}

impl PublicKey {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.key.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub ip: String,
    pub private_ip: bool,
    pub can_dns: bool,
    pub hostname: String,
}

/// Invocation target of a custom instance action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(&self, value: &str) -> Result<()>;
}

/// Provider-specific side operation offered on an instance.
#[derive(Clone)]
pub struct InstanceAction {
    pub label: String,
    pub description: String,
    /// Allowed values mapped to their description. `None` accepts any value.
    pub options: Option<BTreeMap<String, String>>,
    pub handler: Arc<dyn ActionHandler>,
}

impl InstanceAction {
    pub async fn invoke(&self, value: &str) -> Result<()> {
        if let Some(options) = &self.options {
            if !options.contains_key(value) {
                return Err(crate::ComputeError::validation(format!(
                    "invalid value {:?} for action {}",
                    value, self.label
                )));
            }
        }
        self.handler.invoke(value).await
    }
}

impl std::fmt::Debug for InstanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceAction")
            .field("label", &self.label)
            .field("description", &self.description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    /// Empty until the provider assigns it; the only key for later operations.
    pub id: String,
    pub name: String,
    pub region: String,
    pub ip: String,
    pub private_ip: String,

    pub image: Image,
    pub flavor: Flavor,
    pub public_key: PublicKey,

    pub status: InstanceStatus,

    pub username: String,
    pub password: String,

    /// Transient token for fetching creation results (e.g. the root password).
    pub job_id: String,

    /// Bytes.
    pub bandwidth_used: i64,

    pub network_id: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,

    #[serde(skip)]
    pub actions: Vec<InstanceAction>,
}

impl Instance {
    pub fn action(&self, label: &str) -> Option<&InstanceAction> {
        self.actions.iter().find(|action| action.label == label)
    }
}
