//! Packing of addressing context into the single opaque IDs callers hold.

use crate::error::{ComputeError, Result};
use std::str::FromStr;
use strum::{Display, EnumString};

/// `region:id`.
pub fn encode_region_id(region: &str, id: &str) -> String {
    format!("{}:{}", region, id)
}

/// Splits `region:id`. A bare ID (no separator) decodes to `default_region`
/// so IDs stored without a region keep working.
pub fn decode_region_id(encoded: &str, default_region: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = encoded.split(':').collect();
    match parts.as_slice() {
        [id] if !id.is_empty() => Ok((default_region.to_string(), id.to_string())),
        [region, id] if !region.is_empty() && !id.is_empty() => {
            Ok((region.to_string(), id.to_string()))
        }
        _ => Err(ComputeError::invalid_id(format!(
            "expected region:id, got {:?}",
            encoded
        ))),
    }
}

/// `node/vmid`.
pub fn encode_node_id(node: &str, vmid: u32) -> String {
    format!("{}/{}", node, vmid)
}

pub fn decode_node_id(encoded: &str) -> Result<(String, u32)> {
    let parts: Vec<&str> = encoded.split('/').collect();
    let [node, vmid] = parts.as_slice() else {
        return Err(ComputeError::invalid_id(format!(
            "expected node/vmid, got {:?}",
            encoded
        )));
    };
    if node.is_empty() {
        return Err(ComputeError::invalid_id(format!(
            "missing node in {:?}",
            encoded
        )));
    }
    Ok((node.to_string(), parse_numeric_id(vmid)?))
}

/// `instanceID:ip`. IPv6 addresses keep their colons since only the first
/// separator splits.
pub fn encode_address_id(instance_id: &str, ip: &str) -> String {
    format!("{}:{}", instance_id, ip)
}

pub fn decode_address_id(encoded: &str) -> Result<(String, String)> {
    match encoded.split_once(':') {
        Some((instance_id, ip)) if !instance_id.is_empty() && !ip.is_empty() => {
            Ok((instance_id.to_string(), ip.to_string()))
        }
        _ => Err(ComputeError::invalid_id(format!(
            "expected instance:ip, got {:?}",
            encoded
        ))),
    }
}

pub fn parse_numeric_id<T: FromStr>(id: &str) -> Result<T> {
    id.trim()
        .parse()
        .map_err(|_| ComputeError::invalid_id(format!("{:?} is not a numeric ID", id)))
}

/// Sub-namespaces selected by an image ID prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ImageNamespace {
    Snapshot,
    Distribution,
    Image,
    Os,
    Iso,
}

/// An image ID of the form `<namespace>:<value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedId {
    pub namespace: ImageNamespace,
    pub value: String,
}

impl NamespacedId {
    pub fn new(namespace: ImageNamespace, value: impl Into<String>) -> Self {
        Self {
            namespace,
            value: value.into(),
        }
    }

    /// Parses `id`, accepting only the namespaces the adapter serves.
    pub fn parse(id: &str, allowed: &[ImageNamespace]) -> Result<Self> {
        let Some((prefix, value)) = id.split_once(':') else {
            return Err(ComputeError::invalid_id(format!(
                "image ID {:?} has no namespace prefix",
                id
            )));
        };
        let namespace = ImageNamespace::from_str(prefix)
            .ok()
            .filter(|namespace| allowed.contains(namespace))
            .ok_or_else(|| {
                ComputeError::invalid_id(format!("unsupported image namespace in {:?}", id))
            })?;
        if value.is_empty() {
            return Err(ComputeError::invalid_id(format!(
                "image ID {:?} has an empty value",
                id
            )));
        }
        Ok(Self::new(namespace, value))
    }

    pub fn numeric<T: FromStr>(&self) -> Result<T> {
        parse_numeric_id(&self.value)
    }
}

impl std::fmt::Display for NamespacedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.value)
    }
}
