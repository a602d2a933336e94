use async_trait::async_trait;
use cloug_common::Result;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: String,
    pub access_ipv4: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServerCreate {
    pub name: String,
    pub image_ref: String,
    pub flavor_ref: String,
    pub admin_pass: String,
    pub user_data: String,
    pub availability_zone: Option<String>,
    pub networks: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FloatingIp {
    pub ip: String,
    /// Server the address is bound to, if any.
    pub instance_id: Option<String>,
}

impl FloatingIp {
    pub fn is_free(&self) -> bool {
        self.instance_id.as_deref().map_or(true, str::is_empty)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlanceImage {
    pub id: String,
    pub name: String,
    pub status: String,
    pub visibility: String,
    pub size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub name: String,
    pub container_format: String,
    pub disk_format: String,
    pub copy_from: String,
}

#[derive(Debug, Clone, Default)]
pub struct NovaFlavor {
    pub id: String,
    pub name: String,
    /// MB.
    pub ram: u32,
    pub vcpus: u32,
    /// GB.
    pub disk: u32,
}

/// Compute, image and network calls used by the adapter.
#[async_trait]
pub trait OpenStackApi: Send + Sync {
    async fn create_server(&self, request: &ServerCreate) -> Result<Server>;
    async fn delete_server(&self, server_id: &str) -> Result<()>;
    async fn list_servers(&self) -> Result<Vec<Server>>;
    async fn get_server(&self, server_id: &str) -> Result<Server>;
    /// Addresses of a server keyed by network name.
    async fn list_server_addresses(&self, server_id: &str) -> Result<BTreeMap<String, Vec<String>>>;

    async fn start_server(&self, server_id: &str) -> Result<()>;
    async fn stop_server(&self, server_id: &str) -> Result<()>;
    async fn reboot_server(&self, server_id: &str, hard: bool) -> Result<()>;
    async fn vnc_console_url(&self, server_id: &str) -> Result<String>;
    async fn rename_server(&self, server_id: &str, name: &str) -> Result<()>;
    async fn rebuild_server(&self, server_id: &str, image_id: &str) -> Result<()>;
    /// Snapshots a server, returning the new image ID.
    async fn create_server_image(&self, server_id: &str, name: &str) -> Result<String>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>>;
    async fn associate_floating_ip(&self, server_id: &str, ip: &str) -> Result<()>;

    async fn upload_image(&self, upload: &ImageUpload) -> Result<GlanceImage>;
    async fn get_image(&self, image_id: &str) -> Result<GlanceImage>;
    async fn delete_image(&self, image_id: &str) -> Result<()>;
    async fn list_flavors(&self) -> Result<Vec<NovaFlavor>>;
}
