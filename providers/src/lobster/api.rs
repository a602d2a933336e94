use async_trait::async_trait;
use cloug_common::Result;

#[derive(Debug, Clone, Default)]
pub struct LobsterVm {
    pub id: u64,
    pub name: String,
    pub region: String,
    pub plan_id: u64,
    pub external_ip: String,
    pub private_ip: String,
}

#[derive(Debug, Clone, Default)]
pub struct VmDetails {
    pub status: String,
    /// Bytes.
    pub bandwidth_used: i64,
    /// Free-form credentials text, usually `username: X; password: Y`.
    pub login_details: String,
}

#[derive(Debug, Clone, Default)]
pub struct VmInfo {
    pub vm: LobsterVm,
    pub details: Option<VmDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmAction {
    Start,
    Stop,
    Reboot,
    Rename(String),
}

#[derive(Debug, Clone, Default)]
pub struct LobsterImage {
    pub id: u64,
    pub name: String,
    pub region: String,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImageDetails {
    pub status: String,
    pub size: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ImageInfo {
    pub image: LobsterImage,
    pub details: Option<ImageDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct LobsterAddress {
    pub ip: String,
    pub private_ip: bool,
    pub can_rdns: bool,
    pub hostname: String,
}

#[derive(Debug, Clone)]
pub struct LobsterPlan {
    pub id: u64,
    pub name: String,
    pub ram: u32,
    pub cpu: u32,
    pub storage: u32,
    pub bandwidth: u32,
}

/// Lobster panel API primitives used by the adapter.
#[async_trait]
pub trait LobsterApi: Send + Sync {
    async fn vm_create(&self, name: &str, plan_id: u64, image_id: u64) -> Result<u64>;
    async fn vm_delete(&self, vm_id: u64) -> Result<()>;
    async fn vm_list(&self) -> Result<Vec<LobsterVm>>;
    async fn vm_info(&self, vm_id: u64) -> Result<VmInfo>;
    async fn vm_action(&self, vm_id: u64, action: &VmAction) -> Result<()>;
    async fn vm_vnc(&self, vm_id: u64) -> Result<String>;
    async fn vm_reimage(&self, vm_id: u64, image_id: u64) -> Result<()>;
    async fn vm_resize(&self, vm_id: u64, plan_id: u64) -> Result<()>;
    async fn vm_snapshot(&self, vm_id: u64, name: &str) -> Result<u64>;

    async fn vm_addresses(&self, vm_id: u64) -> Result<Vec<LobsterAddress>>;
    async fn vm_address_add(&self, vm_id: u64) -> Result<()>;
    async fn vm_address_remove(&self, vm_id: u64, ip: &str, private_ip: bool) -> Result<()>;
    async fn vm_address_rdns(&self, vm_id: u64, ip: &str, hostname: &str) -> Result<()>;

    /// Downloads an image into `region`, returning its ID.
    async fn image_fetch(&self, region: &str, name: &str, url: &str, format: &str) -> Result<u64>;
    async fn image_list(&self) -> Result<Vec<LobsterImage>>;
    async fn image_info(&self, image_id: u64) -> Result<ImageInfo>;
    async fn image_delete(&self, image_id: u64) -> Result<()>;

    async fn plan_list(&self) -> Result<Vec<LobsterPlan>>;
}
