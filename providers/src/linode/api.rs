use async_trait::async_trait;
use cloug_common::Result;

#[derive(Debug, Clone)]
pub struct Kernel {
    pub id: u64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Datacenter {
    pub id: u64,
    pub abbreviation: String,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub id: u64,
    pub label: String,
    pub cores: u32,
    /// MB.
    pub ram: u32,
    /// GB.
    pub disk: u32,
    /// GB.
    pub bandwidth: u32,
}

#[derive(Debug, Clone)]
pub struct LinodeInfo {
    pub id: u64,
    pub label: String,
    pub plan_id: u64,
    /// MB.
    pub total_hd: u32,
    /// MB.
    pub total_ram: u32,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct LinodeIp {
    pub address: String,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct Disk {
    pub id: u64,
    pub disk_type: String,
}

#[derive(Debug, Clone)]
pub struct LinodeImage {
    pub id: u64,
    pub label: String,
    /// MB.
    pub min_size: i64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub id: u64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskSource {
    Distribution(u64),
    Image(u64),
    Swap,
}

#[derive(Debug, Clone)]
pub struct DiskSpec {
    pub label: String,
    pub source: DiskSource,
    pub size_mb: u32,
    /// Only used for template-backed disks.
    pub root_password: String,
}

/// Linode API primitives used by the adapter.
#[async_trait]
pub trait LinodeApi: Send + Sync {
    async fn list_kernels(&self) -> Result<Vec<Kernel>>;
    async fn list_datacenters(&self) -> Result<Vec<Datacenter>>;
    async fn list_plans(&self) -> Result<Vec<Plan>>;

    async fn create_linode(&self, datacenter_id: u64, plan_id: u64) -> Result<u64>;
    /// `skip_checks` deletes even when disks are still attached.
    async fn delete_linode(&self, linode_id: u64, skip_checks: bool) -> Result<()>;
    async fn list_linodes(&self) -> Result<Vec<LinodeInfo>>;
    async fn get_linode(&self, linode_id: u64) -> Result<LinodeInfo>;
    async fn list_ips(&self, linode_id: u64) -> Result<Vec<LinodeIp>>;

    async fn boot_linode(&self, linode_id: u64) -> Result<()>;
    async fn shutdown_linode(&self, linode_id: u64) -> Result<()>;
    async fn reboot_linode(&self, linode_id: u64) -> Result<()>;

    async fn create_disk(&self, linode_id: u64, disk: &DiskSpec) -> Result<u64>;
    async fn list_disks(&self, linode_id: u64) -> Result<Vec<Disk>>;
    async fn create_config(
        &self,
        linode_id: u64,
        kernel_id: u64,
        label: &str,
        disk_ids: &[u64],
    ) -> Result<u64>;

    /// Turns a disk into a reusable image, returning the image ID.
    async fn imagize_disk(&self, linode_id: u64, disk_id: u64, description: &str) -> Result<u64>;
    async fn list_images(&self) -> Result<Vec<LinodeImage>>;
    async fn get_image(&self, image_id: u64) -> Result<LinodeImage>;
    async fn delete_image(&self, image_id: u64) -> Result<()>;
    async fn list_distributions(&self) -> Result<Vec<Distribution>>;
}
