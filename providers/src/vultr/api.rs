use async_trait::async_trait;
use cloug_common::Result;

#[derive(Debug, Clone)]
pub struct VultrOs {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct VultrRegion {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct VultrServer {
    pub id: String,
    pub name: String,
    pub region_id: u64,
    pub plan_id: u64,
    pub main_ip: String,
    pub internal_ip: String,
    pub default_password: String,
    /// GB transferred this billing cycle.
    pub current_bandwidth_gb: f64,
    pub status: String,
    pub power_status: String,
    /// Empty until the console is ready.
    pub kvm_url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerRequest {
    pub name: String,
    pub region_id: u64,
    pub plan_id: u64,
    pub os_id: u64,
    pub iso_id: Option<u64>,
    pub snapshot_id: Option<String>,
    pub private_networking: bool,
    pub ipv6: bool,
}

#[derive(Debug, Clone)]
pub struct VultrSnapshot {
    pub id: String,
    pub description: String,
    pub size: i64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct VultrPlan {
    pub id: u64,
    pub name: String,
    pub ram: u32,
    pub vcpus: u32,
    pub disk: u32,
}

/// Vultr API primitives used by the adapter.
#[async_trait]
pub trait VultrApi: Send + Sync {
    async fn list_os(&self) -> Result<Vec<VultrOs>>;
    async fn list_regions(&self) -> Result<Vec<VultrRegion>>;
    async fn list_plans(&self) -> Result<Vec<VultrPlan>>;

    /// Returns the new server's ID.
    async fn create_server(&self, request: &ServerRequest) -> Result<String>;
    async fn delete_server(&self, server_id: &str) -> Result<()>;
    async fn list_servers(&self) -> Result<Vec<VultrServer>>;
    async fn get_server(&self, server_id: &str) -> Result<VultrServer>;
    async fn start_server(&self, server_id: &str) -> Result<()>;
    async fn halt_server(&self, server_id: &str) -> Result<()>;
    async fn reboot_server(&self, server_id: &str) -> Result<()>;

    /// Returns the new snapshot's ID.
    async fn create_snapshot(&self, server_id: &str, description: &str) -> Result<String>;
    async fn list_snapshots(&self) -> Result<Vec<VultrSnapshot>>;
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;
}
