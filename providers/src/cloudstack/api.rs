use async_trait::async_trait;
use cloug_common::Result;

#[derive(Debug, Clone, Default)]
pub struct Nic {
    pub addr: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloudStackVm {
    pub id: String,
    pub hostname: String,
    pub state: String,
    pub nics: Vec<Nic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    pub service_offering: String,
    pub disk_offering: String,
    pub template: String,
    pub network: String,
    pub name: String,
}

/// Result of an asynchronous deploy: the VM ID and the job tracking it.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub id: String,
    pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct ServiceOffering {
    pub id: String,
    pub name: String,
    pub cpu_number: u32,
    /// MB.
    pub memory: u32,
}

#[derive(Debug, Clone)]
pub struct DiskOffering {
    pub id: String,
    pub name: String,
    /// GB.
    pub disk_size: u32,
}

/// CloudStack API calls used by the adapter, scoped to one zone.
#[async_trait]
pub trait CloudStackApi: Send + Sync {
    async fn deploy_virtual_machine(&self, request: &DeployRequest) -> Result<Deployment>;
    async fn destroy_virtual_machine(&self, vm_id: &str, expunge: bool) -> Result<()>;
    async fn list_virtual_machines(&self) -> Result<Vec<CloudStackVm>>;
    async fn get_virtual_machine(&self, vm_id: &str) -> Result<CloudStackVm>;
    async fn start_virtual_machine(&self, vm_id: &str) -> Result<()>;
    async fn stop_virtual_machine(&self, vm_id: &str) -> Result<()>;
    async fn reboot_virtual_machine(&self, vm_id: &str) -> Result<()>;
    async fn list_service_offerings(&self) -> Result<Vec<ServiceOffering>>;
    async fn list_disk_offerings(&self) -> Result<Vec<DiskOffering>>;
}
