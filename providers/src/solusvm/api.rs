use async_trait::async_trait;
use cloug_common::Result;

/// Virtualization technology of the node group the adapter provisions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtType {
    OpenVz,
    Kvm,
    Xen,
}

impl VirtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtType::OpenVz => "openvz",
            VirtType::Kvm => "kvm",
            VirtType::Xen => "xen",
        }
    }

    /// Hardware virtualization exposes a VNC framebuffer; containers only a console.
    pub fn has_vnc(&self) -> bool {
        matches!(self, VirtType::Kvm | VirtType::Xen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCreate {
    pub virt_type: VirtType,
    pub node_group: String,
    pub hostname: String,
    pub template: String,
    pub ram_mb: u32,
    pub disk_gb: u32,
    pub cores: u32,
}

#[derive(Debug, Clone)]
pub struct CreatedVm {
    pub vm_id: u64,
    pub root_password: String,
}

#[derive(Debug, Clone, Default)]
pub struct VmInfo {
    pub state: String,
    /// Main address.
    pub ip: String,
    pub internal_ips: String,
    /// Every assigned address, comma separated.
    pub ips: String,
    /// `total,used,free,percent` in bytes.
    pub bandwidth: String,
}

#[derive(Debug, Clone)]
pub struct VncInfo {
    pub ip: String,
    pub port: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ConsoleInfo {
    pub ip: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

/// SolusVM admin API primitives used by the adapter.
#[async_trait]
pub trait SolusVmApi: Send + Sync {
    async fn vm_create(&self, request: &VmCreate) -> Result<CreatedVm>;
    async fn vm_delete(&self, vm_id: u64) -> Result<()>;
    async fn vm_info(&self, vm_id: u64) -> Result<VmInfo>;
    async fn vm_start(&self, vm_id: u64) -> Result<()>;
    async fn vm_stop(&self, vm_id: u64) -> Result<()>;
    async fn vm_reboot(&self, vm_id: u64) -> Result<()>;
    async fn vm_vnc(&self, vm_id: u64) -> Result<VncInfo>;
    async fn vm_console(&self, vm_id: u64) -> Result<ConsoleInfo>;
    async fn vm_tun_tap(&self, vm_id: u64, enable: bool) -> Result<()>;
    async fn vm_hostname(&self, vm_id: u64, hostname: &str) -> Result<()>;
    async fn vm_reimage(&self, vm_id: u64, template: &str) -> Result<()>;
    async fn vm_resize_disk(&self, vm_id: u64, disk_gb: u32) -> Result<()>;
    async fn vm_resize_memory(&self, vm_id: u64, memory_mb: u32) -> Result<()>;
    async fn vm_resize_cpu(&self, vm_id: u64, cores: u32) -> Result<()>;
    /// Assigns the next free address of the node group.
    async fn vm_add_address(&self, vm_id: u64) -> Result<()>;
    async fn vm_remove_address(&self, vm_id: u64, ip: &str) -> Result<()>;
}
