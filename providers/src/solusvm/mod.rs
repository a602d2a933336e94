//! SolusVM adapter. Provisions from templates on one node group with a
//! fixed virtualization type; there is no catalog, so flavors are taken
//! as literal resource sizes.

mod api;

pub use api::{ConsoleInfo, CreatedVm, SolusVmApi, VirtType, VmCreate, VmInfo, VncInfo};

use async_trait::async_trait;
use cloug_common::id_codec::{decode_address_id, encode_address_id, parse_numeric_id};
use cloug_common::utils::is_private_ip;
use cloug_common::{
    ActionHandler, Address, AddressService, ComputeError, ComputeService, Flavor, Image, Instance,
    InstanceAction, InstanceStatus, Provider, ReimageService, RenameService, ResizeService, Result,
    ResultExt, VncService,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_NAME: &str = "cloug";
const DEFAULT_RAM_MB: u32 = 512;
const DEFAULT_DISK_GB: u32 = 10;
const DEFAULT_CORES: u32 = 1;

pub struct SolusVm {
    api: Arc<dyn SolusVmApi>,
    virt_type: VirtType,
    node_group: String,
}

/// Toggles TUN/TAP on an OpenVZ container.
struct TunTap {
    api: Arc<dyn SolusVmApi>,
    vm_id: u64,
}

#[async_trait]
impl ActionHandler for TunTap {
    async fn invoke(&self, value: &str) -> Result<()> {
        self.api.vm_tun_tap(self.vm_id, value == "enable").await
    }
}

fn vm_id(instance_id: &str) -> Result<u64> {
    parse_numeric_id(instance_id).context("invalid instance ID")
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

impl SolusVm {
    pub fn new(api: Arc<dyn SolusVmApi>, virt_type: VirtType, node_group: impl Into<String>) -> Self {
        Self {
            api,
            virt_type,
            node_group: node_group.into(),
        }
    }

    fn to_instance(&self, vm_id: u64, info: &VmInfo) -> Instance {
        let mut instance = Instance {
            id: vm_id.to_string(),
            ip: info.ip.clone(),
            private_ip: info.internal_ips.clone(),
            status: InstanceStatus::from_provider(&info.state),
            bandwidth_used: info
                .bandwidth
                .split(',')
                .nth(1)
                .and_then(|used| used.trim().parse().ok())
                .unwrap_or_default(),
            ..Default::default()
        };
        if self.virt_type == VirtType::OpenVz {
            instance.actions.push(InstanceAction {
                label: "TUN/TAP".to_string(),
                description: "Enable or disable TUN/TAP.".to_string(),
                options: Some(BTreeMap::from([
                    ("enable".to_string(), "On".to_string()),
                    ("disable".to_string(), "Off".to_string()),
                ])),
                handler: Arc::new(TunTap {
                    api: self.api.clone(),
                    vm_id,
                }),
            });
        }
        instance
    }
}

#[async_trait]
impl ComputeService for SolusVm {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        if instance.image.id.is_empty() {
            return Err(ComputeError::validation("missing image ID (template name)"));
        }
        let request = VmCreate {
            virt_type: self.virt_type,
            node_group: self.node_group.clone(),
            hostname: if instance.name.is_empty() {
                DEFAULT_NAME.to_string()
            } else {
                instance.name.clone()
            },
            template: instance.image.id.clone(),
            ram_mb: or_default(instance.flavor.memory_mb, DEFAULT_RAM_MB),
            disk_gb: or_default(instance.flavor.disk_gb, DEFAULT_DISK_GB),
            cores: or_default(instance.flavor.num_cores, DEFAULT_CORES),
        };
        tracing::info!(
            "Creating {} VM {} from template {}",
            request.virt_type.as_str(),
            request.hostname,
            request.template
        );
        let created = self.api.vm_create(&request).await?;
        Ok(Instance {
            id: created.vm_id.to_string(),
            name: request.hostname,
            password: created.root_password,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_delete(vm_id(instance_id)?).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        Err(ComputeError::unsupported("listing SolusVM instances"))
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let id = vm_id(instance_id)?;
        let info = self.api.vm_info(id).await?;
        Ok(self.to_instance(id, &info))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_start(vm_id(instance_id)?).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_stop(vm_id(instance_id)?).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_reboot(vm_id(instance_id)?).await
    }
}

#[async_trait]
impl VncService for SolusVm {
    /// VNC for KVM and Xen guests, an SSH console URL for containers.
    async fn get_vnc(&self, instance_id: &str) -> Result<String> {
        let id = vm_id(instance_id)?;
        if self.virt_type.has_vnc() {
            let vnc = self.api.vm_vnc(id).await?;
            Ok(format!(
                "vnc://{}:{}?password={}",
                vnc.ip,
                vnc.port,
                urlencoding::encode(&vnc.password)
            ))
        } else {
            let console = self.api.vm_console(id).await?;
            Ok(format!(
                "ssh://{}:{}@{}:{}",
                console.username,
                urlencoding::encode(&console.password),
                console.ip,
                console.port
            ))
        }
    }
}

#[async_trait]
impl RenameService for SolusVm {
    async fn rename_instance(&self, instance_id: &str, name: &str) -> Result<()> {
        self.api.vm_hostname(vm_id(instance_id)?, name).await
    }
}

#[async_trait]
impl ReimageService for SolusVm {
    async fn reimage_instance(&self, instance_id: &str, image: &Image) -> Result<()> {
        let id = vm_id(instance_id)?;
        if image.id.is_empty() {
            return Err(ComputeError::validation("missing image ID (template name)"));
        }
        self.api.vm_reimage(id, &image.id).await
    }
}

#[async_trait]
impl ResizeService for SolusVm {
    /// Applies each non-zero dimension in turn, disk first as it is the
    /// one most likely to be refused.
    async fn resize_instance(&self, instance_id: &str, flavor: &Flavor) -> Result<()> {
        let id = vm_id(instance_id)?;
        if flavor.disk_gb != 0 {
            self.api.vm_resize_disk(id, flavor.disk_gb).await?;
        }
        if flavor.memory_mb != 0 {
            self.api.vm_resize_memory(id, flavor.memory_mb).await?;
        }
        if flavor.num_cores != 0 {
            self.api.vm_resize_cpu(id, flavor.num_cores).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AddressService for SolusVm {
    async fn list_instance_addresses(&self, instance_id: &str) -> Result<Vec<Address>> {
        let info = self.api.vm_info(vm_id(instance_id)?).await?;
        Ok(info
            .ips
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(|ip| Address {
                id: encode_address_id(instance_id, ip),
                ip: ip.to_string(),
                private_ip: is_private_ip(ip),
                ..Default::default()
            })
            .collect())
    }

    /// The panel picks the address; only the instance is significant.
    async fn add_address_to_instance(&self, instance_id: &str, _address: &Address) -> Result<()> {
        self.api.vm_add_address(vm_id(instance_id)?).await
    }

    async fn remove_address_from_instance(&self, instance_id: &str, address_id: &str) -> Result<()> {
        let id = vm_id(instance_id)?;
        decode_address_id(address_id)?;
        let addresses = self
            .list_instance_addresses(instance_id)
            .await
            .context("failed to list instance addresses")?;
        let address = addresses
            .iter()
            .find(|a| a.id == address_id)
            .ok_or_else(|| {
                ComputeError::not_found("instance does not have the specified address")
            })?;
        self.api.vm_remove_address(id, &address.ip).await
    }

    async fn set_address_hostname(&self, _address_id: &str, _hostname: &str) -> Result<()> {
        Err(ComputeError::unsupported("setting SolusVM reverse DNS"))
    }
}

impl Provider for SolusVm {
    fn name(&self) -> &str {
        "solusvm"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
    }

    fn vnc(&self) -> Option<&dyn VncService> {
        Some(self)
    }

    fn rename(&self) -> Option<&dyn RenameService> {
        Some(self)
    }

    fn reimage(&self) -> Option<&dyn ReimageService> {
        Some(self)
    }

    fn resize(&self) -> Option<&dyn ResizeService> {
        Some(self)
    }

    fn addresses(&self) -> Option<&dyn AddressService> {
        Some(self)
    }
}
