//! CloudStack adapter. A flavor is a pair of offerings encoded as
//! `serviceOffering/diskOffering`; deploys are asynchronous and hand back
//! the job ID with the instance.

mod api;

pub use api::{
    CloudStackApi, CloudStackVm, DeployRequest, Deployment, DiskOffering, Nic, ServiceOffering,
};

use async_trait::async_trait;
use cloug_common::utils::pick_addresses;
use cloug_common::{
    get_matching_flavor_id, ComputeError, ComputeService, Flavor, FlavorService, Instance,
    InstanceStatus, Provider, Result,
};
use std::sync::Arc;

const DEFAULT_CORES: u32 = 1;
const DEFAULT_RAM_MB: u32 = 512;
const DEFAULT_DISK_GB: u32 = 10;

pub struct CloudStack {
    api: Arc<dyn CloudStackApi>,
    network_id: String,
}

fn map_status(state: &str) -> InstanceStatus {
    match state {
        "Running" => InstanceStatus::Online,
        "Stopped" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn map_vm(vm: &CloudStackVm) -> Instance {
    let (ip, private_ip) = pick_addresses(vm.nics.iter().map(|nic| nic.addr.as_str()));
    Instance {
        id: vm.id.clone(),
        name: vm.hostname.clone(),
        status: map_status(&vm.state),
        ip,
        private_ip,
        ..Default::default()
    }
}

fn split_flavor_id(flavor_id: &str) -> Result<(&str, &str)> {
    match flavor_id.split_once('/') {
        Some((service, disk)) if !service.is_empty() && !disk.is_empty() && !disk.contains('/') => {
            Ok((service, disk))
        }
        _ => Err(ComputeError::invalid_id(format!(
            "invalid service / disk offering: {}",
            flavor_id
        ))),
    }
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

impl CloudStack {
    pub fn new(api: Arc<dyn CloudStackApi>) -> Self {
        Self {
            api,
            network_id: String::new(),
        }
    }

    /// Network used when the instance does not name one.
    pub fn with_network(mut self, network_id: impl Into<String>) -> Self {
        self.network_id = network_id.into();
        self
    }
}

#[async_trait]
impl ComputeService for CloudStack {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        if instance.image.id.is_empty() {
            return Err(ComputeError::validation("instance image ID must be set"));
        }
        let flavor_id = get_matching_flavor_id(self, &instance.flavor).await?;
        let (service_offering, disk_offering) = split_flavor_id(&flavor_id)?;

        let request = DeployRequest {
            service_offering: service_offering.to_string(),
            disk_offering: disk_offering.to_string(),
            template: instance.image.id.clone(),
            network: if instance.network_id.is_empty() {
                self.network_id.clone()
            } else {
                instance.network_id.clone()
            },
            name: instance.name.clone(),
        };
        let deployment = self.api.deploy_virtual_machine(&request).await?;
        tracing::info!(
            "Deploying virtual machine {} (job {})",
            deployment.id,
            deployment.job_id
        );
        Ok(Instance {
            id: deployment.id,
            name: instance.name.clone(),
            job_id: deployment.job_id,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.api.destroy_virtual_machine(instance_id, true).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let vms = self.api.list_virtual_machines().await?;
        Ok(vms.iter().map(map_vm).collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let vm = self.api.get_virtual_machine(instance_id).await?;
        Ok(map_vm(&vm))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.start_virtual_machine(instance_id).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.stop_virtual_machine(instance_id).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.reboot_virtual_machine(instance_id).await
    }
}

#[async_trait]
impl FlavorService for CloudStack {
    /// Offerings only combine into flavors on demand.
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        Err(ComputeError::unsupported("listing CloudStack flavors"))
    }

    /// Unset dimensions fall back to 1 core, 512 MB and 10 GB. Returns an
    /// empty ID when either offering has no exact match.
    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let cores = or_default(flavor.num_cores, DEFAULT_CORES);
        let memory = or_default(flavor.memory_mb, DEFAULT_RAM_MB);
        let disk = or_default(flavor.disk_gb, DEFAULT_DISK_GB);

        let services = self.api.list_service_offerings().await?;
        let Some(service) = services
            .iter()
            .find(|o| o.cpu_number == cores && o.memory == memory)
        else {
            tracing::debug!("No service offering with {} vCPUs and {} MB RAM", cores, memory);
            return Ok(String::new());
        };

        let disks = self.api.list_disk_offerings().await?;
        let Some(disk_offering) = disks.iter().find(|o| o.disk_size == disk) else {
            tracing::debug!("No disk offering with {} GB", disk);
            return Ok(String::new());
        };

        Ok(format!("{}/{}", service.id, disk_offering.id))
    }
}

impl Provider for CloudStack {
    fn name(&self) -> &str {
        "cloudstack"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}

#[cfg(test)]
#[path = "cloudstack_tests.rs"]
mod cloudstack_tests;
