//! Proxmox VE adapter. Instances are addressed as `node/vmid`.

mod client;

use crate::config::ProxmoxConfig;
use async_trait::async_trait;
use client::{CreateVmOptions, Node, ProxmoxClient, TaskStatus, Vm};
use cloug_common::id_codec::{decode_node_id, encode_node_id};
use cloug_common::utils::{pick_addresses, shuffled};
use cloug_common::{
    best_effort, confirm, log_reporter, CleanupReporter, ComputeError, ComputeService, Instance,
    InstanceStatus, PollStatus, Provider, Result, ResultExt, RetryPolicy, VncService,
};
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_DISK_GB: u32 = 32;
const DEFAULT_MEMORY_MB: u32 = 512;
const DEFAULT_CORES: u32 = 1;
/// VMIDs handed out for new instances: 100 through 998.
const VMID_RANGE: std::ops::Range<u32> = 100..999;
const GIB: i64 = 1024 * 1024 * 1024;

pub struct Proxmox {
    client: ProxmoxClient,
    host: String,
    storage: String,
    bridge: Option<String>,
    action_policy: RetryPolicy,
    task_policy: RetryPolicy,
    reporter: Arc<dyn CleanupReporter>,
}

fn map_status(status: &str) -> InstanceStatus {
    match status {
        "running" => InstanceStatus::Online,
        "stopped" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn task_poll_status(task: &TaskStatus) -> PollStatus {
    if task.status != "stopped" {
        return PollStatus::InProgress;
    }
    match task.exitstatus.as_deref() {
        Some("OK") => PollStatus::Completed,
        Some(exit) => PollStatus::Failed(exit.to_string()),
        None => PollStatus::Failed("task stopped without exit status".to_string()),
    }
}

/// Node with enough free disk for `disk_gb` and the most free memory.
fn pick_node(nodes: &[Node], disk_gb: u32) -> Option<&Node> {
    nodes
        .iter()
        .filter(|node| node.maxdisk - node.disk >= disk_gb as i64 * GIB)
        .filter(|node| node.maxmem - node.mem > 0)
        .max_by_key(|node| node.maxmem - node.mem)
}

impl Proxmox {
    pub fn new(config: &ProxmoxConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Proxmox API URL: {}", config.api_url))?;
        let host = url
            .host_str()
            .with_context(|| format!("Proxmox API URL has no host: {}", config.api_url))?
            .to_string();

        Ok(Self {
            client: ProxmoxClient::new(config)?,
            host,
            storage: config.storage.clone(),
            bridge: config.bridge.clone(),
            action_policy: RetryPolicy::ACTION,
            task_policy: RetryPolicy::TASK,
            reporter: log_reporter(),
        })
    }

    pub fn with_action_policy(mut self, policy: RetryPolicy) -> Self {
        self.action_policy = policy;
        self
    }

    pub fn with_task_policy(mut self, policy: RetryPolicy) -> Self {
        self.task_policy = policy;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CleanupReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    async fn wait_for_task(&self, upid: &str, policy: &RetryPolicy, label: &str) -> Result<()> {
        let client = &self.client;
        confirm(policy, label, move || async move {
            let task = client.task_status(upid).await?;
            Ok(task_poll_status(&task))
        })
        .await
    }

    fn vm_to_instance(vm: &Vm, node: &str) -> Instance {
        Instance {
            id: encode_node_id(node, vm.vmid),
            name: vm.name.clone().unwrap_or_default(),
            region: node.to_string(),
            status: map_status(&vm.status),
            ..Default::default()
        }
    }

    async fn power(&self, instance_id: &str, action: &str) -> Result<()> {
        let (node, vmid) = decode_node_id(instance_id)?;
        tracing::debug!("Sending {} to VM {}/{}", action, node, vmid);
        let upid = self
            .client
            .vm_power(&node, vmid, action)
            .await
            .with_context(|| format!("Failed to {} VM {}", action, instance_id))?;
        self.wait_for_task(&upid, &self.action_policy, action).await
    }

    async fn free_vmid(&self, node: &str) -> Result<u32> {
        let vms = self
            .client
            .list_vms(node)
            .await
            .with_context(|| format!("error listing vms on {}", node))?;
        let used: HashSet<u32> = vms.iter().map(|vm| vm.vmid).collect();
        shuffled(VMID_RANGE)
            .into_iter()
            .find(|id| !used.contains(id))
            .ok_or_else(|| {
                ComputeError::not_found(format!("did not find any free ID on node {}", node))
            })
    }
}

#[async_trait]
impl ComputeService for Proxmox {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        if instance.image.id.is_empty() {
            return Err(ComputeError::validation("image ID must be specified"));
        }

        let disk_gb = match instance.flavor.disk_gb {
            0 => DEFAULT_DISK_GB,
            disk => disk,
        };
        let memory_mb = match instance.flavor.memory_mb {
            0 => DEFAULT_MEMORY_MB,
            memory => memory,
        };
        let cores = match instance.flavor.num_cores {
            0 => DEFAULT_CORES,
            cores => cores,
        };

        let nodes = self
            .client
            .list_nodes()
            .await
            .context("error listing nodes")?;
        let node = pick_node(&nodes, disk_gb)
            .ok_or_else(|| ComputeError::not_found("no node found with sufficient resources"))?
            .node
            .clone();
        let vmid = self.free_vmid(&node).await?;
        let id = encode_node_id(&node, vmid);

        tracing::info!("Creating VM {} ({} cores, {} MB, {} GB)", id, cores, memory_mb, disk_gb);
        let options = CreateVmOptions {
            vmid,
            node: node.clone(),
            name: instance.name.clone(),
            cores,
            memory_mb,
            disk_gb,
            iso: instance.image.id.clone(),
            storage: self.storage.clone(),
            bridge: self.bridge.clone(),
        };
        let upid = self
            .client
            .create_vm(&options)
            .await
            .with_context(|| format!("failed to create VM on node {}", node))?;

        if let Err(e) = self.wait_for_task(&upid, &self.task_policy, "create VM").await {
            best_effort(self.reporter.as_ref(), "delete VM", &id, async {
                self.client.delete_vm(&node, vmid).await.map(|_| ())
            })
            .await;
            return Err(e);
        }

        tracing::info!("Created VM {}", id);
        Ok(Instance {
            id,
            name: instance.name.clone(),
            region: node,
            image: instance.image.clone(),
            flavor: cloug_common::Flavor {
                num_cores: cores,
                memory_mb,
                disk_gb,
                ..instance.flavor.clone()
            },
            status: InstanceStatus::Offline,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let (node, vmid) = decode_node_id(instance_id)?;
        tracing::info!("Deleting VM {}", instance_id);
        let upid = self.client.delete_vm(&node, vmid).await?;
        self.wait_for_task(&upid, &self.action_policy, "delete VM")
            .await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let nodes = self
            .client
            .list_nodes()
            .await
            .context("failed to list nodes")?;
        let mut instances = Vec::new();
        for node in &nodes {
            let vms = self
                .client
                .list_vms(&node.node)
                .await
                .with_context(|| format!("failed to list VMs on node {}", node.node))?;
            instances.extend(vms.iter().map(|vm| Self::vm_to_instance(vm, &node.node)));
        }
        Ok(instances)
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let (node, vmid) = decode_node_id(instance_id)?;
        let mut vm = self.client.vm_status(&node, vmid).await?;
        vm.vmid = vmid;
        let mut instance = Self::vm_to_instance(&vm, &node);

        if instance.status == InstanceStatus::Online {
            let addresses = self.client.guest_addresses(&node, vmid).await;
            let (public, private) = pick_addresses(addresses.iter().map(String::as_str));
            instance.ip = public;
            instance.private_ip = private;
        }
        Ok(instance)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.power(instance_id, "start").await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.power(instance_id, "stop").await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.power(instance_id, "reset").await
    }
}

#[async_trait]
impl VncService for Proxmox {
    async fn get_vnc(&self, instance_id: &str) -> Result<String> {
        let (node, vmid) = decode_node_id(instance_id)?;
        let proxy = self.client.vnc_proxy(&node, vmid).await?;
        Ok(format!(
            "vnc://{}:{}?password={}",
            self.host,
            proxy.port,
            urlencoding::encode(&proxy.ticket)
        ))
    }
}

impl Provider for Proxmox {
    fn name(&self) -> &str {
        "proxmox"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
    }

    fn vnc(&self) -> Option<&dyn VncService> {
        Some(self)
    }
}
