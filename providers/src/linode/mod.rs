//! Linode adapter.
//!
//! A Linode is created empty and provisioned in steps (root disk, swap,
//! boot config, boot). A failed step deletes the half-built Linode.

mod api;

pub use api::{
    Datacenter, Disk, DiskSource, DiskSpec, Distribution, Kernel, LinodeApi, LinodeImage,
    LinodeInfo, LinodeIp, Plan,
};

use async_trait::async_trait;
use cloug_common::id_codec::parse_numeric_id;
use cloug_common::utils::generate_password;
use cloug_common::{
    best_effort, get_matching_flavor_id, get_matching_image_id, log_reporter, match_flavor,
    CleanupReporter, ComputeError, ComputeService, Flavor, FlavorService, Image, ImageNamespace,
    ImageService, ImageStatus, Instance, InstanceStatus, NamespacedId, Provider, Result,
    ResultExt,
};
use std::sync::Arc;

const DEFAULT_DATACENTER: &str = "newark";
const DEFAULT_STORAGE_GB: u32 = 10;
const DISK_LABEL: &str = "cloug";
const SWAP_LABEL: &str = "cloug-swap";
const KERNEL_MARKER: &str = "Latest 64 bit";

pub struct Linode {
    api: Arc<dyn LinodeApi>,
    reporter: Arc<dyn CleanupReporter>,
}

fn map_status(status: &str) -> InstanceStatus {
    match status {
        "Running" => InstanceStatus::Online,
        "Powered Off" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn linode_to_instance(linode: &LinodeInfo, ips: &[LinodeIp]) -> Instance {
    let mut instance = Instance {
        id: linode.id.to_string(),
        name: linode.label.clone(),
        flavor: Flavor {
            id: linode.plan_id.to_string(),
            disk_gb: linode.total_hd / 1024,
            memory_mb: linode.total_ram,
            ..Default::default()
        },
        status: map_status(&linode.status),
        ..Default::default()
    };
    for ip in ips {
        if ip.is_public {
            instance.ip = ip.address.clone();
        } else {
            instance.private_ip = ip.address.clone();
        }
    }
    instance
}

fn map_image(image: &LinodeImage) -> Image {
    Image {
        id: NamespacedId::new(ImageNamespace::Image, image.id.to_string()).to_string(),
        name: image.label.clone(),
        size: image.min_size * 1024 * 1024,
        status: Some(if image.status == "available" {
            ImageStatus::Available
        } else {
            ImageStatus::Pending
        }),
        ..Default::default()
    }
}

/// Image namespaces a Linode root disk can be built from.
const IMAGE_NAMESPACES: &[ImageNamespace] = &[ImageNamespace::Distribution, ImageNamespace::Image];

/// Only `image:` entries are user images; distributions are read-only.
fn user_image_id(image_id: &str, operation: &str) -> Result<u64> {
    let parsed = NamespacedId::parse(image_id, IMAGE_NAMESPACES)?;
    match parsed.namespace {
        ImageNamespace::Image => parsed.numeric(),
        _ => Err(ComputeError::unsupported(format!(
            "{} on {} entries",
            operation, parsed.namespace
        ))),
    }
}

struct Provisioning<'a> {
    linode_id: u64,
    kernel_id: u64,
    source: DiskSource,
    disk_mb: u32,
    swap_mb: u32,
    password: &'a str,
}

impl Linode {
    pub fn new(api: Arc<dyn LinodeApi>) -> Self {
        Self {
            api,
            reporter: log_reporter(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CleanupReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    async fn find_matching_plan(&self, flavor: &Flavor) -> Result<Plan> {
        let flavor_id = get_matching_flavor_id(self, flavor).await?;
        let plan_id: u64 = parse_numeric_id(&flavor_id)?;
        let plans = self.api.list_plans().await.context("failed to list plans")?;
        plans
            .into_iter()
            .find(|plan| plan.id == plan_id)
            .ok_or_else(|| ComputeError::not_found(format!("could not find plan with id={}", plan_id)))
    }

    async fn find_kernel(&self) -> Result<u64> {
        let kernels = self.api.list_kernels().await?;
        kernels
            .iter()
            .find(|kernel| kernel.label.contains(KERNEL_MARKER))
            .map(|kernel| kernel.id)
            .ok_or_else(|| ComputeError::not_found("no kernel found"))
    }

    async fn find_datacenter(&self, abbreviation: &str) -> Result<u64> {
        let datacenters = self.api.list_datacenters().await?;
        datacenters
            .iter()
            .find(|datacenter| datacenter.abbreviation == abbreviation)
            .map(|datacenter| datacenter.id)
            .ok_or_else(|| {
                ComputeError::not_found(format!("no matching datacenter found for {}", abbreviation))
            })
    }

    /// Root disk, swap disk and boot config on an existing Linode.
    async fn provision(&self, step: Provisioning<'_>) -> Result<()> {
        let root = DiskSpec {
            label: DISK_LABEL.to_string(),
            source: step.source,
            size_mb: step.disk_mb,
            root_password: step.password.to_string(),
        };
        let root_id = self
            .api
            .create_disk(step.linode_id, &root)
            .await
            .context("failed to create root disk")?;

        let swap = DiskSpec {
            label: SWAP_LABEL.to_string(),
            source: DiskSource::Swap,
            size_mb: step.swap_mb,
            root_password: String::new(),
        };
        let swap_id = self
            .api
            .create_disk(step.linode_id, &swap)
            .await
            .context("failed to create swap disk")?;

        self.api
            .create_config(step.linode_id, step.kernel_id, DISK_LABEL, &[root_id, swap_id])
            .await
            .context("failed to create config")?;
        Ok(())
    }

    async fn root_disk(&self, linode_id: u64) -> Result<u64> {
        let disks = self.api.list_disks(linode_id).await?;
        disks
            .iter()
            .find(|disk| disk.disk_type != "swap")
            .map(|disk| disk.id)
            .ok_or_else(|| ComputeError::not_found("no non-swap disks found on this Linode"))
    }
}

#[async_trait]
impl ComputeService for Linode {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let image_id = get_matching_image_id(self, &instance.image).await?;
        let image = NamespacedId::parse(&image_id, IMAGE_NAMESPACES)?;
        let source = match image.namespace {
            ImageNamespace::Distribution => DiskSource::Distribution(image.numeric()?),
            _ => DiskSource::Image(image.numeric()?),
        };
        let plan = self.find_matching_plan(&instance.flavor).await?;
        let kernel_id = self.find_kernel().await?;

        let password = if instance.password.is_empty() {
            generate_password()
        } else {
            instance.password.clone()
        };
        let region = if instance.region.is_empty() {
            DEFAULT_DATACENTER
        } else {
            instance.region.as_str()
        };
        let datacenter_id = self.find_datacenter(region).await?;

        let storage_gb = match instance.flavor.disk_gb {
            0 => DEFAULT_STORAGE_GB,
            disk => disk,
        };
        let total_mb = storage_gb * 1024;
        let swap_mb = plan.ram / 2;
        if swap_mb >= total_mb {
            return Err(ComputeError::validation(format!(
                "{} GB of storage leaves no room next to {} MB of swap",
                storage_gb, swap_mb
            )));
        }

        let linode_id = self.api.create_linode(datacenter_id, plan.id).await?;
        tracing::info!("Created Linode {} in {}, provisioning disks", linode_id, region);

        let step = Provisioning {
            linode_id,
            kernel_id,
            source,
            disk_mb: total_mb - swap_mb,
            swap_mb,
            password: &password,
        };
        if let Err(e) = self.provision(step).await {
            best_effort(
                self.reporter.as_ref(),
                "delete linode",
                &linode_id.to_string(),
                self.api.delete_linode(linode_id, false),
            )
            .await;
            return Err(e);
        }

        if let Err(e) = self.api.boot_linode(linode_id).await {
            tracing::warn!("Initial boot of Linode {} failed: {}", linode_id, e);
        }

        Ok(Instance {
            id: linode_id.to_string(),
            region: region.to_string(),
            username: "root".to_string(),
            password,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let linode_id: u64 = parse_numeric_id(instance_id)?;
        self.api.delete_linode(linode_id, true).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let linodes = self.api.list_linodes().await?;
        Ok(linodes
            .iter()
            .map(|linode| linode_to_instance(linode, &[]))
            .collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let linode_id: u64 = parse_numeric_id(instance_id)?;
        let linode = self.api.get_linode(linode_id).await?;
        let ips = self.api.list_ips(linode_id).await?;
        Ok(linode_to_instance(&linode, &ips))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.boot_linode(parse_numeric_id(instance_id)?).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.shutdown_linode(parse_numeric_id(instance_id)?).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.reboot_linode(parse_numeric_id(instance_id)?).await
    }
}

#[async_trait]
impl ImageService for Linode {
    async fn create_image(&self, image: &Image) -> Result<Image> {
        match (image.source_instance.is_empty(), image.source_url.is_empty()) {
            (false, false) => Err(ComputeError::validation(
                "only one of source instance and source URL may be set",
            )),
            (true, true) => Err(ComputeError::validation(
                "neither source instance nor source URL is set",
            )),
            (true, false) => Err(ComputeError::unsupported("creating image from source URL")),
            (false, true) => {
                let linode_id: u64 = parse_numeric_id(&image.source_instance)?;
                let disk_id = self
                    .root_disk(linode_id)
                    .await
                    .context("failed to find root disk")?;
                let image_id = self
                    .api
                    .imagize_disk(linode_id, disk_id, "cloug image")
                    .await?;
                Ok(Image {
                    id: NamespacedId::new(ImageNamespace::Image, image_id.to_string()).to_string(),
                    name: image.name.clone(),
                    status: Some(ImageStatus::Pending),
                    source_instance: image.source_instance.clone(),
                    ..Default::default()
                })
            }
        }
    }

    async fn find_image(&self, _image: &Image) -> Result<String> {
        Err(ComputeError::unsupported("finding Linode images"))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let mut images: Vec<Image> = self.api.list_images().await?.iter().map(map_image).collect();
        let distributions = self.api.list_distributions().await?;
        images.extend(distributions.into_iter().map(|distribution| Image {
            id: NamespacedId::new(ImageNamespace::Distribution, distribution.id.to_string())
                .to_string(),
            name: distribution.label,
            public: true,
            status: Some(ImageStatus::Available),
            ..Default::default()
        }));
        Ok(images)
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        let id = user_image_id(image_id, "fetching image details")?;
        Ok(map_image(&self.api.get_image(id).await?))
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        let id = user_image_id(image_id, "deleting images")?;
        self.api.delete_image(id).await
    }
}

#[async_trait]
impl FlavorService for Linode {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let plans = self.api.list_plans().await?;
        Ok(plans
            .into_iter()
            .map(|plan| Flavor {
                id: plan.id.to_string(),
                name: plan.label,
                num_cores: plan.cores,
                disk_gb: plan.disk,
                memory_mb: plan.ram,
                transfer_gb: plan.bandwidth,
                ..Default::default()
            })
            .collect())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let flavors = self
            .list_flavors()
            .await
            .context("error listing flavors")?;
        Ok(match_flavor(flavor, &flavors))
    }
}

impl Provider for Linode {
    fn name(&self) -> &str {
        "linode"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
    }

    fn images(&self) -> Option<&dyn ImageService> {
        Some(self)
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}

#[cfg(test)]
#[path = "linode_tests.rs"]
mod linode_tests;
