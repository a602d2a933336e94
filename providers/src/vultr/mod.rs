//! Vultr adapter. Images live in three namespaces: `os:<id>` for stock
//! operating systems, `iso:<id>` for uploaded ISOs and `snapshot:<id>`.

mod api;

pub use api::{ServerRequest, VultrApi, VultrOs, VultrPlan, VultrRegion, VultrServer, VultrSnapshot};

use async_trait::async_trait;
use cloug_common::id_codec::parse_numeric_id;
use cloug_common::{
    get_matching_flavor_id, get_matching_image_id, match_flavor, ComputeError, ComputeService,
    Flavor, FlavorService, Image, ImageNamespace, ImageService, ImageStatus, Instance,
    InstanceStatus, NamespacedId, Provider, Result, ResultExt, VncService,
};
use std::sync::Arc;

const DEFAULT_NAME: &str = "cloug";
const DEFAULT_REGION: &str = "New Jersey";
const IMAGE_NAMESPACES: &[ImageNamespace] =
    &[ImageNamespace::Os, ImageNamespace::Iso, ImageNamespace::Snapshot];

pub struct Vultr {
    api: Arc<dyn VultrApi>,
}

fn map_status(status: &str, power_status: &str) -> InstanceStatus {
    match (status, power_status) {
        ("pending", _) => InstanceStatus::from_provider("installing"),
        ("active", "running") => InstanceStatus::Online,
        ("active", "stopped") => InstanceStatus::Offline,
        ("active", power) => InstanceStatus::from_provider(power),
        (other, _) => InstanceStatus::from_provider(other),
    }
}

fn map_server(server: &VultrServer) -> Instance {
    Instance {
        id: server.id.clone(),
        name: server.name.clone(),
        region: server.region_id.to_string(),
        ip: server.main_ip.clone(),
        private_ip: server.internal_ip.clone(),
        flavor: Flavor {
            id: server.plan_id.to_string(),
            ..Default::default()
        },
        password: server.default_password.clone(),
        bandwidth_used: (server.current_bandwidth_gb * 1024.0 * 1024.0 * 1024.0) as i64,
        status: map_status(&server.status, &server.power_status),
        ..Default::default()
    }
}

fn map_snapshot(snapshot: &VultrSnapshot) -> Image {
    Image {
        id: NamespacedId::new(ImageNamespace::Snapshot, snapshot.id.clone()).to_string(),
        name: snapshot.description.clone(),
        size: snapshot.size,
        status: Some(if snapshot.status == "complete" {
            ImageStatus::Available
        } else {
            ImageStatus::Pending
        }),
        ..Default::default()
    }
}

/// Snapshot ID behind `image_id`; the other namespaces are read-only.
fn snapshot_id(image_id: &str, operation: &str) -> Result<String> {
    let parsed = NamespacedId::parse(image_id, IMAGE_NAMESPACES)?;
    match parsed.namespace {
        ImageNamespace::Snapshot => Ok(parsed.value),
        other => Err(ComputeError::unsupported(format!("{} on {} images", operation, other))),
    }
}

impl Vultr {
    pub fn new(api: Arc<dyn VultrApi>) -> Self {
        Self { api }
    }

    async fn find_os_by_name(&self, name: &str) -> Result<u64> {
        let os_list = self.api.list_os().await?;
        os_list
            .iter()
            .find(|os| os.name == name)
            .map(|os| os.id)
            .ok_or_else(|| ComputeError::not_found(format!("no OS found matching {}", name)))
    }

    /// A numeric region is taken as is; otherwise the name is looked up
    /// case-insensitively.
    async fn find_region(&self, region: &str) -> Result<u64> {
        if let Ok(id) = region.parse() {
            return Ok(id);
        }
        let regions = self
            .api
            .list_regions()
            .await
            .context("error listing regions")?;
        regions
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(region))
            .map(|r| r.id)
            .ok_or_else(|| {
                ComputeError::not_found(format!("could not find region with name matching {}", region))
            })
    }
}

#[async_trait]
impl ComputeService for Vultr {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let image_id = get_matching_image_id(self, &instance.image).await?;
        let flavor_id = get_matching_flavor_id(self, &instance.flavor).await?;
        let plan_id = parse_numeric_id(&flavor_id).context("invalid flavor ID")?;
        let image = NamespacedId::parse(&image_id, IMAGE_NAMESPACES)?;

        let mut request = ServerRequest {
            name: if instance.name.is_empty() {
                DEFAULT_NAME.to_string()
            } else {
                instance.name.clone()
            },
            plan_id,
            private_networking: true,
            ipv6: true,
            ..Default::default()
        };
        match image.namespace {
            ImageNamespace::Os => request.os_id = image.numeric()?,
            ImageNamespace::Iso => {
                request.iso_id = Some(image.numeric()?);
                request.os_id = self
                    .find_os_by_name("Custom")
                    .await
                    .context("failed to get custom OS for creation from ISO")?;
            }
            _ => {
                request.os_id = self
                    .find_os_by_name("Snapshot")
                    .await
                    .context("failed to get snapshot OS for creation from snapshot")?;
                request.snapshot_id = Some(image.value.clone());
            }
        }

        let region = if instance.region.is_empty() {
            DEFAULT_REGION
        } else {
            instance.region.as_str()
        };
        request.region_id = self
            .find_region(region)
            .await
            .context("failed to identify region ID")?;

        tracing::info!(
            "Creating Vultr server {} (plan {}, region {})",
            request.name,
            request.plan_id,
            request.region_id
        );
        let id = self.api.create_server(&request).await?;
        Ok(Instance {
            id,
            name: request.name,
            region: request.region_id.to_string(),
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.api.delete_server(instance_id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let servers = self.api.list_servers().await?;
        Ok(servers.iter().map(map_server).collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let server = self.api.get_server(instance_id).await?;
        Ok(map_server(&server))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.start_server(instance_id).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.halt_server(instance_id).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.reboot_server(instance_id).await
    }
}

#[async_trait]
impl VncService for Vultr {
    async fn get_vnc(&self, instance_id: &str) -> Result<String> {
        let server = self
            .api
            .get_server(instance_id)
            .await
            .context("failed to get server details")?;
        if server.kvm_url.is_empty() {
            return Err(ComputeError::provider(None, "console is not ready yet"));
        }
        Ok(server.kvm_url)
    }
}

#[async_trait]
impl ImageService for Vultr {
    async fn create_image(&self, image: &Image) -> Result<Image> {
        match (image.source_instance.is_empty(), image.source_url.is_empty()) {
            (false, false) => Err(ComputeError::validation(
                "only one of source instance and source URL may be set",
            )),
            (true, true) => Err(ComputeError::validation(
                "neither source instance nor source URL is set",
            )),
            (true, false) => Err(ComputeError::unsupported("creating image from URL")),
            (false, true) => {
                let name = if image.name.is_empty() {
                    DEFAULT_NAME
                } else {
                    image.name.as_str()
                };
                let id = self.api.create_snapshot(&image.source_instance, name).await?;
                Ok(Image {
                    id: NamespacedId::new(ImageNamespace::Snapshot, id).to_string(),
                    name: name.to_string(),
                    source_instance: image.source_instance.clone(),
                    status: Some(ImageStatus::Pending),
                    ..Default::default()
                })
            }
        }
    }

    async fn find_image(&self, _image: &Image) -> Result<String> {
        Err(ComputeError::unsupported("finding Vultr images"))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let mut images: Vec<Image> = self
            .api
            .list_os()
            .await?
            .into_iter()
            .map(|os| Image {
                id: NamespacedId::new(ImageNamespace::Os, os.id.to_string()).to_string(),
                name: os.name,
                public: true,
                status: Some(ImageStatus::Available),
                ..Default::default()
            })
            .collect();
        let snapshots = self.api.list_snapshots().await?;
        images.extend(snapshots.iter().map(map_snapshot));
        Ok(images)
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        let id = snapshot_id(image_id, "get_image")?;
        let snapshots = self.api.list_snapshots().await?;
        snapshots
            .iter()
            .find(|s| s.id == id)
            .map(map_snapshot)
            .ok_or_else(|| ComputeError::not_found(format!("image {} not found", image_id)))
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        let id = snapshot_id(image_id, "delete_image")?;
        self.api.delete_snapshot(&id).await
    }
}

#[async_trait]
impl FlavorService for Vultr {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let plans = self.api.list_plans().await?;
        Ok(plans
            .into_iter()
            .map(|plan| Flavor {
                id: plan.id.to_string(),
                name: plan.name,
                memory_mb: plan.ram,
                num_cores: plan.vcpus,
                disk_gb: plan.disk,
                ..Default::default()
            })
            .collect())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let flavors = self.list_flavors().await.context("error listing flavors")?;
        Ok(match_flavor(flavor, &flavors))
    }
}

impl Provider for Vultr {
    fn name(&self) -> &str {
        "vultr"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
    }

    fn vnc(&self) -> Option<&dyn VncService> {
        Some(self)
    }

    fn images(&self) -> Option<&dyn ImageService> {
        Some(self)
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}
