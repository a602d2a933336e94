//! DigitalOcean adapter. Droplet actions are confirmed by polling the
//! action until it leaves `in-progress`.

mod client;

use crate::config::DigitalOceanConfig;
use async_trait::async_trait;
use client::{ApiImage, CreateDropletRequest, DigitalOceanClient, Droplet, DropletAction};
use cloug_common::id_codec::parse_numeric_id;
use cloug_common::utils::{generate_password, uid};
use cloug_common::{
    confirm, create_with_imported_key, get_matching_flavor_id, get_matching_image_id,
    log_reporter, match_flavor, Architecture, CleanupReporter, ComputeError, ComputeService,
    Flavor, FlavorService, Image, ImageNamespace, ImageService, ImageStatus, Instance,
    InstanceStatus, KeypairService, NamespacedId, PollStatus, Provider, ReimageService,
    RenameService, ResizeService, Result, ResultExt, RetryPolicy,
};
use std::sync::Arc;

const DEFAULT_NAME: &str = "cloug";
const DEFAULT_DISTRIBUTION: &str = "ubuntu";
const GIB: i64 = 1024 * 1024 * 1024;

pub struct DigitalOcean {
    client: DigitalOceanClient,
    default_region: String,
    action_policy: RetryPolicy,
    reporter: Arc<dyn CleanupReporter>,
}

fn map_status(status: &str) -> InstanceStatus {
    match status {
        "active" => InstanceStatus::Online,
        "off" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn droplet_to_instance(droplet: &Droplet) -> Instance {
    let mut instance = Instance {
        id: droplet.id.to_string(),
        name: droplet.name.clone(),
        region: droplet
            .region
            .as_ref()
            .map(|region| region.slug.clone())
            .unwrap_or_default(),
        status: map_status(&droplet.status),
        ..Default::default()
    };
    for network in &droplet.networks.v4 {
        match network.network_type.as_str() {
            "public" => instance.ip = network.ip_address.clone(),
            "private" => instance.private_ip = network.ip_address.clone(),
            _ => {}
        }
    }
    instance
}

fn map_image(image: &ApiImage) -> Image {
    Image {
        id: image.id.to_string(),
        name: format!("{} {}", image.distribution, image.name),
        regions: image.regions.clone(),
        status: Some(ImageStatus::Available),
        public: image.public,
        size: image.min_disk_size * GIB,
        distribution: image.distribution.to_lowercase(),
        ..Default::default()
    }
}

fn action_poll_status(status: &str) -> PollStatus {
    match status {
        "completed" => PollStatus::Completed,
        "in-progress" => PollStatus::InProgress,
        other => PollStatus::Failed(format!("action status is {}", other)),
    }
}

fn cloud_config(password: &str) -> String {
    format!(
        "#cloud-config\nchpasswd:\n list: |\n  root:{}\n expire: False\n",
        password
    )
}

impl DigitalOcean {
    pub fn new(config: &DigitalOceanConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: DigitalOceanClient::new(config)?,
            default_region: config.default_region.clone(),
            action_policy: RetryPolicy::ACTION,
            reporter: log_reporter(),
        })
    }

    pub fn with_action_policy(mut self, policy: RetryPolicy) -> Self {
        self.action_policy = policy;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CleanupReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Issues `action` on the droplet and polls it until it settles.
    async fn do_action(&self, instance_id: &str, action: DropletAction) -> Result<()> {
        let droplet_id: u64 = parse_numeric_id(instance_id)?;
        let label = format!("droplet {} {:?}", droplet_id, action);
        let started = self.client.droplet_action(droplet_id, &action).await?;

        let client = &self.client;
        let action_id = started.id;
        confirm(&self.action_policy, &label, move || async move {
            let action = client.get_droplet_action(droplet_id, action_id).await?;
            Ok(action_poll_status(&action.status))
        })
        .await
    }

    /// Numeric image ID for `image`, searching the catalog when no ID is given.
    ///
    /// Explicit IDs go through `get_image` since `snapshot:<name>` IDs only
    /// resolve once the snapshot exists.
    async fn image_id(&self, image: &Image) -> Result<u64> {
        let id = if image.id.is_empty() {
            get_matching_image_id(self, image).await?
        } else {
            let resolved = self.get_image(&image.id).await?;
            if resolved.id.is_empty() {
                return Err(ComputeError::not_found(format!(
                    "image {} is not available yet",
                    image.id
                )));
            }
            resolved.id
        };
        parse_numeric_id(&id)
    }
}

#[async_trait]
impl ComputeService for DigitalOcean {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let image_id = self.image_id(&instance.image).await?;
        let flavor_id = get_matching_flavor_id(self, &instance.flavor).await?;

        if instance.public_key.id.is_empty() && !instance.public_key.key.is_empty() {
            let mut template = instance.clone();
            template.image.id = image_id.to_string();
            template.flavor.id = flavor_id;
            return create_with_imported_key(self, self, self.reporter.as_ref(), &template).await;
        }

        let password = if instance.password.is_empty() {
            generate_password()
        } else {
            instance.password.clone()
        };
        let request = CreateDropletRequest {
            name: if instance.name.is_empty() {
                DEFAULT_NAME.to_string()
            } else {
                instance.name.clone()
            },
            region: if instance.region.is_empty() {
                self.default_region.clone()
            } else {
                instance.region.clone()
            },
            size: flavor_id,
            image: image_id,
            ipv6: true,
            private_networking: true,
            user_data: cloud_config(&password),
            ssh_keys: if instance.public_key.id.is_empty() {
                Vec::new()
            } else {
                vec![instance.public_key.id.clone()]
            },
        };

        tracing::info!("Creating droplet {} in {}", request.name, request.region);
        let droplet = self.client.create_droplet(&request).await?;
        tracing::info!("Created droplet {}", droplet.id);

        Ok(Instance {
            id: droplet.id.to_string(),
            name: droplet.name.clone(),
            region: request.region,
            status: map_status(&droplet.status),
            username: "root".to_string(),
            password,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let droplet_id: u64 = parse_numeric_id(instance_id)?;
        tracing::info!("Deleting droplet {}", droplet_id);
        self.client.delete_droplet(droplet_id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let droplets = self.client.list_droplets().await?;
        Ok(droplets.iter().map(droplet_to_instance).collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let droplet_id: u64 = parse_numeric_id(instance_id)?;
        let droplet = self
            .client
            .get_droplet(droplet_id)
            .await
            .context("error getting droplet")?;
        let mut instance = droplet_to_instance(&droplet);

        match self.client.list_droplet_actions(droplet_id).await {
            Ok(actions) => {
                let pending: Vec<&str> = actions
                    .iter()
                    .filter(|action| action.status == "in-progress")
                    .map(|action| action.action_type.as_str())
                    .collect();
                match pending.as_slice() {
                    [] => {}
                    [single] => {
                        instance
                            .details
                            .insert("Pending action".to_string(), single.to_string());
                    }
                    many => {
                        instance
                            .details
                            .insert("Pending actions".to_string(), many.join(", "));
                    }
                }
            }
            Err(e) => tracing::debug!("Could not list actions of droplet {}: {}", droplet_id, e),
        }
        Ok(instance)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.do_action(instance_id, DropletAction::PowerOn).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.do_action(instance_id, DropletAction::PowerOff).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.do_action(instance_id, DropletAction::Reboot).await
    }
}

#[async_trait]
impl RenameService for DigitalOcean {
    async fn rename_instance(&self, instance_id: &str, name: &str) -> Result<()> {
        self.do_action(
            instance_id,
            DropletAction::Rename {
                name: name.to_string(),
            },
        )
        .await
    }
}

#[async_trait]
impl ReimageService for DigitalOcean {
    async fn reimage_instance(&self, instance_id: &str, image: &Image) -> Result<()> {
        let image = self.image_id(image).await?;
        self.do_action(instance_id, DropletAction::Rebuild { image })
            .await
    }
}

#[async_trait]
impl ResizeService for DigitalOcean {
    async fn resize_instance(&self, instance_id: &str, flavor: &Flavor) -> Result<()> {
        let size = get_matching_flavor_id(self, flavor).await?;
        self.do_action(instance_id, DropletAction::Resize { size, disk: true })
            .await
    }
}

#[async_trait]
impl ImageService for DigitalOcean {
    async fn create_image(&self, image: &Image) -> Result<Image> {
        match (image.source_instance.is_empty(), image.source_url.is_empty()) {
            (false, false) => Err(ComputeError::validation(
                "only one of source instance and source URL may be set",
            )),
            (true, true) => Err(ComputeError::validation(
                "neither source instance nor source URL is set",
            )),
            (true, false) => Err(ComputeError::unsupported("fetching image from URL")),
            (false, true) => {
                let snapshot_name = format!("{}.{}", image.name, uid(16));
                self.do_action(
                    &image.source_instance,
                    DropletAction::Snapshot {
                        name: snapshot_name.clone(),
                    },
                )
                .await?;
                Ok(Image {
                    id: NamespacedId::new(ImageNamespace::Snapshot, &snapshot_name).to_string(),
                    name: snapshot_name,
                    status: Some(ImageStatus::Pending),
                    source_instance: image.source_instance.clone(),
                    ..Default::default()
                })
            }
        }
    }

    /// Newest public image of the requested distribution and architecture.
    async fn find_image(&self, image: &Image) -> Result<String> {
        let images = self
            .client
            .list_distribution_images()
            .await
            .context("error listing distribution images")?;

        let distribution = if image.distribution.is_empty() {
            DEFAULT_DISTRIBUTION.to_string()
        } else {
            image.distribution.to_lowercase()
        };
        let architecture = match image.architecture {
            Some(Architecture::I386) => "32",
            _ => "x64",
        };

        Ok(images
            .iter()
            .filter(|candidate| candidate.public)
            .filter(|candidate| candidate.distribution.to_lowercase() == distribution)
            .filter(|candidate| candidate.name.contains(architecture))
            .max_by_key(|candidate| candidate.id)
            .map(|best| best.id.to_string())
            .unwrap_or_default())
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let images = self.client.list_distribution_images().await?;
        Ok(images.iter().map(map_image).collect())
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        if !image_id.contains(':') {
            let id: u64 = parse_numeric_id(image_id)?;
            return Ok(map_image(&self.client.get_image(id).await?));
        }

        let snapshot = NamespacedId::parse(image_id, &[ImageNamespace::Snapshot])?;
        let images = self.client.list_user_images().await?;
        match images.iter().find(|image| image.name == snapshot.value) {
            Some(image) => Ok(map_image(image)),
            None => {
                tracing::debug!("Snapshot {} not listed yet", snapshot.value);
                Ok(Image {
                    status: Some(ImageStatus::Pending),
                    ..Default::default()
                })
            }
        }
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        let id = self
            .image_id(&Image {
                id: image_id.to_string(),
                ..Default::default()
            })
            .await?;
        self.client.delete_image(id).await
    }
}

#[async_trait]
impl FlavorService for DigitalOcean {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let sizes = self.client.list_sizes().await?;
        Ok(sizes
            .into_iter()
            .map(|size| Flavor {
                id: size.slug.clone(),
                name: size.slug,
                regions: size.regions,
                num_cores: size.vcpus,
                disk_gb: size.disk,
                memory_mb: size.memory,
                transfer_gb: (size.transfer * 1024.0) as u32,
            })
            .collect())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let flavors = self.list_flavors().await?;
        Ok(match_flavor(flavor, &flavors))
    }
}

#[async_trait]
impl KeypairService for DigitalOcean {
    async fn import_public_key(&self, label: &str, key: &str) -> Result<String> {
        self.client
            .create_ssh_key(label, key)
            .await
            .context("error importing public key")
    }

    async fn remove_public_key(&self, key_id: &str) -> Result<()> {
        self.client.delete_ssh_key(key_id).await
    }
}

impl Provider for DigitalOcean {
    fn name(&self) -> &str {
        "digitalocean"
    }

    fn compute(&self) -> &dyn ComputeService {
        self
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

    fn images(&self) -> Option<&dyn ImageService> {
        Some(self)
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}
