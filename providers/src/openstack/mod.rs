//! OpenStack adapter. Floating IPs are attached by a detached task after
//! the server is created, so `create_instance` returns before the public
//! address is known.

mod api;

pub use api::{FloatingIp, GlanceImage, ImageUpload, NovaFlavor, OpenStackApi, Server, ServerCreate};

use async_trait::async_trait;
use cloug_common::utils::{pick_addresses, uid};
use cloug_common::{
    get_matching_flavor_id, get_matching_image_id, match_flavor, retry_detached, tokio_spawner,
    ComputeError, ComputeService, Flavor, FlavorService, Image, ImageService, ImageStatus,
    Instance, InstanceStatus, Provider, ReimageService, RenameService, Result, RetryPolicy,
    TaskSpawner, VncService,
};
use std::sync::Arc;

const DEFAULT_NAME: &str = "cloug";

pub struct OpenStack {
    api: Arc<dyn OpenStackApi>,
    spawner: Arc<dyn TaskSpawner>,
    floating_ip_policy: RetryPolicy,
}

fn map_status(status: &str) -> InstanceStatus {
    match status {
        "ACTIVE" => InstanceStatus::Online,
        "SHUTOFF" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn map_image(image: &GlanceImage) -> Image {
    let status = match image.status.as_str() {
        "active" => ImageStatus::Available,
        "error" | "killed" => ImageStatus::Error,
        _ => ImageStatus::Pending,
    };
    Image {
        id: image.id.clone(),
        name: image.name.clone(),
        public: image.visibility == "public",
        size: image.size,
        status: Some(status),
        ..Default::default()
    }
}

fn cloud_config(password: &str) -> String {
    format!(
        "#cloud-config\npassword: {}\nchpasswd: {{ expire: False }}\nssh_pwauth: True\n",
        password
    )
}

/// Binds the first unbound floating IP to `server_id`. A non-empty
/// `wanted` restricts the choice to that address.
async fn associate_free_ip(api: &dyn OpenStackApi, server_id: &str, wanted: &str) -> Result<()> {
    let ips = api.list_floating_ips().await?;
    let free = ips
        .iter()
        .find(|fip| fip.is_free() && (wanted.is_empty() || fip.ip == wanted))
        .ok_or_else(|| ComputeError::not_found("no free floating IP"))?;
    tracing::info!("Associating floating IP {} with server {}", free.ip, server_id);
    api.associate_floating_ip(server_id, &free.ip).await
}

impl OpenStack {
    pub fn new(api: Arc<dyn OpenStackApi>) -> Self {
        Self {
            api,
            spawner: tokio_spawner(),
            floating_ip_policy: RetryPolicy::FLOATING_IP,
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_floating_ip_policy(mut self, policy: RetryPolicy) -> Self {
        self.floating_ip_policy = policy;
        self
    }

    async fn to_instance(&self, server: &Server) -> Instance {
        let mut instance = Instance {
            id: server.id.clone(),
            name: server.name.clone(),
            status: map_status(&server.status),
            ip: server.access_ipv4.clone(),
            ..Default::default()
        };
        match self.api.list_server_addresses(&server.id).await {
            Ok(networks) => {
                let (public, private) =
                    pick_addresses(networks.values().flatten().map(String::as_str));
                if instance.ip.is_empty() {
                    instance.ip = public;
                }
                instance.private_ip = private;
            }
            Err(e) => tracing::debug!("Failed to list addresses of {}: {}", server.id, e),
        }
        instance
    }

    fn spawn_floating_ip(&self, server_id: &str, wanted: &str) {
        let api = self.api.clone();
        let server_id = server_id.to_string();
        let wanted = wanted.to_string();
        let label = format!("associate floating IP with {}", server_id);
        retry_detached(self.spawner.as_ref(), self.floating_ip_policy, &label, move || {
            let api = api.clone();
            let server_id = server_id.clone();
            let wanted = wanted.clone();
            async move { associate_free_ip(api.as_ref(), &server_id, &wanted).await }
        });
    }
}

#[async_trait]
impl ComputeService for OpenStack {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let image_ref = get_matching_image_id(self, &instance.image).await?;
        let flavor_ref = get_matching_flavor_id(self, &instance.flavor).await?;
        let password = if instance.password.is_empty() {
            uid(16)
        } else {
            instance.password.clone()
        };
        let request = ServerCreate {
            name: if instance.name.is_empty() {
                DEFAULT_NAME.to_string()
            } else {
                instance.name.clone()
            },
            image_ref,
            flavor_ref,
            admin_pass: password.clone(),
            user_data: cloud_config(&password),
            availability_zone: (!instance.region.is_empty()).then(|| instance.region.clone()),
            networks: if instance.network_id.is_empty() {
                Vec::new()
            } else {
                vec![instance.network_id.clone()]
            },
        };

        let server = self.api.create_server(&request).await?;
        tracing::info!("Created server {} ({})", server.id, server.name);
        self.spawn_floating_ip(&server.id, &instance.ip);

        Ok(Instance {
            id: server.id.clone(),
            name: request.name,
            status: map_status(&server.status),
            password,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.api.delete_server(instance_id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let servers = self.api.list_servers().await?;
        let mut instances = Vec::with_capacity(servers.len());
        for server in &servers {
            instances.push(self.to_instance(server).await);
        }
        Ok(instances)
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let server = self.api.get_server(instance_id).await?;
        Ok(self.to_instance(&server).await)
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.start_server(instance_id).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.stop_server(instance_id).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.reboot_server(instance_id, true).await
    }
}

#[async_trait]
impl VncService for OpenStack {
    async fn get_vnc(&self, instance_id: &str) -> Result<String> {
        self.api.vnc_console_url(instance_id).await
    }
}

#[async_trait]
impl RenameService for OpenStack {
    async fn rename_instance(&self, instance_id: &str, name: &str) -> Result<()> {
        self.api.rename_server(instance_id, name).await
    }
}

#[async_trait]
impl ReimageService for OpenStack {
    async fn reimage_instance(&self, instance_id: &str, image: &Image) -> Result<()> {
        let image_id = get_matching_image_id(self, image).await?;
        self.api.rebuild_server(instance_id, &image_id).await
    }
}

#[async_trait]
impl ImageService for OpenStack {
    async fn create_image(&self, image: &Image) -> Result<Image> {
        match (image.source_instance.is_empty(), image.source_url.is_empty()) {
            (false, false) => Err(ComputeError::validation(
                "only one of source instance and source URL may be set",
            )),
            (true, true) => Err(ComputeError::validation(
                "neither source instance nor source URL is set",
            )),
            (false, true) => {
                let id = self
                    .api
                    .create_server_image(&image.source_instance, &image.name)
                    .await?;
                Ok(Image {
                    id,
                    name: image.name.clone(),
                    source_instance: image.source_instance.clone(),
                    status: Some(ImageStatus::Pending),
                    ..Default::default()
                })
            }
            (true, false) => {
                if image.format.is_empty() {
                    return Err(ComputeError::validation(
                        "missing image format (e.g. iso, qcow2, raw)",
                    ));
                }
                let uploaded = self
                    .api
                    .upload_image(&ImageUpload {
                        name: image.name.clone(),
                        container_format: "bare".to_string(),
                        disk_format: image.format.clone(),
                        copy_from: image.source_url.clone(),
                    })
                    .await?;
                let mut created = map_image(&uploaded);
                created.format = image.format.clone();
                created.source_url = image.source_url.clone();
                Ok(created)
            }
        }
    }

    async fn find_image(&self, _image: &Image) -> Result<String> {
        Err(ComputeError::unsupported("finding OpenStack images"))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        Err(ComputeError::unsupported("listing OpenStack images"))
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        let image = self.api.get_image(image_id).await?;
        Ok(map_image(&image))
    }

    /// Deleting an image that is already gone succeeds.
    async fn delete_image(&self, image_id: &str) -> Result<()> {
        match self.api.delete_image(image_id).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!("Image {} already deleted", image_id);
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl FlavorService for OpenStack {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let flavors = self.api.list_flavors().await?;
        Ok(flavors
            .into_iter()
            .map(|f| Flavor {
                id: f.id,
                name: f.name,
                memory_mb: f.ram,
                num_cores: f.vcpus,
                disk_gb: f.disk,
                ..Default::default()
            })
            .collect())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let flavors = self.list_flavors().await?;
        Ok(match_flavor(flavor, &flavors))
    }
}

impl Provider for OpenStack {
    fn name(&self) -> &str {
        "openstack"
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

    fn images(&self) -> Option<&dyn ImageService> {
        Some(self)
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}

#[cfg(test)]
#[path = "openstack_tests.rs"]
mod openstack_tests;
