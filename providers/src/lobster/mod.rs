//! Lobster panel adapter. Every resource has a numeric ID; addresses are
//! addressed as `instance:ip`.

mod api;

pub use api::{
    ImageDetails, ImageInfo, LobsterAddress, LobsterApi, LobsterImage, LobsterPlan, LobsterVm,
    VmAction, VmDetails, VmInfo,
};

use async_trait::async_trait;
use cloug_common::id_codec::{decode_address_id, encode_address_id, parse_numeric_id};
use cloug_common::{
    get_matching_flavor_id, get_matching_image_id, match_flavor, Address, AddressService,
    ComputeError, ComputeService, Flavor, FlavorService, Image, ImageService, ImageStatus,
    Instance, InstanceStatus, Provider, ReimageService, RenameService, ResizeService, Result,
    ResultExt, VncService,
};
use std::sync::Arc;

const DEFAULT_NAME: &str = "cloug";
const LOGIN_DETAILS: &str = "Login Details";

pub struct Lobster {
    api: Arc<dyn LobsterApi>,
}

fn vm_id(instance_id: &str) -> Result<u64> {
    parse_numeric_id(instance_id).context("invalid instance ID")
}

fn or_default_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Pulls `username` and `password` out of `username: X; password: Y`.
/// Either part may be missing; unknown keys are ignored.
fn parse_login_details(text: &str) -> (String, String) {
    let mut username = String::new();
    let mut password = String::new();
    for part in text.split("; ") {
        match part.split_once(": ") {
            Some(("username", value)) => username = value.to_string(),
            Some(("password", value)) => password = value.to_string(),
            _ => {}
        }
    }
    (username, password)
}

fn map_vm(vm: &LobsterVm, details: Option<&VmDetails>) -> Instance {
    let mut instance = Instance {
        id: vm.id.to_string(),
        name: vm.name.clone(),
        region: vm.region.clone(),
        ip: vm.external_ip.clone(),
        private_ip: vm.private_ip.clone(),
        flavor: Flavor {
            id: vm.plan_id.to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let Some(details) = details else {
        return instance;
    };
    instance.status = InstanceStatus::from_provider(&details.status);
    instance.bandwidth_used = details.bandwidth_used;
    if !details.login_details.is_empty() {
        let (username, password) = parse_login_details(&details.login_details);
        if username.is_empty() && password.is_empty() {
            instance
                .details
                .insert(LOGIN_DETAILS.to_string(), details.login_details.clone());
        }
        instance.username = username;
        instance.password = password;
    }
    instance
}

fn map_image(image: &LobsterImage, details: Option<&ImageDetails>) -> Image {
    let status = match image.status.as_str() {
        "active" => ImageStatus::Available,
        "pending" => ImageStatus::Pending,
        _ => ImageStatus::Error,
    };
    let mut mapped = Image {
        id: image.id.to_string(),
        name: image.name.clone(),
        regions: vec![image.region.clone()],
        status: Some(status),
        ..Default::default()
    };
    if let Some(details) = details {
        mapped.size = details.size;
        if mapped.status == Some(ImageStatus::Error) && !details.status.is_empty() {
            mapped
                .details
                .insert("Status".to_string(), details.status.clone());
        }
    }
    mapped
}

impl Lobster {
    pub fn new(api: Arc<dyn LobsterApi>) -> Self {
        Self { api }
    }

    async fn find_address(&self, instance_id: &str, address_id: &str) -> Result<Address> {
        let addresses = self
            .list_instance_addresses(instance_id)
            .await
            .context("failed to list instance addresses")?;
        addresses
            .into_iter()
            .find(|a| a.id == address_id)
            .ok_or_else(|| ComputeError::not_found("instance does not have the specified address"))
    }
}

#[async_trait]
impl ComputeService for Lobster {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let image_id = get_matching_image_id(self, &instance.image).await?;
        let flavor_id = get_matching_flavor_id(self, &instance.flavor).await?;
        let image_id: u64 = parse_numeric_id(&image_id).context("invalid image ID")?;
        let plan_id: u64 = parse_numeric_id(&flavor_id).context("invalid flavor ID")?;
        let name = or_default_name(&instance.name);

        tracing::info!("Creating Lobster VM {} (plan {}, image {})", name, plan_id, image_id);
        let id = self.api.vm_create(&name, plan_id, image_id).await?;
        Ok(Instance {
            id: id.to_string(),
            name,
            ..Default::default()
        })
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_delete(vm_id(instance_id)?).await
    }

    /// Listing returns summaries only, so status and credentials stay unset.
    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let vms = self.api.vm_list().await?;
        Ok(vms.iter().map(|vm| map_vm(vm, None)).collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let info = self.api.vm_info(vm_id(instance_id)?).await?;
        Ok(map_vm(&info.vm, info.details.as_ref()))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_action(vm_id(instance_id)?, &VmAction::Start).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_action(vm_id(instance_id)?, &VmAction::Stop).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        self.api.vm_action(vm_id(instance_id)?, &VmAction::Reboot).await
    }
}

#[async_trait]
impl VncService for Lobster {
    async fn get_vnc(&self, instance_id: &str) -> Result<String> {
        self.api.vm_vnc(vm_id(instance_id)?).await
    }
}

#[async_trait]
impl RenameService for Lobster {
    async fn rename_instance(&self, instance_id: &str, name: &str) -> Result<()> {
        let action = VmAction::Rename(name.to_string());
        self.api.vm_action(vm_id(instance_id)?, &action).await
    }
}

#[async_trait]
impl ReimageService for Lobster {
    async fn reimage_instance(&self, instance_id: &str, image: &Image) -> Result<()> {
        let image_id = get_matching_image_id(self, image).await?;
        let image_id = parse_numeric_id(&image_id).context("invalid image ID")?;
        self.api.vm_reimage(vm_id(instance_id)?, image_id).await
    }
}

#[async_trait]
impl ResizeService for Lobster {
    async fn resize_instance(&self, instance_id: &str, flavor: &Flavor) -> Result<()> {
        let flavor_id = get_matching_flavor_id(self, flavor).await?;
        let plan_id = parse_numeric_id(&flavor_id).context("invalid flavor ID")?;
        self.api.vm_resize(vm_id(instance_id)?, plan_id).await
    }
}

#[async_trait]
impl ImageService for Lobster {
    async fn create_image(&self, image: &Image) -> Result<Image> {
        let name = or_default_name(&image.name);
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
                    .vm_snapshot(vm_id(&image.source_instance)?, &name)
                    .await?;
                Ok(Image {
                    id: id.to_string(),
                    name,
                    source_instance: image.source_instance.clone(),
                    status: Some(ImageStatus::Pending),
                    ..Default::default()
                })
            }
            (true, false) => {
                if image.format.is_empty() {
                    return Err(ComputeError::validation("missing image format"));
                }
                let [region] = image.regions.as_slice() else {
                    return Err(ComputeError::validation(
                        "image must specify exactly one region",
                    ));
                };
                let id = self
                    .api
                    .image_fetch(region, &name, &image.source_url, &image.format)
                    .await?;
                Ok(Image {
                    id: id.to_string(),
                    name,
                    regions: image.regions.clone(),
                    format: image.format.clone(),
                    source_url: image.source_url.clone(),
                    status: Some(ImageStatus::Pending),
                    ..Default::default()
                })
            }
        }
    }

    async fn find_image(&self, _image: &Image) -> Result<String> {
        Err(ComputeError::unsupported("finding Lobster images"))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let images = self.api.image_list().await?;
        Ok(images.iter().map(|image| map_image(image, None)).collect())
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        let id = parse_numeric_id(image_id).context("invalid image ID")?;
        let info = self.api.image_info(id).await?;
        Ok(map_image(&info.image, info.details.as_ref()))
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        let id = parse_numeric_id(image_id).context("invalid image ID")?;
        self.api.image_delete(id).await
    }
}

#[async_trait]
impl AddressService for Lobster {
    async fn list_instance_addresses(&self, instance_id: &str) -> Result<Vec<Address>> {
        let addresses = self.api.vm_addresses(vm_id(instance_id)?).await?;
        Ok(addresses
            .into_iter()
            .map(|addr| Address {
                id: encode_address_id(instance_id, &addr.ip),
                ip: addr.ip,
                private_ip: addr.private_ip,
                can_dns: addr.can_rdns,
                hostname: addr.hostname,
            })
            .collect())
    }

    async fn add_address_to_instance(&self, instance_id: &str, _address: &Address) -> Result<()> {
        self.api.vm_address_add(vm_id(instance_id)?).await
    }

    async fn remove_address_from_instance(&self, instance_id: &str, address_id: &str) -> Result<()> {
        let id = vm_id(instance_id)?;
        let address = self.find_address(instance_id, address_id).await?;
        self.api
            .vm_address_remove(id, &address.ip, address.private_ip)
            .await
    }

    async fn set_address_hostname(&self, address_id: &str, hostname: &str) -> Result<()> {
        let (instance_id, ip) = decode_address_id(address_id)?;
        self.api
            .vm_address_rdns(vm_id(&instance_id)?, &ip, hostname)
            .await
    }
}

#[async_trait]
impl FlavorService for Lobster {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let plans = self.api.plan_list().await?;
        Ok(plans
            .into_iter()
            .map(|plan| Flavor {
                id: plan.id.to_string(),
                name: plan.name,
                memory_mb: plan.ram,
                num_cores: plan.cpu,
                disk_gb: plan.storage,
                transfer_gb: plan.bandwidth,
                ..Default::default()
            })
            .collect())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        let flavors = self.list_flavors().await.context("error listing flavors")?;
        Ok(match_flavor(flavor, &flavors))
    }
}

impl Provider for Lobster {
    fn name(&self) -> &str {
        "lobster"
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

    fn images(&self) -> Option<&dyn ImageService> {
        Some(self)
    }

    fn addresses(&self) -> Option<&dyn AddressService> {
        Some(self)
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        Some(self)
    }
}
