//! Amazon EC2 adapter. Instance and image IDs carry their region as
//! `region:id`; bare IDs belong to the default region.

mod api;

pub use api::{EbsVolume, Ec2Api, Ec2Image, Ec2Instance, RunInstanceRequest};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cloug_common::id_codec::{decode_region_id, encode_region_id};
use cloug_common::utils::{generate_password, uid};
use cloug_common::{
    best_effort, create_with_imported_key, get_matching_flavor_id, get_matching_image_id,
    log_reporter, match_flavor, CleanupReporter, ComputeError, ComputeService, Flavor,
    FlavorService, Image, ImageService, ImageStatus, Instance, InstanceStatus, KeypairService,
    Provider, Result, ResultExt,
};
use std::sync::Arc;

pub const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_NAME: &str = "cloug";

pub struct Ec2 {
    api: Arc<dyn Ec2Api>,
    reporter: Arc<dyn CleanupReporter>,
}

/// The key pair registry of one region.
pub struct Ec2RegionKeys {
    api: Arc<dyn Ec2Api>,
    region: String,
}

impl Ec2RegionKeys {
    pub fn new(api: Arc<dyn Ec2Api>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }
}

#[async_trait]
impl KeypairService for Ec2RegionKeys {
    /// Key pair names must be unique per region, so the label gets a random suffix.
    async fn import_public_key(&self, label: &str, key: &str) -> Result<String> {
        let key_name = format!("{}-{}", label, uid(8));
        self.api
            .import_key_pair(&self.region, &key_name, key)
            .await
            .context("failed to import public key")?;
        Ok(key_name)
    }

    async fn remove_public_key(&self, key_id: &str) -> Result<()> {
        self.api.delete_key_pair(&self.region, key_id).await
    }
}

fn map_status(state: &str) -> InstanceStatus {
    match state {
        "running" => InstanceStatus::Online,
        "stopped" => InstanceStatus::Offline,
        other => InstanceStatus::from_provider(other),
    }
}

fn map_instance(instance: &Ec2Instance, region: &str) -> Instance {
    Instance {
        id: encode_region_id(region, &instance.instance_id),
        region: region.to_string(),
        status: map_status(&instance.state),
        ip: instance.public_ip.clone().unwrap_or_default(),
        private_ip: instance.private_ip.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn map_image(image: &Ec2Image, region: &str) -> Image {
    let status = match image.state.as_str() {
        "available" => ImageStatus::Available,
        "error" | "failed" | "invalid" => ImageStatus::Error,
        _ => ImageStatus::Pending,
    };
    Image {
        id: encode_region_id(region, &image.image_id),
        name: image.name.clone(),
        regions: vec![region.to_string()],
        public: image.public,
        size: image.volume_size_gb.unwrap_or_default() * 1024 * 1024 * 1024,
        status: Some(status),
        ..Default::default()
    }
}

fn cloud_config(password: &str) -> String {
    let config = format!(
        "#cloud-config\npassword: {}\nchpasswd: {{ expire: False }}\nssh_pwauth: True\n",
        password
    );
    STANDARD.encode(config)
}

/// Instance types offered by the adapter. EC2 has no catalog call with
/// these attributes, so the list is maintained here.
fn instance_types() -> Vec<Flavor> {
    [
        ("t2.nano", 512, 1),
        ("t2.micro", 1024, 1),
        ("t2.small", 2048, 1),
        ("t2.medium", 4096, 2),
        ("t2.large", 8192, 2),
        ("m4.large", 8192, 2),
        ("m4.xlarge", 16384, 4),
        ("m4.2xlarge", 32768, 8),
        ("m4.4xlarge", 65536, 16),
        ("m4.10xlarge", 163840, 40),
        ("m3.medium", 3840, 1),
        ("m3.large", 7680, 2),
        ("m3.xlarge", 15360, 4),
        ("m3.2xlarge", 30720, 8),
    ]
    .into_iter()
    .map(|(name, memory_mb, num_cores)| Flavor {
        id: name.to_string(),
        name: name.to_string(),
        memory_mb,
        num_cores,
        ..Default::default()
    })
    .collect()
}

impl Ec2 {
    pub fn new(api: Arc<dyn Ec2Api>) -> Self {
        Self {
            api,
            reporter: log_reporter(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CleanupReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn region_of<'a>(&self, instance: &'a Instance) -> &'a str {
        if instance.region.is_empty() {
            DEFAULT_REGION
        } else {
            &instance.region
        }
    }

    async fn describe_instance(&self, region: &str, instance_id: &str) -> Result<Ec2Instance> {
        let mut instances = self
            .api
            .describe_instances(region, &[instance_id.to_string()])
            .await?;
        match instances.len() {
            1 => Ok(instances.remove(0)),
            0 => Err(ComputeError::not_found(format!(
                "instance {} not found in {}",
                instance_id, region
            ))),
            n => Err(ComputeError::provider(
                None,
                format!("DescribeInstances returned {} instances for {}", n, instance_id),
            )),
        }
    }

    /// Terminates surplus instances of a reservation that should hold one.
    async fn terminate_all(&self, region: &str, instances: &[Ec2Instance]) {
        for instance in instances {
            best_effort(
                self.reporter.as_ref(),
                "terminate instance",
                &instance.instance_id,
                self.api.terminate_instance(region, &instance.instance_id),
            )
            .await;
        }
    }
}

#[async_trait]
impl ComputeService for Ec2 {
    async fn create_instance(&self, instance: &Instance) -> Result<Instance> {
        let region = self.region_of(instance);
        let image = get_matching_image_id(self, &instance.image).await?;
        let (image_region, image_id) = decode_region_id(&image, region)?;
        if image_region != region {
            return Err(ComputeError::validation(format!(
                "image {} is in {}, instance requested in {}",
                image_id, image_region, region
            )));
        }
        let flavor_id = get_matching_flavor_id(self, &instance.flavor).await?;

        if instance.public_key.id.is_empty() && !instance.public_key.key.is_empty() {
            let keys = Ec2RegionKeys::new(self.api.clone(), region);
            let mut template = instance.clone();
            template.region = region.to_string();
            template.image.id = image_id;
            template.flavor.id = flavor_id;
            return create_with_imported_key(self, &keys, self.reporter.as_ref(), &template).await;
        }

        let password = if instance.password.is_empty() {
            generate_password()
        } else {
            instance.password.clone()
        };
        let request = RunInstanceRequest {
            image_id,
            instance_type: flavor_id,
            user_data: cloud_config(&password),
            volume: (instance.flavor.disk_gb > 0).then(|| EbsVolume {
                size_gb: instance.flavor.disk_gb,
                volume_type: "gp2".to_string(),
                delete_on_termination: true,
            }),
            key_name: (!instance.public_key.id.is_empty()).then(|| instance.public_key.id.clone()),
        };

        tracing::info!(
            "Running {} instance of {} in {}",
            request.instance_type,
            request.image_id,
            region
        );
        let instances = self.api.run_instances(region, &request).await?;
        if instances.len() != 1 {
            self.terminate_all(region, &instances).await;
            return Err(ComputeError::provider(
                None,
                format!(
                    "attempted to provision a single instance, but reservation contains {} instances",
                    instances.len()
                ),
            ));
        }

        let mut created = map_instance(&instances[0], region);
        created.name = if instance.name.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            instance.name.clone()
        };
        created.password = password;
        Ok(created)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        let (region, id) = decode_region_id(instance_id, DEFAULT_REGION)?;
        self.api.terminate_instance(&region, &id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        Err(ComputeError::unsupported("listing EC2 instances across regions"))
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
        let (region, id) = decode_region_id(instance_id, DEFAULT_REGION)?;
        let instance = self.describe_instance(&region, &id).await?;
        Ok(map_instance(&instance, &region))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        let (region, id) = decode_region_id(instance_id, DEFAULT_REGION)?;
        self.api.start_instance(&region, &id).await
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        let (region, id) = decode_region_id(instance_id, DEFAULT_REGION)?;
        self.api.stop_instance(&region, &id).await
    }

    async fn reboot_instance(&self, instance_id: &str) -> Result<()> {
        let (region, id) = decode_region_id(instance_id, DEFAULT_REGION)?;
        self.api.reboot_instance(&region, &id).await
    }
}

#[async_trait]
impl ImageService for Ec2 {
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
                let (region, instance_id) =
                    decode_region_id(&image.source_instance, DEFAULT_REGION)?;
                let name = if image.name.is_empty() {
                    DEFAULT_NAME
                } else {
                    image.name.as_str()
                };
                let image_id = self.api.create_image(&region, &instance_id, name).await?;
                Ok(Image {
                    id: encode_region_id(&region, &image_id),
                    name: image.name.clone(),
                    regions: vec![region],
                    status: Some(ImageStatus::Pending),
                    source_instance: image.source_instance.clone(),
                    ..Default::default()
                })
            }
        }
    }

    async fn find_image(&self, _image: &Image) -> Result<String> {
        Err(ComputeError::unsupported("finding EC2 images"))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        Err(ComputeError::unsupported("listing EC2 images"))
    }

    async fn get_image(&self, image_id: &str) -> Result<Image> {
        let (region, id) = decode_region_id(image_id, DEFAULT_REGION)?;
        let images = self.api.describe_images(&region, &[id.clone()]).await?;
        match images.as_slice() {
            [image] => Ok(map_image(image, &region)),
            [] => Err(ComputeError::not_found(format!("image {} not found in {}", id, region))),
            many => Err(ComputeError::provider(
                None,
                format!(
                    "DescribeImages returned {} images, but expected a single image",
                    many.len()
                ),
            )),
        }
    }

    async fn delete_image(&self, _image_id: &str) -> Result<()> {
        Err(ComputeError::unsupported("deleting EC2 images"))
    }
}

#[async_trait]
impl FlavorService for Ec2 {
    async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        Ok(instance_types())
    }

    async fn find_flavor(&self, flavor: &Flavor) -> Result<String> {
        Ok(match_flavor(flavor, &instance_types()))
    }
}

impl Provider for Ec2 {
    fn name(&self) -> &str {
        "ec2"
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
