use async_trait::async_trait;
use cloug_common::Result;

#[derive(Debug, Clone, Default)]
pub struct Ec2Instance {
    pub instance_id: String,
    /// Lifecycle state name, e.g. `pending`, `running`.
    pub state: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Ec2Image {
    pub image_id: String,
    pub name: String,
    pub public: bool,
    pub state: String,
    /// Size of the first EBS mapping in GB.
    pub volume_size_gb: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbsVolume {
    pub size_gb: u32,
    pub volume_type: String,
    pub delete_on_termination: bool,
}

/// `RunInstances` for exactly one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInstanceRequest {
    pub image_id: String,
    pub instance_type: String,
    /// Base64-encoded cloud-config.
    pub user_data: String,
    pub volume: Option<EbsVolume>,
    pub key_name: Option<String>,
}

/// EC2 primitives. Every call is scoped to one region.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn import_key_pair(&self, region: &str, key_name: &str, public_key: &str) -> Result<()>;
    async fn delete_key_pair(&self, region: &str, key_name: &str) -> Result<()>;

    /// Instances of the created reservation.
    async fn run_instances(&self, region: &str, request: &RunInstanceRequest) -> Result<Vec<Ec2Instance>>;
    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()>;
    async fn describe_instances(&self, region: &str, instance_ids: &[String]) -> Result<Vec<Ec2Instance>>;
    async fn start_instance(&self, region: &str, instance_id: &str) -> Result<()>;
    async fn stop_instance(&self, region: &str, instance_id: &str) -> Result<()>;
    async fn reboot_instance(&self, region: &str, instance_id: &str) -> Result<()>;

    /// Registers an AMI from a running or stopped instance, returning its ID.
    async fn create_image(&self, region: &str, instance_id: &str, name: &str) -> Result<String>;
    async fn describe_images(&self, region: &str, image_ids: &[String]) -> Result<Vec<Ec2Image>>;
}
