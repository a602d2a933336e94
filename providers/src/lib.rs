pub mod cloudstack;
pub mod config;
pub mod digitalocean;
pub mod ec2;
pub(crate) mod http;
pub mod linode;
pub mod lobster;
pub mod openstack;
pub mod proxmox;
pub mod solusvm;
pub mod vultr;

pub use cloudstack::CloudStack;
pub use config::{provider_from_config, DigitalOceanConfig, ProviderConfig, ProxmoxAuth, ProxmoxConfig};
pub use digitalocean::DigitalOcean;
pub use ec2::Ec2;
pub use linode::Linode;
pub use lobster::Lobster;
pub use openstack::OpenStack;
pub use proxmox::Proxmox;
pub use solusvm::SolusVm;
pub use vultr::Vultr;
