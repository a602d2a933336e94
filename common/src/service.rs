use crate::compute::{Address, Flavor, Image, Instance};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use strum::{Display, EnumIter, IntoEnumIterator};

/// Core lifecycle operations every provider exposes.
///
/// `create_instance` is never retried by this layer: a retried create can
/// allocate a duplicate billable resource.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// All fields of `instance` are optional hints; `id` and `job_id` are ignored.
    async fn create_instance(&self, instance: &Instance) -> Result<Instance>;
    async fn delete_instance(&self, instance_id: &str) -> Result<()>;
    async fn list_instances(&self) -> Result<Vec<Instance>>;
    /// May return more detail than `list_instances`.
    async fn get_instance(&self, instance_id: &str) -> Result<Instance>;
    async fn start_instance(&self, instance_id: &str) -> Result<()>;
    async fn stop_instance(&self, instance_id: &str) -> Result<()>;
    async fn reboot_instance(&self, instance_id: &str) -> Result<()>;
}

#[async_trait]
pub trait VncService: Send + Sync {
    /// URL of a VNC (or similar) console for the instance.
    async fn get_vnc(&self, instance_id: &str) -> Result<String>;
}

#[async_trait]
pub trait RenameService: Send + Sync {
    async fn rename_instance(&self, instance_id: &str, name: &str) -> Result<()>;
}

#[async_trait]
pub trait ReimageService: Send + Sync {
    async fn reimage_instance(&self, instance_id: &str, image: &Image) -> Result<()>;
}

#[async_trait]
pub trait ResizeService: Send + Sync {
    async fn resize_instance(&self, instance_id: &str, flavor: &Flavor) -> Result<()>;
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Snapshots `source_instance` or fetches `source_url`; exactly one must be set.
    async fn create_image(&self, image: &Image) -> Result<Image>;
    /// ID of an image similar to `image`, or an empty string when nothing matches.
    async fn find_image(&self, image: &Image) -> Result<String>;
    async fn list_images(&self) -> Result<Vec<Image>>;
    async fn get_image(&self, image_id: &str) -> Result<Image>;
    async fn delete_image(&self, image_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AddressService: Send + Sync {
    async fn list_instance_addresses(&self, instance_id: &str) -> Result<Vec<Address>>;
    async fn add_address_to_instance(&self, instance_id: &str, address: &Address) -> Result<()>;
    async fn remove_address_from_instance(&self, instance_id: &str, address_id: &str)
        -> Result<()>;
    async fn set_address_hostname(&self, address_id: &str, hostname: &str) -> Result<()>;
}

#[async_trait]
pub trait FlavorService: Send + Sync {
    async fn list_flavors(&self) -> Result<Vec<Flavor>>;
    /// ID of the first catalog flavor matching `flavor`, or an empty string.
    async fn find_flavor(&self, flavor: &Flavor) -> Result<String>;
}

/// Named capability tags a provider can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
    Compute,
    Vnc,
    Rename,
    Reimage,
    Resize,
    Image,
    Address,
    Flavor,
}

/// A configured provider adapter.
///
/// Optional capabilities are exposed through accessors returning `None`
/// when the adapter does not implement them, so callers check support
/// before invoking instead of hitting an unimplemented method.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self) -> &dyn ComputeService;

    fn vnc(&self) -> Option<&dyn VncService> {
        None
    }

    fn rename(&self) -> Option<&dyn RenameService> {
        None
    }

    fn reimage(&self) -> Option<&dyn ReimageService> {
        None
    }

    fn resize(&self) -> Option<&dyn ResizeService> {
        None
    }

    fn images(&self) -> Option<&dyn ImageService> {
        None
    }

    fn addresses(&self) -> Option<&dyn AddressService> {
        None
    }

    fn flavors(&self) -> Option<&dyn FlavorService> {
        None
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Compute => true,
            Capability::Vnc => self.vnc().is_some(),
            Capability::Rename => self.rename().is_some(),
            Capability::Reimage => self.reimage().is_some(),
            Capability::Resize => self.resize().is_some(),
            Capability::Image => self.images().is_some(),
            Capability::Address => self.addresses().is_some(),
            Capability::Flavor => self.flavors().is_some(),
        }
    }

    fn capabilities(&self) -> BTreeSet<Capability> {
        Capability::iter().filter(|cap| self.supports(*cap)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComputeError;

    struct Stub;

    #[async_trait]
    impl ComputeService for Stub {
        async fn create_instance(&self, _instance: &Instance) -> Result<Instance> {
            Err(ComputeError::unsupported("create"))
        }
        async fn delete_instance(&self, _instance_id: &str) -> Result<()> {
            Ok(())
        }
        async fn list_instances(&self) -> Result<Vec<Instance>> {
            Ok(vec![])
        }
        async fn get_instance(&self, instance_id: &str) -> Result<Instance> {
            Err(ComputeError::not_found(instance_id))
        }
        async fn start_instance(&self, _instance_id: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_instance(&self, _instance_id: &str) -> Result<()> {
            Ok(())
        }
        async fn reboot_instance(&self, _instance_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl VncService for Stub {
        async fn get_vnc(&self, _instance_id: &str) -> Result<String> {
            Ok("vnc://127.0.0.1:5900".to_string())
        }
    }

    struct ComputeOnly(Stub);

    impl Provider for ComputeOnly {
        fn name(&self) -> &str {
            "compute-only"
        }
        fn compute(&self) -> &dyn ComputeService {
            &self.0
        }
    }

    struct WithConsole(Stub);

    impl Provider for WithConsole {
        fn name(&self) -> &str {
            "with-console"
        }
        fn compute(&self) -> &dyn ComputeService {
            &self.0
        }
        fn vnc(&self) -> Option<&dyn VncService> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_capabilities_default_to_compute_only() {
        let provider = ComputeOnly(Stub);
        assert_eq!(
            provider.capabilities(),
            BTreeSet::from([Capability::Compute])
        );
        assert!(!provider.supports(Capability::Flavor));
        assert!(provider.flavors().is_none());
    }

    #[tokio::test]
    async fn test_optional_capability_is_queryable() {
        let provider = WithConsole(Stub);
        assert!(provider.supports(Capability::Vnc));
        assert_eq!(
            provider.capabilities(),
            BTreeSet::from([Capability::Compute, Capability::Vnc])
        );
        let url = provider.vnc().unwrap().get_vnc("1").await.unwrap();
        assert_eq!(url, "vnc://127.0.0.1:5900");
    }

    #[test]
    fn test_capability_names() {
        assert_eq!(Capability::Vnc.to_string(), "vnc");
        assert_eq!(Capability::iter().count(), 8);
    }
}
