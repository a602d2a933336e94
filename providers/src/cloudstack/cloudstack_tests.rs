#[cfg(test)]
mod tests {
    use crate::cloudstack::*;
    use async_trait::async_trait;
    use cloug_common::{
        Capability, ComputeError, ComputeService, ErrorKind, Flavor, FlavorService, Instance,
        InstanceStatus, Provider, Result,
    };
    use std::sync::{Arc, Mutex};

    struct FakeCloudStack {
        calls: Mutex<Vec<String>>,
        requests: Mutex<Vec<DeployRequest>>,
        fail: Vec<&'static str>,
    }

    impl FakeCloudStack {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                fail: Vec::new(),
            }
        }

        fn record(&self, name: &'static str, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail.contains(&name) {
                return Err(ComputeError::provider(
                    Some("431".to_string()),
                    format!("{} rejected", name),
                ));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn vm(id: &str, state: &str, addrs: &[&str]) -> CloudStackVm {
        CloudStackVm {
            id: id.to_string(),
            hostname: format!("host-{}", id),
            state: state.to_string(),
            nics: addrs
                .iter()
                .map(|addr| Nic {
                    addr: addr.to_string(),
                })
                .collect(),
        }
    }

    #[async_trait]
    impl CloudStackApi for FakeCloudStack {
        async fn deploy_virtual_machine(&self, request: &DeployRequest) -> Result<Deployment> {
            self.record("deploy_virtual_machine", "deploy_virtual_machine".to_string())?;
            self.requests.lock().unwrap().push(request.clone());
            Ok(Deployment {
                id: "vm-uuid-1".to_string(),
                job_id: "job-uuid-1".to_string(),
            })
        }

        async fn destroy_virtual_machine(&self, vm_id: &str, expunge: bool) -> Result<()> {
            self.record(
                "destroy_virtual_machine",
                format!("destroy_virtual_machine {} expunge={}", vm_id, expunge),
            )
        }

        async fn list_virtual_machines(&self) -> Result<Vec<CloudStackVm>> {
            self.record("list_virtual_machines", "list_virtual_machines".to_string())?;
            Ok(vec![
                vm("a", "Running", &["10.1.1.5", "203.0.113.5"]),
                vm("b", "Stopped", &[]),
                vm("c", "Starting", &["2001:db8::c", "203.0.113.7"]),
            ])
        }

        async fn get_virtual_machine(&self, vm_id: &str) -> Result<CloudStackVm> {
            self.record("get_virtual_machine", format!("get_virtual_machine {}", vm_id))?;
            Ok(vm(vm_id, "Running", &["203.0.113.5", "192.168.0.5"]))
        }

        async fn start_virtual_machine(&self, vm_id: &str) -> Result<()> {
            self.record("start_virtual_machine", format!("start_virtual_machine {}", vm_id))
        }

        async fn stop_virtual_machine(&self, vm_id: &str) -> Result<()> {
            self.record("stop_virtual_machine", format!("stop_virtual_machine {}", vm_id))
        }

        async fn reboot_virtual_machine(&self, vm_id: &str) -> Result<()> {
            self.record("reboot_virtual_machine", format!("reboot_virtual_machine {}", vm_id))
        }

        async fn list_service_offerings(&self) -> Result<Vec<ServiceOffering>> {
            self.record("list_service_offerings", "list_service_offerings".to_string())?;
            Ok(vec![
                ServiceOffering {
                    id: "so-small".to_string(),
                    name: "Small".to_string(),
                    cpu_number: 1,
                    memory: 512,
                },
                ServiceOffering {
                    id: "so-medium".to_string(),
                    name: "Medium".to_string(),
                    cpu_number: 2,
                    memory: 2048,
                },
            ])
        }

        async fn list_disk_offerings(&self) -> Result<Vec<DiskOffering>> {
            self.record("list_disk_offerings", "list_disk_offerings".to_string())?;
            Ok(vec![
                DiskOffering {
                    id: "do-10".to_string(),
                    name: "10 GB".to_string(),
                    disk_size: 10,
                },
                DiskOffering {
                    id: "do-50".to_string(),
                    name: "50 GB".to_string(),
                    disk_size: 50,
                },
            ])
        }
    }

    fn template() -> Instance {
        let mut instance = Instance::default();
        instance.name = "web".to_string();
        instance.image.id = "tmpl-centos".to_string();
        instance
    }

    #[tokio::test]
    async fn test_create_resolves_offerings_and_returns_job() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone()).with_network("net-default");
        let mut instance = template();
        instance.flavor = Flavor {
            num_cores: 2,
            memory_mb: 2048,
            disk_gb: 50,
            ..Default::default()
        };

        let created = cs.create_instance(&instance).await.unwrap();
        assert_eq!(created.id, "vm-uuid-1");
        assert_eq!(created.job_id, "job-uuid-1");
        assert_eq!(created.name, "web");
        assert_eq!(
            fake.requests.lock().unwrap()[0],
            DeployRequest {
                service_offering: "so-medium".to_string(),
                disk_offering: "do-50".to_string(),
                template: "tmpl-centos".to_string(),
                network: "net-default".to_string(),
                name: "web".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_instance_network_overrides_default() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone()).with_network("net-default");
        let mut instance = template();
        instance.network_id = "net-private".to_string();
        instance.flavor.id = "so-small/do-10".to_string();

        cs.create_instance(&instance).await.unwrap();
        let sent = fake.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.network, "net-private");
        assert_eq!(sent.service_offering, "so-small");
        // an explicit flavor ID skips the offering lookups
        assert_eq!(fake.calls(), vec!["deploy_virtual_machine"]);
    }

    #[tokio::test]
    async fn test_create_requires_image_id() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone());
        let err = cs.create_instance(&Instance::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_malformed_flavor_id() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone());
        for flavor_id in ["so-small", "so-small/", "/do-10", "a/b/c"] {
            let mut instance = template();
            instance.flavor.id = flavor_id.to_string();
            let err = cs.create_instance(&instance).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidId, "{}", flavor_id);
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_find_flavor_defaults() {
        let cs = CloudStack::new(Arc::new(FakeCloudStack::new()));
        assert_eq!(
            cs.find_flavor(&Flavor::default()).await.unwrap(),
            "so-small/do-10"
        );
    }

    #[tokio::test]
    async fn test_find_flavor_without_match_is_empty() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone());
        let no_service = Flavor {
            num_cores: 8,
            ..Default::default()
        };
        assert_eq!(cs.find_flavor(&no_service).await.unwrap(), "");
        // disk offerings are not consulted once the service offering misses
        assert_eq!(fake.calls(), vec!["list_service_offerings"]);

        let no_disk = Flavor {
            disk_gb: 25,
            ..Default::default()
        };
        assert_eq!(cs.find_flavor(&no_disk).await.unwrap(), "");

        let mut instance = template();
        instance.flavor = no_disk;
        let err = cs.create_instance(&instance).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(fake.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offering_listing_failure_propagates() {
        let mut fake = FakeCloudStack::new();
        fake.fail = vec!["list_disk_offerings"];
        let cs = CloudStack::new(Arc::new(fake));
        let err = cs.find_flavor(&Flavor::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn test_list_instances_classifies_addresses() {
        let cs = CloudStack::new(Arc::new(FakeCloudStack::new()));
        let instances = cs.list_instances().await.unwrap();

        assert_eq!(instances[0].status, InstanceStatus::Online);
        assert_eq!(instances[0].ip, "203.0.113.5");
        assert_eq!(instances[0].private_ip, "10.1.1.5");

        assert_eq!(instances[1].status, InstanceStatus::Offline);
        assert!(instances[1].ip.is_empty());

        assert_eq!(instances[2].status, InstanceStatus::from_provider("starting"));
        assert_eq!(instances[2].ip, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_get_and_power() {
        let fake = Arc::new(FakeCloudStack::new());
        let cs = CloudStack::new(fake.clone());
        let instance = cs.get_instance("x").await.unwrap();
        assert_eq!(instance.name, "host-x");
        assert_eq!(instance.private_ip, "192.168.0.5");

        cs.start_instance("x").await.unwrap();
        cs.stop_instance("x").await.unwrap();
        cs.reboot_instance("x").await.unwrap();
        cs.delete_instance("x").await.unwrap();
        assert_eq!(
            fake.calls()[1..],
            [
                "start_virtual_machine x",
                "stop_virtual_machine x",
                "reboot_virtual_machine x",
                "destroy_virtual_machine x expunge=true",
            ]
        );
    }

    #[tokio::test]
    async fn test_list_flavors_is_unsupported() {
        let cs = CloudStack::new(Arc::new(FakeCloudStack::new()));
        let err = cs.list_flavors().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_capabilities() {
        let cs = CloudStack::new(Arc::new(FakeCloudStack::new()));
        assert_eq!(cs.name(), "cloudstack");
        let caps: Vec<_> = cs.capabilities().into_iter().collect();
        assert_eq!(caps, vec![Capability::Compute, Capability::Flavor]);
    }
}
