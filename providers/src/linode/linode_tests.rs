#[cfg(test)]
mod tests {
    use crate::linode::*;
    use async_trait::async_trait;
    use cloug_common::{
        ComputeError, ComputeService, ErrorKind, Flavor, FlavorService, Image, ImageService,
        ImageStatus, Instance, InstanceStatus, RecordingReporter, Result,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory Linode API recording every call. `fail` names the call that errors.
    #[derive(Default)]
    struct FakeLinode {
        calls: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        next_disk: AtomicU64,
        passwords: Mutex<Vec<String>>,
    }

    impl FakeLinode {
        fn failing(fail: &[&'static str]) -> Self {
            Self {
                fail: fail.to_vec(),
                ..Default::default()
            }
        }

        fn record(&self, name: &'static str, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail.contains(&name) {
                return Err(ComputeError::provider(
                    Some("400".to_string()),
                    format!("{} rejected", name),
                ));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LinodeApi for FakeLinode {
        async fn list_kernels(&self) -> Result<Vec<Kernel>> {
            self.record("list_kernels", "list_kernels".to_string())?;
            Ok(vec![
                Kernel {
                    id: 137,
                    label: "Latest 32 bit (4.1.5-x86-linode80)".to_string(),
                },
                Kernel {
                    id: 138,
                    label: "Latest 64 bit (4.1.5-x86_64-linode61)".to_string(),
                },
            ])
        }

        async fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
            self.record("list_datacenters", "list_datacenters".to_string())?;
            Ok(vec![
                Datacenter {
                    id: 2,
                    abbreviation: "newark".to_string(),
                },
                Datacenter {
                    id: 7,
                    abbreviation: "london".to_string(),
                },
            ])
        }

        async fn list_plans(&self) -> Result<Vec<Plan>> {
            self.record("list_plans", "list_plans".to_string())?;
            Ok(vec![
                Plan {
                    id: 1,
                    label: "Linode 1024".to_string(),
                    cores: 1,
                    ram: 1024,
                    disk: 24,
                    bandwidth: 2000,
                },
                Plan {
                    id: 2,
                    label: "Linode 4096".to_string(),
                    cores: 2,
                    ram: 4096,
                    disk: 48,
                    bandwidth: 3000,
                },
            ])
        }

        async fn create_linode(&self, datacenter_id: u64, plan_id: u64) -> Result<u64> {
            self.record(
                "create_linode",
                format!("create_linode {} {}", datacenter_id, plan_id),
            )?;
            Ok(1000)
        }

        async fn delete_linode(&self, linode_id: u64, skip_checks: bool) -> Result<()> {
            self.record(
                "delete_linode",
                format!("delete_linode {} {}", linode_id, skip_checks),
            )
        }

        async fn list_linodes(&self) -> Result<Vec<LinodeInfo>> {
            self.record("list_linodes", "list_linodes".to_string())?;
            Ok(vec![
                linode_info(1, "Running"),
                linode_info(2, "Powered Off"),
                linode_info(3, "Brand New"),
            ])
        }

        async fn get_linode(&self, linode_id: u64) -> Result<LinodeInfo> {
            self.record("get_linode", format!("get_linode {}", linode_id))?;
            Ok(linode_info(linode_id, "Running"))
        }

        async fn list_ips(&self, linode_id: u64) -> Result<Vec<LinodeIp>> {
            self.record("list_ips", format!("list_ips {}", linode_id))?;
            Ok(vec![
                LinodeIp {
                    address: "192.168.130.4".to_string(),
                    is_public: false,
                },
                LinodeIp {
                    address: "198.51.100.4".to_string(),
                    is_public: true,
                },
            ])
        }

        async fn boot_linode(&self, linode_id: u64) -> Result<()> {
            self.record("boot_linode", format!("boot_linode {}", linode_id))
        }

        async fn shutdown_linode(&self, linode_id: u64) -> Result<()> {
            self.record("shutdown_linode", format!("shutdown_linode {}", linode_id))
        }

        async fn reboot_linode(&self, linode_id: u64) -> Result<()> {
            self.record("reboot_linode", format!("reboot_linode {}", linode_id))
        }

        async fn create_disk(&self, linode_id: u64, disk: &DiskSpec) -> Result<u64> {
            let name = if disk.source == DiskSource::Swap {
                "create_swap"
            } else {
                "create_root"
            };
            self.record(
                name,
                format!(
                    "create_disk {} {} {:?} {}",
                    linode_id, disk.label, disk.source, disk.size_mb
                ),
            )?;
            self.passwords
                .lock()
                .unwrap()
                .push(disk.root_password.clone());
            Ok(501 + self.next_disk.fetch_add(1, Ordering::SeqCst))
        }

        async fn list_disks(&self, linode_id: u64) -> Result<Vec<Disk>> {
            self.record("list_disks", format!("list_disks {}", linode_id))?;
            Ok(vec![
                Disk {
                    id: 7,
                    disk_type: "swap".to_string(),
                },
                Disk {
                    id: 8,
                    disk_type: "ext4".to_string(),
                },
            ])
        }

        async fn create_config(
            &self,
            linode_id: u64,
            kernel_id: u64,
            label: &str,
            disk_ids: &[u64],
        ) -> Result<u64> {
            self.record(
                "create_config",
                format!(
                    "create_config {} {} {} {:?}",
                    linode_id, kernel_id, label, disk_ids
                ),
            )?;
            Ok(77)
        }

        async fn imagize_disk(&self, linode_id: u64, disk_id: u64, description: &str) -> Result<u64> {
            self.record(
                "imagize_disk",
                format!("imagize_disk {} {} {}", linode_id, disk_id, description),
            )?;
            Ok(900)
        }

        async fn list_images(&self) -> Result<Vec<LinodeImage>> {
            self.record("list_images", "list_images".to_string())?;
            Ok(vec![LinodeImage {
                id: 900,
                label: "golden".to_string(),
                min_size: 2048,
                status: "creating".to_string(),
            }])
        }

        async fn get_image(&self, image_id: u64) -> Result<LinodeImage> {
            self.record("get_image", format!("get_image {}", image_id))?;
            Ok(LinodeImage {
                id: image_id,
                label: "golden".to_string(),
                min_size: 2048,
                status: "available".to_string(),
            })
        }

        async fn delete_image(&self, image_id: u64) -> Result<()> {
            self.record("delete_image", format!("delete_image {}", image_id))
        }

        async fn list_distributions(&self) -> Result<Vec<Distribution>> {
            self.record("list_distributions", "list_distributions".to_string())?;
            Ok(vec![Distribution {
                id: 130,
                label: "Debian 8".to_string(),
            }])
        }
    }

    fn linode_info(id: u64, status: &str) -> LinodeInfo {
        LinodeInfo {
            id,
            label: format!("linode{}", id),
            plan_id: 1,
            total_hd: 24576,
            total_ram: 1024,
            status: status.to_string(),
        }
    }

    fn template() -> Instance {
        Instance {
            image: Image {
                id: "distribution:130".to_string(),
                ..Default::default()
            },
            flavor: Flavor {
                id: "1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_instance_provisions_in_order() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let created = linode.create_instance(&template()).await.unwrap();

        assert_eq!(created.id, "1000");
        assert_eq!(created.region, "newark");
        assert_eq!(created.password.len(), 16);
        assert_eq!(
            api.calls(),
            vec![
                "list_plans",
                "list_kernels",
                "list_datacenters",
                "create_linode 2 1",
                "create_disk 1000 cloug Distribution(130) 9728",
                "create_disk 1000 cloug-swap Swap 512",
                "create_config 1000 138 cloug [501, 502]",
                "boot_linode 1000",
            ]
        );
        assert_eq!(api.passwords.lock().unwrap()[0], created.password);
    }

    #[tokio::test]
    async fn test_create_instance_from_image_with_region_and_storage() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let mut instance = template();
        instance.image.id = "image:900".to_string();
        instance.region = "london".to_string();
        instance.password = "hunter2hunter2".to_string();
        instance.flavor = Flavor {
            id: "2".to_string(),
            disk_gb: 20,
            ..Default::default()
        };
        let created = linode.create_instance(&instance).await.unwrap();

        assert_eq!(created.password, "hunter2hunter2");
        let calls = api.calls();
        assert!(calls.contains(&"create_linode 7 2".to_string()));
        assert!(calls.contains(&"create_disk 1000 cloug Image(900) 18432".to_string()));
        assert!(calls.contains(&"create_disk 1000 cloug-swap Swap 2048".to_string()));
    }

    #[tokio::test]
    async fn test_failed_swap_disk_deletes_linode() {
        let api = Arc::new(FakeLinode::failing(&["create_swap"]));
        let reporter = RecordingReporter::new();
        let linode = Linode::new(api.clone()).with_reporter(reporter.clone());

        let err = linode.create_instance(&template()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("failed to create swap disk"));
        let calls = api.calls();
        assert_eq!(calls.last().unwrap(), "delete_linode 1000 false");
        assert!(!calls.iter().any(|call| call.starts_with("create_config")));
        assert!(!calls.iter().any(|call| call.starts_with("boot_linode")));
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_primary_error() {
        let api = Arc::new(FakeLinode::failing(&["create_config", "delete_linode"]));
        let reporter = RecordingReporter::new();
        let linode = Linode::new(api.clone()).with_reporter(reporter.clone());

        let err = linode.create_instance(&template()).await.unwrap_err();

        assert!(err.to_string().contains("create_config rejected"));
        let events = reporter.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "delete linode");
        assert_eq!(events[0].resource, "1000");
        assert!(events[0].error.to_string().contains("delete_linode rejected"));
    }

    #[tokio::test]
    async fn test_boot_failure_does_not_fail_create() {
        let api = Arc::new(FakeLinode::failing(&["boot_linode"]));
        let linode = Linode::new(api.clone());

        let created = linode.create_instance(&template()).await.unwrap();
        assert_eq!(created.id, "1000");
        assert!(!api.calls().iter().any(|call| call.starts_with("delete_linode")));
    }

    #[tokio::test]
    async fn test_resolution_failures_happen_before_creation() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let mut unknown_region = template();
        unknown_region.region = "tokyo".to_string();
        let err = linode.create_instance(&unknown_region).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut iso = template();
        iso.image.id = "iso:12".to_string();
        let err = linode.create_instance(&iso).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidId);

        let mut no_image = template();
        no_image.image.id.clear();
        let err = linode.create_instance(&no_image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("error finding image"));

        let mut too_small = template();
        too_small.flavor = Flavor {
            id: "2".to_string(),
            disk_gb: 2,
            ..Default::default()
        };
        let err = linode.create_instance(&too_small).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut missing_plan = template();
        missing_plan.flavor.id = "99".to_string();
        let err = linode.create_instance(&missing_plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(!api
            .calls()
            .iter()
            .any(|call| call.starts_with("create_linode")));
    }

    #[tokio::test]
    async fn test_list_and_get_instances() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let statuses: Vec<InstanceStatus> = linode
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|instance| instance.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                InstanceStatus::Online,
                InstanceStatus::Offline,
                InstanceStatus::Other("brand new".to_string()),
            ]
        );

        let instance = linode.get_instance("5").await.unwrap();
        assert_eq!(instance.ip, "198.51.100.4");
        assert_eq!(instance.private_ip, "192.168.130.4");
        assert_eq!(instance.flavor.disk_gb, 24);
        assert_eq!(instance.flavor.id, "1");

        let err = linode.get_instance("five").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidId);
    }

    #[tokio::test]
    async fn test_power_actions() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        linode.start_instance("5").await.unwrap();
        linode.stop_instance("5").await.unwrap();
        linode.reboot_instance("5").await.unwrap();
        linode.delete_instance("5").await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "boot_linode 5",
                "shutdown_linode 5",
                "reboot_linode 5",
                "delete_linode 5 true",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_image_uses_root_disk() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let image = linode
            .create_image(&Image {
                name: "golden".to_string(),
                source_instance: "1000".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(image.id, "image:900");
        assert_eq!(image.status, Some(ImageStatus::Pending));
        assert!(api
            .calls()
            .contains(&"imagize_disk 1000 8 cloug image".to_string()));

        let url = Image {
            source_url: "https://example.com/disk.img".to_string(),
            ..Default::default()
        };
        let err = linode.create_image(&url).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_image_namespaces() {
        let api = Arc::new(FakeLinode::default());
        let linode = Linode::new(api.clone());

        let ids: Vec<String> = linode
            .list_images()
            .await
            .unwrap()
            .into_iter()
            .map(|image| image.id)
            .collect();
        assert_eq!(ids, vec!["image:900", "distribution:130"]);

        let image = linode.get_image("image:900").await.unwrap();
        assert_eq!(image.status, Some(ImageStatus::Available));
        assert_eq!(image.size, 2048 * 1024 * 1024);

        let err = linode.delete_image("distribution:130").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = linode.get_image("900").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidId);

        linode.delete_image("image:900").await.unwrap();
        assert_eq!(api.calls().last().unwrap(), "delete_image 900");
    }

    #[tokio::test]
    async fn test_find_flavor_is_strict() {
        let linode = Linode::new(Arc::new(FakeLinode::default()));

        let exact = Flavor {
            memory_mb: 4096,
            ..Default::default()
        };
        assert_eq!(linode.find_flavor(&exact).await.unwrap(), "2");

        let at_least = Flavor {
            memory_mb: 2048,
            ..Default::default()
        };
        assert_eq!(linode.find_flavor(&at_least).await.unwrap(), "");
    }
}
