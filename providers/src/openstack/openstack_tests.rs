#[cfg(test)]
mod tests {
    use crate::openstack::*;
    use async_trait::async_trait;
    use cloug_common::{
        Capability, ComputeError, ComputeService, ErrorKind, Exhaustion, Flavor, FlavorService,
        Image, ImageService, ImageStatus, Instance, InstanceStatus, Provider, ReimageService,
        Result, RetryPolicy, TaskSpawner,
    };
    use futures::future::BoxFuture;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct FakeOpenStack {
        calls: Mutex<Vec<String>>,
        requests: Mutex<Vec<ServerCreate>>,
        uploads: Mutex<Vec<ImageUpload>>,
        floating_ips: Vec<FloatingIp>,
        /// Association attempts that fail before one succeeds.
        associate_failures: AtomicU32,
        addresses: BTreeMap<String, Vec<String>>,
        fail: Vec<&'static str>,
    }

    impl FakeOpenStack {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
                uploads: Mutex::new(Vec::new()),
                floating_ips: vec![
                    floating("198.51.100.1", Some("other-server")),
                    floating("198.51.100.2", None),
                    floating("198.51.100.3", Some("")),
                ],
                associate_failures: AtomicU32::new(0),
                addresses: BTreeMap::new(),
                fail: Vec::new(),
            }
        }

        fn record(&self, name: &'static str, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail.contains(&name) {
                return Err(ComputeError::provider(
                    Some("409".to_string()),
                    format!("{} rejected", name),
                ));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    fn floating(ip: &str, instance_id: Option<&str>) -> FloatingIp {
        FloatingIp {
            ip: ip.to_string(),
            instance_id: instance_id.map(str::to_string),
        }
    }

    fn server(id: &str, status: &str) -> Server {
        Server {
            id: id.to_string(),
            name: format!("name-{}", id),
            status: status.to_string(),
            access_ipv4: String::new(),
        }
    }

    #[async_trait]
    impl OpenStackApi for FakeOpenStack {
        async fn create_server(&self, request: &ServerCreate) -> Result<Server> {
            self.record("create_server", format!("create_server {}", request.name))?;
            self.requests.lock().unwrap().push(request.clone());
            Ok(server("srv-1", "BUILD"))
        }

        async fn delete_server(&self, server_id: &str) -> Result<()> {
            self.record("delete_server", format!("delete_server {}", server_id))
        }

        async fn list_servers(&self) -> Result<Vec<Server>> {
            self.record("list_servers", "list_servers".to_string())?;
            Ok(vec![
                server("a", "ACTIVE"),
                server("b", "SHUTOFF"),
                server("c", "BUILD"),
            ])
        }

        async fn get_server(&self, server_id: &str) -> Result<Server> {
            self.record("get_server", format!("get_server {}", server_id))?;
            if server_id == "missing" {
                return Err(ComputeError::not_found("server missing not found"));
            }
            Ok(server(server_id, "ACTIVE"))
        }

        async fn list_server_addresses(&self, server_id: &str) -> Result<BTreeMap<String, Vec<String>>> {
            self.record("list_server_addresses", format!("list_server_addresses {}", server_id))?;
            Ok(self.addresses.clone())
        }

        async fn start_server(&self, server_id: &str) -> Result<()> {
            self.record("start_server", format!("start_server {}", server_id))
        }

        async fn stop_server(&self, server_id: &str) -> Result<()> {
            self.record("stop_server", format!("stop_server {}", server_id))
        }

        async fn reboot_server(&self, server_id: &str, hard: bool) -> Result<()> {
            self.record("reboot_server", format!("reboot_server {} hard={}", server_id, hard))
        }

        async fn vnc_console_url(&self, server_id: &str) -> Result<String> {
            self.record("vnc_console_url", format!("vnc_console_url {}", server_id))?;
            Ok(format!("https://cloud.example.com:6080/vnc_auto.html?token={}", server_id))
        }

        async fn rename_server(&self, server_id: &str, name: &str) -> Result<()> {
            self.record("rename_server", format!("rename_server {} {}", server_id, name))
        }

        async fn rebuild_server(&self, server_id: &str, image_id: &str) -> Result<()> {
            self.record("rebuild_server", format!("rebuild_server {} {}", server_id, image_id))
        }

        async fn create_server_image(&self, server_id: &str, name: &str) -> Result<String> {
            self.record("create_server_image", format!("create_server_image {} {}", server_id, name))?;
            Ok("img-snap".to_string())
        }

        async fn list_floating_ips(&self) -> Result<Vec<FloatingIp>> {
            self.record("list_floating_ips", "list_floating_ips".to_string())?;
            Ok(self.floating_ips.clone())
        }

        async fn associate_floating_ip(&self, server_id: &str, ip: &str) -> Result<()> {
            self.record("associate_floating_ip", format!("associate_floating_ip {} {}", server_id, ip))?;
            let remaining = self.associate_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.associate_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ComputeError::transport("neutron unavailable"));
            }
            Ok(())
        }

        async fn upload_image(&self, upload: &ImageUpload) -> Result<GlanceImage> {
            self.record("upload_image", format!("upload_image {}", upload.name))?;
            self.uploads.lock().unwrap().push(upload.clone());
            Ok(GlanceImage {
                id: "img-up".to_string(),
                name: upload.name.clone(),
                status: "queued".to_string(),
                visibility: "private".to_string(),
                size: 0,
            })
        }

        async fn get_image(&self, image_id: &str) -> Result<GlanceImage> {
            self.record("get_image", format!("get_image {}", image_id))?;
            Ok(GlanceImage {
                id: image_id.to_string(),
                name: "Ubuntu 22.04".to_string(),
                status: if image_id == "img-bad" { "killed" } else { "active" }.to_string(),
                visibility: "public".to_string(),
                size: 2_361_393_152,
            })
        }

        async fn delete_image(&self, image_id: &str) -> Result<()> {
            self.record("delete_image", format!("delete_image {}", image_id))?;
            if image_id == "img-gone" {
                return Err(ComputeError::not_found("image img-gone not found"));
            }
            Ok(())
        }

        async fn list_flavors(&self) -> Result<Vec<NovaFlavor>> {
            self.record("list_flavors", "list_flavors".to_string())?;
            Ok(vec![
                NovaFlavor {
                    id: "1".to_string(),
                    name: "m1.tiny".to_string(),
                    ram: 512,
                    vcpus: 1,
                    disk: 1,
                },
                NovaFlavor {
                    id: "2".to_string(),
                    name: "m1.small".to_string(),
                    ram: 2048,
                    vcpus: 1,
                    disk: 20,
                },
            ])
        }
    }

    /// Collects detached tasks so tests decide when they run.
    #[derive(Default)]
    struct Deferred {
        tasks: Mutex<Vec<(String, BoxFuture<'static, ()>)>>,
    }

    impl Deferred {
        async fn run_all(&self) {
            let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
            for (_, task) in tasks {
                task.await;
            }
        }

        fn labels(&self) -> Vec<String> {
            self.tasks.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
        }
    }

    impl TaskSpawner for Deferred {
        fn spawn(&self, label: &str, task: BoxFuture<'static, ()>) {
            self.tasks.lock().unwrap().push((label.to_string(), task));
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(6, Duration::from_millis(1), Exhaustion::Fail)
    }

    fn adapter(fake: Arc<FakeOpenStack>, spawner: Arc<Deferred>) -> OpenStack {
        OpenStack::new(fake)
            .with_spawner(spawner)
            .with_floating_ip_policy(fast_policy())
    }

    fn template() -> Instance {
        let mut instance = Instance::default();
        instance.image.id = "img-ubuntu".to_string();
        instance.flavor.id = "2".to_string();
        instance
    }

    #[tokio::test]
    async fn test_create_returns_before_floating_ip_association() {
        let fake = Arc::new(FakeOpenStack::new());
        let spawner = Arc::new(Deferred::default());
        let os = adapter(fake.clone(), spawner.clone());

        let mut request = template();
        request.region = "nova-az1".to_string();
        request.network_id = "net-42".to_string();
        let created = os.create_instance(&request).await.unwrap();

        assert_eq!(created.id, "srv-1");
        assert_eq!(created.name, "cloug");
        assert_eq!(created.status, InstanceStatus::from_provider("build"));
        assert_eq!(created.password.len(), 16);
        assert!(created.ip.is_empty());
        assert_eq!(fake.calls(), vec!["create_server cloug".to_string()]);
        assert_eq!(spawner.labels(), vec!["associate floating IP with srv-1".to_string()]);

        let sent = fake.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.image_ref, "img-ubuntu");
        assert_eq!(sent.flavor_ref, "2");
        assert_eq!(sent.admin_pass, created.password);
        assert!(sent.user_data.starts_with("#cloud-config\n"));
        assert!(sent.user_data.contains(&format!("password: {}\n", created.password)));
        assert_eq!(sent.availability_zone.as_deref(), Some("nova-az1"));
        assert_eq!(sent.networks, vec!["net-42".to_string()]);

        spawner.run_all().await;
        assert_eq!(fake.count("associate_floating_ip srv-1 198.51.100.2"), 1);
    }

    #[tokio::test]
    async fn test_create_without_region_or_network() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));
        let mut request = template();
        request.name = "web-1".to_string();
        request.password = "hunter22hunter22".to_string();
        let created = os.create_instance(&request).await.unwrap();

        assert_eq!(created.name, "web-1");
        assert_eq!(created.password, "hunter22hunter22");
        let sent = fake.requests.lock().unwrap()[0].clone();
        assert!(sent.availability_zone.is_none());
        assert!(sent.networks.is_empty());
    }

    #[tokio::test]
    async fn test_floating_ip_association_retries_until_success() {
        let fake = Arc::new(FakeOpenStack::new());
        fake.associate_failures.store(2, Ordering::SeqCst);
        let spawner = Arc::new(Deferred::default());
        let os = adapter(fake.clone(), spawner.clone());

        os.create_instance(&template()).await.unwrap();
        spawner.run_all().await;

        assert_eq!(fake.count("associate_floating_ip"), 3);
        assert_eq!(fake.count("list_floating_ips"), 3);
    }

    #[tokio::test]
    async fn test_floating_ip_prefers_requested_address() {
        let mut fake = FakeOpenStack::new();
        fake.floating_ips.push(floating("203.0.113.9", None));
        let fake = Arc::new(fake);
        let spawner = Arc::new(Deferred::default());
        let os = adapter(fake.clone(), spawner.clone());

        let mut request = template();
        request.ip = "203.0.113.9".to_string();
        os.create_instance(&request).await.unwrap();
        spawner.run_all().await;

        assert_eq!(fake.count("associate_floating_ip srv-1 203.0.113.9"), 1);
        assert_eq!(fake.count("associate_floating_ip srv-1 198.51.100.2"), 0);
    }

    #[tokio::test]
    async fn test_floating_ip_gives_up_without_affecting_create() {
        let mut fake = FakeOpenStack::new();
        fake.floating_ips = vec![floating("198.51.100.1", Some("other-server"))];
        let fake = Arc::new(fake);
        let spawner = Arc::new(Deferred::default());
        let os = adapter(fake.clone(), spawner.clone());

        let created = os.create_instance(&template()).await.unwrap();
        assert_eq!(created.id, "srv-1");
        spawner.run_all().await;

        assert_eq!(fake.count("list_floating_ips"), 6);
        assert_eq!(fake.count("associate_floating_ip"), 0);
    }

    #[tokio::test]
    async fn test_floating_ip_on_tokio_runtime() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = OpenStack::new(fake.clone()).with_floating_ip_policy(fast_policy());
        os.create_instance(&template()).await.unwrap();

        for _ in 0..200 {
            if fake.count("associate_floating_ip") > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(fake.count("associate_floating_ip srv-1 198.51.100.2"), 1);
    }

    #[tokio::test]
    async fn test_create_fails_on_unmatched_flavor() {
        let fake = Arc::new(FakeOpenStack::new());
        let spawner = Arc::new(Deferred::default());
        let os = adapter(fake.clone(), spawner.clone());
        let mut request = template();
        request.flavor = Flavor {
            memory_mb: 4096,
            ..Default::default()
        };

        let err = os.create_instance(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fake.count("create_server"), 0);
        assert!(spawner.labels().is_empty());
    }

    #[tokio::test]
    async fn test_get_instance_classifies_addresses() {
        let mut fake = FakeOpenStack::new();
        fake.addresses.insert(
            "private".to_string(),
            vec!["fd00::5".to_string(), "10.0.0.5".to_string()],
        );
        fake.addresses.insert(
            "public".to_string(),
            vec!["2001:db8::5".to_string(), "198.51.100.5".to_string()],
        );
        let os = adapter(Arc::new(fake), Arc::new(Deferred::default()));

        let instance = os.get_instance("abc").await.unwrap();
        assert_eq!(instance.id, "abc");
        assert_eq!(instance.status, InstanceStatus::Online);
        assert_eq!(instance.ip, "198.51.100.5");
        assert_eq!(instance.private_ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn test_address_lookup_failure_is_tolerated() {
        let mut fake = FakeOpenStack::new();
        fake.fail = vec!["list_server_addresses"];
        let os = adapter(Arc::new(fake), Arc::new(Deferred::default()));

        let instance = os.get_instance("abc").await.unwrap();
        assert!(instance.ip.is_empty());
        assert!(instance.private_ip.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_instance() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        let err = os.get_instance("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_instances_maps_status() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        let statuses: Vec<_> = os
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                InstanceStatus::Online,
                InstanceStatus::Offline,
                InstanceStatus::from_provider("build"),
            ]
        );
    }

    #[tokio::test]
    async fn test_power_operations() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));
        os.start_instance("a").await.unwrap();
        os.stop_instance("a").await.unwrap();
        os.reboot_instance("a").await.unwrap();
        os.delete_instance("a").await.unwrap();
        assert_eq!(
            fake.calls(),
            vec![
                "start_server a",
                "stop_server a",
                "reboot_server a hard=true",
                "delete_server a",
            ]
        );
    }

    #[tokio::test]
    async fn test_rename_vnc_and_reimage() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));

        let url = os.vnc().unwrap().get_vnc("a").await.unwrap();
        assert!(url.ends_with("token=a"));
        os.rename().unwrap().rename_instance("a", "db-1").await.unwrap();
        let image = Image {
            id: "img-debian".to_string(),
            ..Default::default()
        };
        os.reimage_instance("a", &image).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "vnc_console_url a",
                "rename_server a db-1",
                "rebuild_server a img-debian",
            ]
        );
    }

    #[tokio::test]
    async fn test_reimage_without_id_is_unsupported() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));
        let image = Image {
            distribution: "ubuntu".to_string(),
            ..Default::default()
        };
        let err = os.reimage_instance("a", &image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("error finding image"));
        assert_eq!(fake.count("rebuild_server"), 0);
    }

    #[tokio::test]
    async fn test_create_image_from_instance() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));
        let image = os
            .create_image(&Image {
                name: "backup".to_string(),
                source_instance: "srv-1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(image.id, "img-snap");
        assert_eq!(image.status, Some(ImageStatus::Pending));
        assert_eq!(fake.calls(), vec!["create_server_image srv-1 backup"]);
    }

    #[tokio::test]
    async fn test_create_image_from_url_requires_format() {
        let fake = Arc::new(FakeOpenStack::new());
        let os = adapter(fake.clone(), Arc::new(Deferred::default()));
        let mut image = Image {
            name: "alpine".to_string(),
            source_url: "https://dl.example.com/alpine.qcow2".to_string(),
            ..Default::default()
        };

        let err = os.create_image(&image).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("missing image format"));
        assert!(fake.calls().is_empty());

        image.format = "qcow2".to_string();
        let created = os.create_image(&image).await.unwrap();
        assert_eq!(created.id, "img-up");
        assert_eq!(created.status, Some(ImageStatus::Pending));
        assert_eq!(created.format, "qcow2");
        let upload = fake.uploads.lock().unwrap()[0].clone();
        assert_eq!(upload.container_format, "bare");
        assert_eq!(upload.disk_format, "qcow2");
        assert_eq!(upload.copy_from, "https://dl.example.com/alpine.qcow2");
    }

    #[tokio::test]
    async fn test_create_image_needs_exactly_one_origin() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        let neither = os.create_image(&Image::default()).await.unwrap_err();
        assert_eq!(neither.kind(), ErrorKind::Validation);
        let both = os
            .create_image(&Image {
                source_instance: "srv-1".to_string(),
                source_url: "https://dl.example.com/a.iso".to_string(),
                format: "iso".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(both.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_get_image_maps_status_and_visibility() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        let image = os.get_image("img-ubuntu").await.unwrap();
        assert_eq!(image.status, Some(ImageStatus::Available));
        assert!(image.public);
        assert_eq!(image.size, 2_361_393_152);

        let killed = os.get_image("img-bad").await.unwrap();
        assert_eq!(killed.status, Some(ImageStatus::Error));
    }

    #[tokio::test]
    async fn test_delete_image_tolerates_missing() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        os.delete_image("img-gone").await.unwrap();
        os.delete_image("img-old").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_image_propagates_other_errors() {
        let mut fake = FakeOpenStack::new();
        fake.fail = vec!["delete_image"];
        let os = adapter(Arc::new(fake), Arc::new(Deferred::default()));
        let err = os.delete_image("img-old").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
    }

    #[tokio::test]
    async fn test_image_catalog_is_unsupported() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        assert_eq!(
            os.list_images().await.unwrap_err().kind(),
            ErrorKind::Unsupported
        );
        assert_eq!(
            os.find_image(&Image::default()).await.unwrap_err().kind(),
            ErrorKind::Unsupported
        );
    }

    #[tokio::test]
    async fn test_flavors() {
        let os = adapter(Arc::new(FakeOpenStack::new()), Arc::new(Deferred::default()));
        let flavors = os.list_flavors().await.unwrap();
        assert_eq!(flavors.len(), 2);
        assert_eq!(flavors[1].memory_mb, 2048);
        assert_eq!(flavors[1].disk_gb, 20);

        let wanted = Flavor {
            num_cores: 1,
            memory_mb: 512,
            ..Default::default()
        };
        assert_eq!(os.find_flavor(&wanted).await.unwrap(), "1");
        let absent = Flavor {
            memory_mb: 1000,
            ..Default::default()
        };
        assert_eq!(os.find_flavor(&absent).await.unwrap(), "");
    }

    #[test]
    fn test_capabilities() {
        let os = OpenStack::new(Arc::new(FakeOpenStack::new()));
        assert_eq!(os.name(), "openstack");
        let caps: Vec<_> = os.capabilities().into_iter().collect();
        assert_eq!(
            caps,
            vec![
                Capability::Compute,
                Capability::Vnc,
                Capability::Rename,
                Capability::Reimage,
                Capability::Image,
                Capability::Flavor,
            ]
        );
        assert!(os.addresses().is_none());
    }
}
