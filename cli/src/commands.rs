use crate::{Commands, CreateArgs};
use anyhow::{anyhow, Context, Result};
use cloug_common::{Capability, Flavor, Image, Instance, Provider, PublicKey};
use serde_json::{json, to_value, Value};

/// Fails with the name of the capability the provider lacks.
fn require<'a, T: ?Sized>(
    provider: &dyn Provider,
    capability: Capability,
    service: Option<&'a T>,
) -> Result<&'a T> {
    service.ok_or_else(|| {
        anyhow!(
            "provider {} does not support the {} capability",
            provider.name(),
            capability
        )
    })
}

pub(crate) fn instance_template(args: &CreateArgs) -> Result<Instance> {
    let mut instance = Instance {
        name: args.name.clone().unwrap_or_default(),
        region: args.region.clone().unwrap_or_default(),
        image: Image {
            id: args.image.clone().unwrap_or_default(),
            ..Default::default()
        },
        flavor: Flavor {
            id: args.flavor.clone().unwrap_or_default(),
            num_cores: args.cores.unwrap_or_default(),
            memory_mb: args.memory_mb.unwrap_or_default(),
            disk_gb: args.disk_gb.unwrap_or_default(),
            ..Default::default()
        },
        ..Default::default()
    };
    if let Some(path) = &args.ssh_key_file {
        let key = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read SSH key file: {}", path.display()))?;
        instance.public_key = PublicKey {
            key,
            ..Default::default()
        };
    }
    Ok(instance)
}

pub(crate) async fn run(provider: &dyn Provider, command: Commands) -> Result<Value> {
    let compute = provider.compute();
    let output = match command {
        Commands::Capabilities => {
            let capabilities: Vec<String> = provider
                .capabilities()
                .iter()
                .map(ToString::to_string)
                .collect();
            json!({ "provider": provider.name(), "capabilities": capabilities })
        }
        Commands::ListInstances => to_value(compute.list_instances().await?)?,
        Commands::GetInstance { id } => to_value(compute.get_instance(&id).await?)?,
        Commands::CreateInstance(args) => {
            let template = instance_template(&args)?;
            let created = compute.create_instance(&template).await?;
            tracing::info!("Created instance {}", created.id);
            to_value(created)?
        }
        Commands::DeleteInstance { id } => {
            compute.delete_instance(&id).await?;
            json!({ "deleted": id })
        }
        Commands::Start { id } => {
            compute.start_instance(&id).await?;
            json!({ "started": id })
        }
        Commands::Stop { id } => {
            compute.stop_instance(&id).await?;
            json!({ "stopped": id })
        }
        Commands::Reboot { id } => {
            compute.reboot_instance(&id).await?;
            json!({ "rebooted": id })
        }
        Commands::ListFlavors => {
            let flavors = require(provider, Capability::Flavor, provider.flavors())?;
            to_value(flavors.list_flavors().await?)?
        }
        Commands::ListImages => {
            let images = require(provider, Capability::Image, provider.images())?;
            to_value(images.list_images().await?)?
        }
    };
    Ok(output)
}
