//! Resolution of abstract image/flavor requests into provider identifiers.

use crate::compute::{Flavor, Image};
use crate::error::{ComputeError, Result};
use crate::service::{FlavorService, ImageService};
use crate::utils::is_subset;

/// ID of the first option in `options` satisfying every constraint of `target`.
///
/// Name must match exactly when set. Regions are only compared when both
/// sides list some, in which case the option must cover all target regions.
/// Non-zero numeric fields must be equal; zero is a wildcard. Returns an
/// empty string when nothing matches.
pub fn match_flavor<'a>(target: &Flavor, options: impl IntoIterator<Item = &'a Flavor>) -> String {
    options
        .into_iter()
        .find(|option| flavor_satisfies(target, option))
        .map(|option| option.id.clone())
        .unwrap_or_default()
}

fn flavor_satisfies(target: &Flavor, option: &Flavor) -> bool {
    if !target.name.is_empty() && target.name != option.name {
        return false;
    }
    if !option.regions.is_empty()
        && !target.regions.is_empty()
        && !is_subset(&option.regions, &target.regions)
    {
        return false;
    }
    let numeric = [
        (target.num_cores, option.num_cores),
        (target.disk_gb, option.disk_gb),
        (target.memory_mb, option.memory_mb),
        (target.transfer_gb, option.transfer_gb),
    ];
    numeric
        .iter()
        .all(|&(wanted, offered)| wanted == 0 || wanted == offered)
}

/// Explicit `flavor.id` wins without consulting the catalog.
pub async fn get_matching_flavor_id(service: &dyn FlavorService, flavor: &Flavor) -> Result<String> {
    if !flavor.id.is_empty() {
        return Ok(flavor.id.clone());
    }
    let flavor_id = service
        .find_flavor(flavor)
        .await
        .map_err(|e| e.context("error finding flavor"))?;
    if flavor_id.is_empty() {
        return Err(ComputeError::not_found("no matching flavor found"));
    }
    Ok(flavor_id)
}

/// Explicit `image.id` wins without consulting the catalog.
pub async fn get_matching_image_id(service: &dyn ImageService, image: &Image) -> Result<String> {
    if !image.id.is_empty() {
        return Ok(image.id.clone());
    }
    let image_id = service
        .find_image(image)
        .await
        .map_err(|e| e.context("error finding image"))?;
    if image_id.is_empty() {
        return Err(ComputeError::not_found("no matching image found"));
    }
    Ok(image_id)
}
