pub mod migration;
pub mod scheduler;
pub mod server;

use std::str::FromStr;

use crate::registry::EntityKind;

/// Accepts a key, slug or display name and returns the route slug.
pub fn entity_slug(name: &str) -> anyhow::Result<String> {
    EntityKind::from_str(name)
        .map(|kind| kind.slug())
        .map_err(|_| anyhow::anyhow!("unknown entity '{}'", name))
}

pub fn migration_segment(name: &str) -> anyhow::Result<String> {
    Ok(format!("{}-migration", entity_slug(name)?))
}
