//! Deployment-info merger
//!
//! Produces a self-contained JSON document describing a cluster's nodes: the
//! `replicator_number` plus every `deployment_info` leaf of the service list,
//! with brace-wrapped values already resolved through the infrastructure
//! document. It is the batch counterpart of [`crate::lookup::resolve`].

use log::debug;
use serde_json::{Map, Value as JsonValue};

use super::json::set_path;
use crate::error::{Error, LookupFailure, Result};
use crate::flatten::FlatMap;
use crate::lookup::{brace_interior, hostname_for, match_suffix, Infrastructure, DEPLOYMENT_INFO};

/// Service-list key that must be present for a merge.
pub const REPLICATOR_NUMBER: &str = "replicator_number";

/// Build the merged deployment document from a flattened service list.
///
/// # Errors
///
/// Fails when `replicator_number` is missing, or when any brace-wrapped
/// `deployment_info` value cannot be resolved.
pub fn merge_deployment_info(
    services: &FlatMap,
    infrastructure: &mut Infrastructure<'_>,
) -> Result<JsonValue> {
    let replicas = services
        .get(REPLICATOR_NUMBER)
        .ok_or_else(|| Error::lookup(REPLICATOR_NUMBER, LookupFailure::MissingKey))?;

    let mut merged = JsonValue::Object(Map::new());
    set_path(&mut merged, REPLICATOR_NUMBER, JsonValue::String(replicas.clone()))?;

    let section = format!("{}.", DEPLOYMENT_INFO);
    for (path, raw) in services {
        if path != DEPLOYMENT_INFO && !path.starts_with(&section) {
            continue;
        }

        let value = match brace_interior(raw) {
            None => raw.clone(),
            Some("") => return Err(Error::lookup(path, LookupFailure::EmptyIndirection)),
            Some(interior) => {
                let slot = path.split('.').nth(1).unwrap_or_default();
                let hostname = hostname_for(services, slot, path)?;
                let resolved = match_suffix(infrastructure.flat()?, hostname, interior, path)?;
                debug!("{} -> {} via {}", path, resolved, hostname);
                resolved
            }
        };
        set_path(&mut merged, path, JsonValue::String(value))?;
    }

    Ok(merged)
}
