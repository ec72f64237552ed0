//! Phase 3: Dry Run
//!
//! Proves a staged batch is renderable before it becomes a version. Templates
//! are grouped by (env, cluster); each group gets one template instance bound
//! to the staging namespace, every template of the group is registered first
//! so they can include one another, and then each is executed with the
//! cluster's staged service list as context. Groups run in parallel.
//!
//! Nothing is written in this phase.

use std::collections::BTreeMap;

use log::{debug, warn};
use rayon::prelude::*;

use super::StagedSet;
use crate::error::{Error, Result};
use crate::path::{service_list_key, ConfigKey, DocumentKind};
use crate::storage::Storage;
use crate::template::{Snapshot, TemplateInstance};

/// Node identity used while validating.
pub const VALIDATION_ID: &str = "0";

struct Group<'a> {
    env: String,
    cluster: String,
    /// (template name, storage key, text)
    templates: Vec<(String, &'a str, &'a [u8])>,
}

/// Execute Phase 3: render every staged template of `user`.
///
/// Returns the number of templates rendered.
pub fn execute(store: &dyn Storage, user: &str, staged: &StagedSet) -> Result<usize> {
    let mut groups: BTreeMap<(String, String), Group<'_>> = BTreeMap::new();
    for (key, bytes) in staged {
        let parsed = ConfigKey::parse(key)?;
        if let Some(DocumentKind::Template { env, cluster, name }) = parsed.kind() {
            groups
                .entry((env.to_string(), cluster.to_string()))
                .or_insert_with(|| Group {
                    env: env.to_string(),
                    cluster: cluster.to_string(),
                    templates: Vec::new(),
                })
                .templates
                .push((name.to_string(), key.as_str(), bytes.as_slice()));
        }
    }

    let groups: Vec<Group<'_>> = groups.into_values().collect();
    let counts = groups
        .par_iter()
        .map(|group| validate_group(store, user, staged, group))
        .collect::<Result<Vec<usize>>>()?;
    Ok(counts.into_iter().sum())
}

fn validate_group(
    store: &dyn Storage,
    user: &str,
    staged: &StagedSet,
    group: &Group<'_>,
) -> Result<usize> {
    let context_key = service_list_key(user, &group.env, &group.cluster)?.to_string();
    let context = staged
        .get(&context_key)
        .ok_or_else(|| Error::not_found("service list", context_key.as_str()))?;

    let mut instance = TemplateInstance::new(
        store,
        Snapshot {
            version: user.to_string(),
            env: group.env.clone(),
            global_id: VALIDATION_ID.to_string(),
            local_id: VALIDATION_ID.to_string(),
        },
    )?;

    for (name, key, text) in &group.templates {
        instance
            .register(name, Some(*text))
            .map_err(|e| in_template(key, e))?;
    }
    for (name, key, _) in &group.templates {
        instance
            .execute(name, Some(context.as_slice()))
            .map_err(|e| in_template(key, e))?;
        debug!("dry run rendered {}", key);
    }
    Ok(group.templates.len())
}

/// Attach the failing template's key to an error.
fn in_template(key: &str, err: Error) -> Error {
    warn!("dry run of {} failed: {}", key, err);
    match err {
        Error::Template { message, .. } => Error::Template {
            message,
            name: Some(key.to_string()),
        },
        other => Error::Template {
            message: other.to_string(),
            name: Some(key.to_string()),
        },
    }
}
