//! Key namespace for stored documents
//!
//! Every document lives under a slash-joined key. The leading component is a
//! namespace: either a committed version tag (`1.4.0`) or a username, which is
//! the staging namespace of that user. Usernames may not contain `.` and tags
//! always do, so the two can never collide.
//!
//! ```text
//! _infrastructure                                   infrastructure document
//! _versions                                         version record
//! <ns>/<env>/<cluster>/service_list                 service list
//! <ns>/<env>/<cluster>/template/<name>              template text
//! <ns>/<env>/<cluster>/node/<gid>/<lid>/<name>      per-node document
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Fixed key of the infrastructure document.
pub const INFRASTRUCTURE_KEY: &str = "_infrastructure";

/// Fixed key of the version record.
pub const VERSION_RECORD_KEY: &str = "_versions";

/// Object name of a cluster's service list.
pub const SERVICE_LIST: &str = "service_list";

/// Directory component holding a cluster's templates.
pub const TEMPLATE_DIR: &str = "template";

/// Directory component holding per-node documents.
pub const NODE_DIR: &str = "node";

/// Separator between key components.
pub const SEPARATOR: char = '/';

/// A validated, slash-joined storage key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigKey {
    components: Vec<String>,
}

impl ConfigKey {
    /// Build a key from components, rejecting empty ones and ones containing `/`.
    pub fn new<I, S>(components: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.is_empty() {
            return Err(Error::Key {
                message: "key has no components".to_string(),
            });
        }
        for component in &components {
            validate_component(component)?;
        }
        Ok(Self { components })
    }

    /// Split a stored key back into its components.
    pub fn parse(key: &str) -> Result<Self> {
        Self::new(key.split(SEPARATOR))
    }

    /// The leading namespace component.
    pub fn namespace(&self) -> &str {
        &self.components[0]
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Replace the leading namespace component.
    ///
    /// Fails if the key does not currently live under `from`.
    pub fn rebase(&self, from: &str, to: &str) -> Result<Self> {
        if self.namespace() != from {
            return Err(Error::Key {
                message: format!("'{}' is not under namespace '{}'", self, from),
            });
        }
        validate_component(to)?;
        let mut components = self.components.clone();
        components[0] = to.to_string();
        Ok(Self { components })
    }

    /// Classify this key within the cluster layout, if it belongs to one.
    pub fn kind(&self) -> Option<DocumentKind<'_>> {
        let c = &self.components;
        match c.len() {
            4 if c[3] == SERVICE_LIST => Some(DocumentKind::ServiceList {
                env: &c[1],
                cluster: &c[2],
            }),
            5 if c[3] == TEMPLATE_DIR => Some(DocumentKind::Template {
                env: &c[1],
                cluster: &c[2],
                name: &c[4],
            }),
            7 if c[3] == NODE_DIR => Some(DocumentKind::Node {
                env: &c[1],
                cluster: &c[2],
                name: &c[6],
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

/// What a key inside a cluster directory refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind<'a> {
    ServiceList { env: &'a str, cluster: &'a str },
    Template {
        env: &'a str,
        cluster: &'a str,
        name: &'a str,
    },
    Node {
        env: &'a str,
        cluster: &'a str,
        name: &'a str,
    },
}

/// Check that a single component is usable inside a key.
pub fn validate_component(component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::Key {
            message: "empty key component".to_string(),
        });
    }
    if component.contains(SEPARATOR) {
        return Err(Error::Key {
            message: format!("component '{}' contains '/'", component),
        });
    }
    Ok(())
}

/// Key of a cluster's service list.
pub fn service_list_key(ns: &str, env: &str, cluster: &str) -> Result<ConfigKey> {
    ConfigKey::new([ns, env, cluster, SERVICE_LIST])
}

/// Key of a named template in a cluster.
pub fn template_key(ns: &str, env: &str, cluster: &str, name: &str) -> Result<ConfigKey> {
    ConfigKey::new([ns, env, cluster, TEMPLATE_DIR, name])
}

/// Key of a per-node document.
pub fn node_key(
    ns: &str,
    env: &str,
    cluster: &str,
    global_id: &str,
    local_id: &str,
    name: &str,
) -> Result<ConfigKey> {
    ConfigKey::new([ns, env, cluster, NODE_DIR, global_id, local_id, name])
}

/// Prefix covering everything under a namespace.
pub fn namespace_prefix(ns: &str) -> Result<String> {
    validate_component(ns)?;
    Ok(format!("{}{}", ns, SEPARATOR))
}
