//! # Lookup Resolver
//!
//! Resolves one service key against a flattened service list, optionally
//! indirecting through the infrastructure document.
//!
//! ## Addressing
//!
//! - **Explicit**: the key is looked up literally.
//! - **Indexed**: the key's first segment is kept and the node's local id is
//!   spliced in as the second one, so `deployment_info.PORT` becomes
//!   `deployment_info.<localId>.PORT`. Keys with a single segment are
//!   rejected.
//!
//! ## Indirection
//!
//! A value wrapped in braces, such as `{biznet.ip}`, is a reference into the
//! infrastructure document. The node slot is the second segment of the
//! addressed key, its hostname is read from `deployment_info.<slot>.hostname`,
//! and the infrastructure leaf whose path ends in `<hostname>.<interior>` at a
//! segment boundary supplies the value. When several leaves match they must
//! agree on the value, otherwise the lookup is rejected as ambiguous.
//!
//! Explicit lookups therefore depend only on the service list and the key,
//! never on the caller's local id.

use crate::error::{Error, LookupFailure, Result};
use crate::flatten::{flatten_bytes, FlatMap};
use crate::path::INFRASTRUCTURE_KEY;
use crate::storage::Storage;

/// Section of the service list that describes each node.
pub const DEPLOYMENT_INFO: &str = "deployment_info";

/// The infrastructure vocabulary, either already flattened or fetched on
/// first use.
pub enum Infrastructure<'a> {
    Loaded(FlatMap),
    Deferred(&'a dyn Storage),
}

impl<'a> Infrastructure<'a> {
    /// Fetch and flatten the infrastructure document right away.
    pub fn load(store: &dyn Storage) -> Result<Infrastructure<'static>> {
        Ok(Infrastructure::Loaded(fetch(store)?))
    }

    /// The flattened infrastructure, fetching it if that has not happened yet.
    pub fn flat(&mut self) -> Result<&FlatMap> {
        if let Infrastructure::Deferred(store) = *self {
            *self = Infrastructure::Loaded(fetch(store)?);
        }
        match self {
            Infrastructure::Loaded(flat) => Ok(flat),
            Infrastructure::Deferred(_) => {
                Err(Error::not_found("infrastructure", INFRASTRUCTURE_KEY))
            }
        }
    }
}

fn fetch(store: &dyn Storage) -> Result<FlatMap> {
    let bytes = store
        .get(INFRASTRUCTURE_KEY)?
        .ok_or_else(|| Error::not_found("infrastructure", INFRASTRUCTURE_KEY))?;
    flatten_bytes(&bytes)
}

/// How a key is addressed inside the service list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing<'a> {
    Explicit,
    Indexed { local_id: &'a str },
}

/// Compute the literal service-list key for `key`.
pub fn address(key: &str, addressing: Addressing<'_>) -> Result<String> {
    match addressing {
        Addressing::Explicit => Ok(key.to_string()),
        Addressing::Indexed { local_id } => match key.split_once('.') {
            Some((head, rest)) if !head.is_empty() && !rest.is_empty() => {
                Ok(format!("{}.{}.{}", head, local_id, rest))
            }
            _ => Err(Error::lookup(key, LookupFailure::BadFormat)),
        },
    }
}

/// Resolve `key` to its final string value.
pub fn resolve(
    services: &FlatMap,
    infrastructure: &mut Infrastructure<'_>,
    key: &str,
    addressing: Addressing<'_>,
) -> Result<String> {
    let addressed = address(key, addressing)?;
    let value = services
        .get(&addressed)
        .ok_or_else(|| Error::lookup(&addressed, LookupFailure::MissingKey))?;

    let Some(interior) = brace_interior(value) else {
        return Ok(value.clone());
    };
    if interior.is_empty() {
        return Err(Error::lookup(&addressed, LookupFailure::EmptyIndirection));
    }

    let slot = addressed.split('.').nth(1).unwrap_or_default();
    let hostname = hostname_for(services, slot, &addressed)?;
    match_suffix(infrastructure.flat()?, hostname, interior, &addressed)
}

/// The text between a leading `{` and a trailing `}`, if `value` is wrapped.
pub fn brace_interior(value: &str) -> Option<&str> {
    if value.len() >= 2 && value.starts_with('{') && value.ends_with('}') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

/// Hostname of node `slot` as declared in the service list.
pub fn hostname_for<'m>(services: &'m FlatMap, slot: &str, key: &str) -> Result<&'m str> {
    services
        .get(&format!("{}.{}.hostname", DEPLOYMENT_INFO, slot))
        .map(String::as_str)
        .ok_or_else(|| {
            Error::lookup(
                key,
                LookupFailure::MissingHostname {
                    local_id: slot.to_string(),
                },
            )
        })
}

/// Find the infrastructure value for `<hostname>.<interior>`.
pub fn match_suffix(
    infrastructure: &FlatMap,
    hostname: &str,
    interior: &str,
    key: &str,
) -> Result<String> {
    let suffix = format!("{}.{}", hostname, interior);
    let dotted = format!(".{}", suffix);
    let candidates: Vec<(&String, &String)> = infrastructure
        .iter()
        .filter(|(path, _)| **path == suffix || path.ends_with(&dotted))
        .collect();

    match candidates.as_slice() {
        [] => Err(Error::lookup(
            key,
            LookupFailure::NoInfrastructureMatch { suffix },
        )),
        [(_, value), rest @ ..] if rest.iter().all(|(_, other)| other == value) => {
            Ok((*value).clone())
        }
        _ => Err(Error::lookup(
            key,
            LookupFailure::AmbiguousInfrastructure {
                suffix,
                candidates: candidates.iter().map(|(path, _)| (*path).clone()).collect(),
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &str)]) -> FlatMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn failure(err: Error) -> LookupFailure {
        match err {
            Error::Lookup { failure, .. } => failure,
            other => panic!("expected lookup error, got {other}"),
        }
    }

    #[test]
    fn test_indexed_addressing_splices_local_id() {
        let services = flat(&[("deployment_info.7.PORT", "9999")]);
        let mut infra = Infrastructure::Loaded(FlatMap::new());
        let value = resolve(
            &services,
            &mut infra,
            "deployment_info.PORT",
            Addressing::Indexed { local_id: "7" },
        )
        .unwrap();
        assert_eq!(value, "9999");
    }

    #[test]
    fn test_indexed_addressing_needs_two_segments() {
        let err = address("PORT", Addressing::Indexed { local_id: "0" }).unwrap_err();
        assert_eq!(failure(err), LookupFailure::BadFormat);
    }

    #[test]
    fn test_explicit_plain_value() {
        let services = flat(&[("replicator_number", "3")]);
        let mut infra = Infrastructure::Loaded(FlatMap::new());
        let value = resolve(&services, &mut infra, "replicator_number", Addressing::Explicit);
        assert_eq!(value.unwrap(), "3");
    }

    #[test]
    fn test_missing_key() {
        let services = FlatMap::new();
        let mut infra = Infrastructure::Loaded(FlatMap::new());
        let err = resolve(&services, &mut infra, "nope", Addressing::Explicit).unwrap_err();
        assert_eq!(failure(err), LookupFailure::MissingKey);
    }

    #[test]
    fn test_indirection_through_infrastructure() {
        let services = flat(&[
            ("deployment_info.0.hostname", "h1"),
            ("deployment_info.0.IP", "{biznet.ip}"),
        ]);
        let mut infra = Infrastructure::Loaded(flat(&[("normal.h1.biznet.ip", "10.0.0.1")]));
        let value = resolve(
            &services,
            &mut infra,
            "deployment_info.0.IP",
            Addressing::Explicit,
        )
        .unwrap();
        assert_eq!(value, "10.0.0.1");
    }

    #[test]
    fn test_empty_braces() {
        let services = flat(&[("deployment_info.0.IP", "{}")]);
        let mut infra = Infrastructure::Loaded(FlatMap::new());
        let err = resolve(
            &services,
            &mut infra,
            "deployment_info.0.IP",
            Addressing::Explicit,
        )
        .unwrap_err();
        assert_eq!(failure(err), LookupFailure::EmptyIndirection);
    }

    #[test]
    fn test_missing_hostname() {
        let services = flat(&[("deployment_info.0.IP", "{biznet.ip}")]);
        let mut infra = Infrastructure::Loaded(FlatMap::new());
        let err = resolve(
            &services,
            &mut infra,
            "deployment_info.0.IP",
            Addressing::Explicit,
        )
        .unwrap_err();
        assert!(matches!(failure(err), LookupFailure::MissingHostname { .. }));
    }

    #[test]
    fn test_no_infrastructure_match() {
        let services = flat(&[
            ("deployment_info.0.hostname", "h1"),
            ("deployment_info.0.IP", "{biznet.ip}"),
        ]);
        // "xh1" must not satisfy a suffix of "h1" on a segment boundary
        let mut infra = Infrastructure::Loaded(flat(&[("normal.xh1.biznet.ip", "10.9.9.9")]));
        let err = resolve(
            &services,
            &mut infra,
            "deployment_info.0.IP",
            Addressing::Explicit,
        )
        .unwrap_err();
        assert!(matches!(
            failure(err),
            LookupFailure::NoInfrastructureMatch { .. }
        ));
    }

    #[test]
    fn test_ambiguous_infrastructure_rejected() {
        let infra = flat(&[("a.h1.ip", "10.0.0.1"), ("b.h1.ip", "10.0.0.2")]);
        let err = match_suffix(&infra, "h1", "ip", "k").unwrap_err();
        assert!(matches!(
            failure(err),
            LookupFailure::AmbiguousInfrastructure { .. }
        ));
    }

    #[test]
    fn test_agreeing_duplicates_accepted() {
        let infra = flat(&[("a.h1.ip", "10.0.0.1"), ("b.h1.ip", "10.0.0.1")]);
        assert_eq!(match_suffix(&infra, "h1", "ip", "k").unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_deferred_infrastructure_fetched_lazily() {
        use crate::storage::MemoryStore;

        let store = MemoryStore::new();
        let services = flat(&[("plain", "v")]);
        let mut infra = Infrastructure::Deferred(&store);
        // no infrastructure stored, but it is never needed
        assert_eq!(
            resolve(&services, &mut infra, "plain", Addressing::Explicit).unwrap(),
            "v"
        );

        assert!(matches!(infra.flat(), Err(Error::NotFound { .. })));

        store
            .put(INFRASTRUCTURE_KEY, br#"{"normal":{"h1":{"ip":"1.1.1.1"}}}"#)
            .unwrap();
        assert_eq!(infra.flat().unwrap()["normal.h1.ip"], "1.1.1.1");

        // loaded once; later calls do not go back to the store
        store.delete(INFRASTRUCTURE_KEY).unwrap();
        assert_eq!(infra.flat().unwrap()["normal.h1.ip"], "1.1.1.1");
    }
}
