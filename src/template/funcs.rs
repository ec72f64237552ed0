//! Template function table
//!
//! [`Builtin`] is the closed set of functions a template may call. Each has a
//! fixed arity that the parser checks. [`Resolver`] carries the snapshot a
//! template executes against and implements every call.

use std::collections::HashMap;

use log::{debug, warn};
use serde_json::{Number, Value as JsonValue};

use super::Snapshot;
use crate::error::{Error, Result};
use crate::flatten::{flatten_bytes, format_number, FlatMap};
use crate::lookup::{resolve, Addressing, Infrastructure, DEPLOYMENT_INFO};
use crate::path::service_list_key;
use crate::storage::Storage;

/// A function callable from a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    GetInfo,
    UnsafeGetInfo,
    GetNodeIdInfo,
    ParseFloat,
    FormatFloat,
    Increment,
    Decrement,
    Atoi,
    Itoa,
    GlobalId,
    LocalId,
    Eq,
    Ne,
    Not,
    Len,
}

impl Builtin {
    pub const ALL: [Builtin; 15] = [
        Builtin::GetInfo,
        Builtin::UnsafeGetInfo,
        Builtin::GetNodeIdInfo,
        Builtin::ParseFloat,
        Builtin::FormatFloat,
        Builtin::Increment,
        Builtin::Decrement,
        Builtin::Atoi,
        Builtin::Itoa,
        Builtin::GlobalId,
        Builtin::LocalId,
        Builtin::Eq,
        Builtin::Ne,
        Builtin::Not,
        Builtin::Len,
    ];

    /// Find a function by the name templates call it with.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::GetInfo => "GetInfo",
            Builtin::UnsafeGetInfo => "UnsafeGetInfo",
            Builtin::GetNodeIdInfo => "GetNodeIdInfo",
            Builtin::ParseFloat => "ParseFloat",
            Builtin::FormatFloat => "FormatFloat",
            Builtin::Increment => "Increment",
            Builtin::Decrement => "Decrement",
            Builtin::Atoi => "Atoi",
            Builtin::Itoa => "Itoa",
            Builtin::GlobalId => "GlobalId",
            Builtin::LocalId => "LocalId",
            Builtin::Eq => "eq",
            Builtin::Ne => "ne",
            Builtin::Not => "not",
            Builtin::Len => "len",
        }
    }

    /// Number of arguments, counting a piped-in value.
    pub fn arity(self) -> usize {
        match self {
            Builtin::UnsafeGetInfo => 5,
            Builtin::GetInfo | Builtin::GetNodeIdInfo => 3,
            Builtin::FormatFloat | Builtin::Eq | Builtin::Ne => 2,
            Builtin::ParseFloat
            | Builtin::Increment
            | Builtin::Decrement
            | Builtin::Atoi
            | Builtin::Itoa
            | Builtin::Not
            | Builtin::Len => 1,
            Builtin::GlobalId | Builtin::LocalId => 0,
        }
    }
}

/// Execution context of one template instance.
///
/// Holds the bound snapshot, the infrastructure vocabulary, and every
/// service list fetched so far.
pub struct Resolver<'s> {
    store: &'s dyn Storage,
    snapshot: Snapshot,
    infrastructure: Infrastructure<'static>,
    service_lists: HashMap<(String, String, String), FlatMap>,
}

impl<'s> Resolver<'s> {
    /// Bind a snapshot, loading the infrastructure document up front.
    pub fn new(store: &'s dyn Storage, snapshot: Snapshot) -> Result<Self> {
        let infrastructure = Infrastructure::load(store)?;
        Ok(Self {
            store,
            snapshot,
            infrastructure,
            service_lists: HashMap::new(),
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Invoke `func`; `args` has already been checked against its arity.
    pub fn call(&mut self, func: Builtin, args: Vec<JsonValue>) -> Result<JsonValue> {
        match func {
            Builtin::GetInfo => {
                let mode = string_arg(func, &args[0])?;
                let cluster = string_arg(func, &args[1])?;
                let key = string_arg(func, &args[2])?;
                let version = self.snapshot.version.clone();
                let env = self.snapshot.env.clone();
                self.get_info(&mode, &version, &env, &cluster, &key)
                    .map(JsonValue::String)
            }
            Builtin::UnsafeGetInfo => {
                let mode = string_arg(func, &args[0])?;
                let version = string_arg(func, &args[1])?;
                let env = string_arg(func, &args[2])?;
                let cluster = string_arg(func, &args[3])?;
                let key = string_arg(func, &args[4])?;
                warn!(
                    "UnsafeGetInfo reads {}/{}/{} outside the bound snapshot",
                    version, env, cluster
                );
                self.get_info(&mode, &version, &env, &cluster, &key)
                    .map(JsonValue::String)
            }
            Builtin::GetNodeIdInfo => {
                let node_id = string_arg(func, &args[0])?;
                let cluster = string_arg(func, &args[1])?;
                let key = string_arg(func, &args[2])?;
                self.get_node_id_info(&node_id, &cluster, &key)
                    .map(JsonValue::String)
            }
            Builtin::ParseFloat => {
                let f = float_arg(func, &args[0])?;
                float_value(f)
            }
            Builtin::FormatFloat => {
                let f = float_arg(func, &args[0])?;
                let precision = int_arg(func, &args[1])?;
                let precision = usize::try_from(precision).map_err(|_| {
                    Error::validation("FormatFloat", format!("negative precision {}", precision))
                })?;
                Ok(JsonValue::String(format!("{:.*}", precision, f)))
            }
            Builtin::Increment => {
                let n = int_arg(func, &args[0])?;
                n.checked_add(1)
                    .map(JsonValue::from)
                    .ok_or_else(|| Error::validation("Increment", "integer overflow"))
            }
            Builtin::Decrement => {
                let n = int_arg(func, &args[0])?;
                n.checked_sub(1)
                    .map(JsonValue::from)
                    .ok_or_else(|| Error::validation("Decrement", "integer overflow"))
            }
            Builtin::Atoi => {
                let s = string_arg(func, &args[0])?;
                s.parse::<i64>()
                    .map(JsonValue::from)
                    .map_err(|_| Error::validation("Atoi", format!("'{}' is not an integer", s)))
            }
            Builtin::Itoa => Ok(JsonValue::String(int_arg(func, &args[0])?.to_string())),
            Builtin::GlobalId => Ok(JsonValue::String(self.snapshot.global_id.clone())),
            Builtin::LocalId => Ok(JsonValue::String(self.snapshot.local_id.clone())),
            Builtin::Eq => Ok(JsonValue::Bool(values_equal(&args[0], &args[1]))),
            Builtin::Ne => Ok(JsonValue::Bool(!values_equal(&args[0], &args[1]))),
            Builtin::Not => Ok(JsonValue::Bool(!truthy(&args[0]))),
            Builtin::Len => {
                let len = match &args[0] {
                    JsonValue::String(s) => s.len(),
                    JsonValue::Array(a) => a.len(),
                    JsonValue::Object(o) => o.len(),
                    other => {
                        return Err(Error::validation(
                            "len",
                            format!("len of {}", type_name(other)),
                        ))
                    }
                };
                Ok(JsonValue::from(len))
            }
        }
    }

    fn get_info(
        &mut self,
        mode: &str,
        version: &str,
        env: &str,
        cluster: &str,
        key: &str,
    ) -> Result<String> {
        let addressing = match mode {
            "normal" => Addressing::Explicit,
            "slice" => Addressing::Indexed {
                local_id: &self.snapshot.local_id,
            },
            other => {
                return Err(Error::validation(
                    "mode",
                    format!("'{}' is neither 'normal' nor 'slice'", other),
                ))
            }
        };
        let services = cached_service_list(&mut self.service_lists, self.store, version, env, cluster)?;
        let value = resolve(services, &mut self.infrastructure, key, addressing)?;
        debug!("GetInfo {} {}/{} {} -> {}", mode, env, cluster, key, value);
        Ok(value)
    }

    fn get_node_id_info(&mut self, node_id: &str, cluster: &str, key: &str) -> Result<String> {
        let services = cached_service_list(
            &mut self.service_lists,
            self.store,
            &self.snapshot.version,
            &self.snapshot.env,
            cluster,
        )?;
        let local_id = local_id_of_node(services, node_id).ok_or_else(|| {
            Error::not_found("node", format!("NODE_ID {} in cluster {}", node_id, cluster))
        })?;
        let local_id = local_id.to_string();
        resolve(
            services,
            &mut self.infrastructure,
            key,
            Addressing::Indexed {
                local_id: &local_id,
            },
        )
    }
}

fn cached_service_list<'c>(
    cache: &'c mut HashMap<(String, String, String), FlatMap>,
    store: &dyn Storage,
    version: &str,
    env: &str,
    cluster: &str,
) -> Result<&'c FlatMap> {
    let id = (version.to_string(), env.to_string(), cluster.to_string());
    if !cache.contains_key(&id) {
        let key = service_list_key(version, env, cluster)?.to_string();
        let bytes = store
            .get(&key)?
            .ok_or_else(|| Error::not_found("service list", key.as_str()))?;
        cache.insert(id.clone(), flatten_bytes(&bytes)?);
    }
    Ok(&cache[&id])
}

/// The lowest node slot whose `NODE_ID` equals `node_id`.
fn local_id_of_node(services: &FlatMap, node_id: &str) -> Option<u64> {
    let prefix = format!("{}.", DEPLOYMENT_INFO);
    services
        .iter()
        .filter(|(_, value)| value.as_str() == node_id)
        .filter_map(|(path, _)| {
            let (slot, field) = path.strip_prefix(&prefix)?.split_once('.')?;
            if field == "NODE_ID" {
                slot.parse::<u64>().ok()
            } else {
                None
            }
        })
        .min()
}

/// Template truthiness: null, false, zero, and empty values are false.
pub fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

pub fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "nil",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn string_arg(func: Builtin, value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(format_number(n)),
        other => Err(bad_arg(func, "string", other)),
    }
}

fn int_arg(func: Builtin, value: &JsonValue) -> Result<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| bad_arg(func, "integer", value)),
        JsonValue::String(s) => s.trim().parse().map_err(|_| bad_arg(func, "integer", value)),
        other => Err(bad_arg(func, "integer", other)),
    }
}

fn float_arg(func: Builtin, value: &JsonValue) -> Result<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64().ok_or_else(|| bad_arg(func, "number", value)),
        JsonValue::String(s) => s.trim().parse().map_err(|_| bad_arg(func, "number", value)),
        other => Err(bad_arg(func, "number", other)),
    }
}

fn float_value(f: f64) -> Result<JsonValue> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| Error::validation("ParseFloat", format!("{} is not a finite number", f)))
}

fn bad_arg(func: Builtin, want: &str, got: &JsonValue) -> Error {
    Error::validation(
        func.name(),
        format!("expected {} argument, got {} {}", want, type_name(got), got),
    )
}
