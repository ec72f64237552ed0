//! # Request Handling
//!
//! [`Server`] is the application context: it owns the storage backend, the
//! configuration, and the compiled tag grammar, and is built once and shared
//! by every request. [`Server::handle`] runs one [`Request`] and always
//! returns a [`Response`]; failures become the error message in `status`.
//!
//! ## Operations
//!
//! - **GET**: read the version list, the infrastructure document, or a
//!   cluster document. `version` is a committed tag or the caller's own
//!   username, which previews staged data. `deployment_info` and `config`
//!   are derived on the fly.
//! - **PUT**: stage one document under the caller's namespace.
//! - **DELETE**: drop the caller's whole staged batch.
//! - **COMMIT**: promote the staged batch to a new version, or replace the
//!   infrastructure document.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::flatten::flatten_bytes;
use crate::lookup::Infrastructure;
use crate::merge::deployment::merge_deployment_info;
use crate::path::{
    namespace_prefix, node_key, service_list_key, template_key, ConfigKey, INFRASTRUCTURE_KEY,
    VERSION_RECORD_KEY,
};
use crate::phases::{validate_username, CommitOutcome, CommitTarget, Coordinator};
use crate::storage::Storage;
use crate::template::{Snapshot, TemplateInstance};
use crate::version::{TagPolicy, VersionHistory, VersionInfo};

/// Status string of a successful response.
pub const STATUS_OK: &str = "ok";

/// One inbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Get {
        user: String,
        target: GetTarget,
    },
    Put {
        user: String,
        target: PutTarget,
        file: Option<Vec<u8>>,
    },
    Delete {
        user: String,
    },
    Commit {
        user: String,
        target: CommitRequest,
    },
}

/// What a GET reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum GetTarget {
    Versions,
    Infrastructure,
    ServiceList {
        version: String,
        env: String,
        cluster: String,
    },
    Template {
        version: String,
        env: String,
        cluster: String,
        name: String,
    },
    DeploymentInfo {
        version: String,
        env: String,
        cluster: String,
    },
    /// A template rendered for one node
    Config {
        version: String,
        env: String,
        cluster: String,
        name: String,
        global_id: String,
        local_id: String,
    },
    NodeFile {
        version: String,
        env: String,
        cluster: String,
        global_id: String,
        local_id: String,
        name: String,
    },
}

/// Where a PUT stages its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum PutTarget {
    ServiceList {
        env: String,
        cluster: String,
    },
    Template {
        env: String,
        cluster: String,
        name: String,
    },
    NodeFile {
        env: String,
        cluster: String,
        global_id: String,
        local_id: String,
        name: String,
    },
}

/// What a COMMIT finalizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum CommitRequest {
    Config { version: Option<String> },
    Infrastructure { file: Option<Vec<u8>> },
}

/// Reply to any request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// `ok`, or the error message
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<VersionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Vec<u8>>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_string(),
            ..Self::default()
        }
    }

    pub fn with_file(file: Vec<u8>) -> Self {
        Self {
            file: Some(file),
            ..Self::ok()
        }
    }

    pub fn with_versions(versions: Vec<VersionInfo>) -> Self {
        Self {
            versions,
            ..Self::ok()
        }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            status: err.to_string(),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Application context shared by all requests.
pub struct Server {
    store: Arc<dyn Storage>,
    config: ServerConfig,
    tags: TagPolicy,
}

impl Server {
    pub fn new(store: Arc<dyn Storage>, config: ServerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            tags: TagPolicy::new()?,
        })
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run one request, reporting any failure through `status`.
    pub fn handle(&self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                info!("request failed: {}", e);
                Response::error(&e)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Get { user, target } => self.get(&user, &target),
            Request::Put { user, target, file } => {
                self.put(&user, &target, file.as_deref())?;
                Ok(Response::ok())
            }
            Request::Delete { user } => {
                self.delete(&user)?;
                Ok(Response::ok())
            }
            Request::Commit { user, target } => {
                let target = match target {
                    CommitRequest::Config { version } => CommitTarget::Config { version },
                    CommitRequest::Infrastructure { file } => CommitTarget::Infrastructure(
                        file.ok_or_else(|| Error::validation("file", "no file supplied"))?,
                    ),
                };
                match self.commit(&user, target)? {
                    CommitOutcome::Version(info) => Ok(Response::with_versions(vec![info])),
                    CommitOutcome::Infrastructure => Ok(Response::ok()),
                }
            }
        }
    }

    /// Serve a GET.
    pub fn get(&self, user: &str, target: &GetTarget) -> Result<Response> {
        validate_username(user)?;
        match target {
            GetTarget::Versions => {
                let history = VersionHistory::read(self.store())?
                    .ok_or_else(|| Error::not_found("version history", VERSION_RECORD_KEY))?;
                Ok(Response::with_versions(history.entries().to_vec()))
            }
            GetTarget::Infrastructure => {
                let bytes = self.fetch("infrastructure", INFRASTRUCTURE_KEY)?;
                Ok(Response::with_file(bytes))
            }
            GetTarget::ServiceList {
                version,
                env,
                cluster,
            } => {
                self.check_version(user, version)?;
                validate_env(env)?;
                let key = service_list_key(version, env, cluster)?;
                Ok(Response::with_file(self.fetch_key("service list", &key)?))
            }
            GetTarget::Template {
                version,
                env,
                cluster,
                name,
            } => {
                self.check_version(user, version)?;
                validate_env(env)?;
                let key = template_key(version, env, cluster, name)?;
                Ok(Response::with_file(self.fetch_key("template", &key)?))
            }
            GetTarget::DeploymentInfo {
                version,
                env,
                cluster,
            } => {
                self.check_version(user, version)?;
                validate_env(env)?;
                let key = service_list_key(version, env, cluster)?;
                let services = flatten_bytes(&self.fetch_key("service list", &key)?)?;
                let mut infrastructure = Infrastructure::Deferred(self.store());
                let merged = merge_deployment_info(&services, &mut infrastructure)?;
                Ok(Response::with_file(serde_json::to_vec_pretty(&merged)?))
            }
            GetTarget::Config {
                version,
                env,
                cluster,
                name,
                global_id,
                local_id,
            } => {
                self.check_version(user, version)?;
                validate_env(env)?;
                validate_id("global id", global_id)?;
                validate_id("local id", local_id)?;
                let template = self.fetch_key("template", &template_key(version, env, cluster, name)?)?;
                let services =
                    self.fetch_key("service list", &service_list_key(version, env, cluster)?)?;

                let mut instance = TemplateInstance::new(
                    self.store(),
                    Snapshot {
                        version: version.clone(),
                        env: env.clone(),
                        global_id: global_id.clone(),
                        local_id: local_id.clone(),
                    },
                )?;
                let rendered = instance.fill(Some(template.as_slice()), name, Some(services.as_slice()))?;
                Ok(Response::with_file(rendered))
            }
            GetTarget::NodeFile {
                version,
                env,
                cluster,
                global_id,
                local_id,
                name,
            } => {
                self.check_version(user, version)?;
                validate_env(env)?;
                validate_id("global id", global_id)?;
                validate_id("local id", local_id)?;
                let key = node_key(version, env, cluster, global_id, local_id, name)?;
                Ok(Response::with_file(self.fetch_key("node file", &key)?))
            }
        }
    }

    /// Stage one document under `user`.
    pub fn put(&self, user: &str, target: &PutTarget, file: Option<&[u8]>) -> Result<()> {
        validate_username(user)?;
        let file = file.ok_or_else(|| Error::validation("file", "no file supplied"))?;
        let key = match target {
            PutTarget::ServiceList { env, cluster } => {
                validate_env(env)?;
                service_list_key(user, env, cluster)?
            }
            PutTarget::Template { env, cluster, name } => {
                validate_env(env)?;
                template_key(user, env, cluster, name)?
            }
            PutTarget::NodeFile {
                env,
                cluster,
                global_id,
                local_id,
                name,
            } => {
                validate_env(env)?;
                validate_id("global id", global_id)?;
                validate_id("local id", local_id)?;
                node_key(user, env, cluster, global_id, local_id, name)?
            }
        };
        self.store.put(&key.to_string(), file)?;
        info!("staged {}", key);
        Ok(())
    }

    /// Drop everything `user` has staged.
    pub fn delete(&self, user: &str) -> Result<()> {
        validate_username(user)?;
        let prefix = namespace_prefix(user)?;
        self.store.delete_by_prefix(&prefix)?;
        info!("purged staged data of {}", user);
        Ok(())
    }

    /// Finalize a COMMIT.
    pub fn commit(&self, user: &str, target: CommitTarget) -> Result<CommitOutcome> {
        Coordinator {
            store: self.store(),
            tags: &self.tags,
            lock_name: &self.config.lock_name,
            lock_timeout: self.config.lock_timeout(),
        }
        .commit(user, target)
    }

    /// A GET version is a committed tag or the caller's own staging namespace.
    fn check_version(&self, user: &str, version: &str) -> Result<()> {
        if version == user || self.tags.is_tag(version) {
            Ok(())
        } else {
            Err(Error::validation(
                "version",
                format!("'{}' is neither a version tag nor your username", version),
            ))
        }
    }

    fn fetch(&self, resource: &str, key: &str) -> Result<Vec<u8>> {
        self.store
            .get(key)?
            .ok_or_else(|| Error::not_found(resource, key))
    }

    fn fetch_key(&self, resource: &str, key: &ConfigKey) -> Result<Vec<u8>> {
        self.fetch(resource, &key.to_string())
    }
}

/// Environment numbers are non-negative integers.
pub fn validate_env(env: &str) -> Result<()> {
    validate_id("env", env)
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::validation(
            field,
            format!("'{}' is not a non-negative integer", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const INFRA: &[u8] = br#"{"normal":{"h1":{"ip":"10.0.0.1"},"h2":{"ip":"10.0.0.2"}}}"#;
    const SERVICES: &[u8] = br#"{
        "replicator_number": 2,
        "deployment_info": [
            {"hostname": "h1", "IP": "{ip}", "PORT": 8080},
            {"hostname": "h2", "IP": "{ip}", "PORT": 8081}
        ]
    }"#;
    const TEMPLATE: &[u8] =
        br#"listen {{GetInfo "slice" "web" "deployment_info.IP"}}:{{GetInfo "slice" "web" "deployment_info.PORT"}}"#;

    fn server() -> Server {
        let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
        let config = ServerConfig {
            lock_timeout_ms: 1_000,
            ..ServerConfig::default()
        };
        Server::new(store, config).unwrap()
    }

    fn put(server: &Server, user: &str, target: PutTarget, file: &[u8]) -> Response {
        server.handle(Request::Put {
            user: user.to_string(),
            target,
            file: Some(file.to_vec()),
        })
    }

    fn commit(server: &Server, user: &str, target: CommitRequest) -> Response {
        server.handle(Request::Commit {
            user: user.to_string(),
            target,
        })
    }

    fn get(server: &Server, user: &str, target: GetTarget) -> Response {
        server.handle(Request::Get {
            user: user.to_string(),
            target,
        })
    }

    fn stage_web(server: &Server, user: &str) {
        let env = "1".to_string();
        let cluster = "web".to_string();
        assert!(put(
            server,
            user,
            PutTarget::ServiceList {
                env: env.clone(),
                cluster: cluster.clone(),
            },
            SERVICES,
        )
        .is_ok());
        assert!(put(
            server,
            user,
            PutTarget::Template {
                env,
                cluster,
                name: "nginx.conf".to_string(),
            },
            TEMPLATE,
        )
        .is_ok());
    }

    fn published() -> Server {
        let server = server();
        let resp = commit(
            &server,
            "admin",
            CommitRequest::Infrastructure {
                file: Some(INFRA.to_vec()),
            },
        );
        assert!(resp.is_ok(), "{}", resp.status);
        stage_web(&server, "alice");
        let resp = commit(&server, "alice", CommitRequest::Config { version: None });
        assert!(resp.is_ok(), "{}", resp.status);
        server
    }

    #[test]
    fn test_commit_then_render() {
        let server = published();

        let versions = get(&server, "bob", GetTarget::Versions);
        assert_eq!(versions.versions.len(), 1);
        assert_eq!(versions.versions[0].tag, "0.0.1");

        let rendered = get(
            &server,
            "bob",
            GetTarget::Config {
                version: "0.0.1".to_string(),
                env: "1".to_string(),
                cluster: "web".to_string(),
                name: "nginx.conf".to_string(),
                global_id: "0".to_string(),
                local_id: "1".to_string(),
            },
        );
        assert!(rendered.is_ok(), "{}", rendered.status);
        assert_eq!(rendered.file.unwrap(), b"listen 10.0.0.2:8081");
    }

    #[test]
    fn test_deployment_info() {
        let server = published();
        let resp = get(
            &server,
            "bob",
            GetTarget::DeploymentInfo {
                version: "0.0.1".to_string(),
                env: "1".to_string(),
                cluster: "web".to_string(),
            },
        );
        assert!(resp.is_ok(), "{}", resp.status);
        let doc: serde_json::Value = serde_json::from_slice(&resp.file.unwrap()).unwrap();
        assert_eq!(doc["replicator_number"], "2");
        assert_eq!(doc["deployment_info"][1]["IP"], "10.0.0.2");
    }

    #[test]
    fn test_preview_own_staged_data_only() {
        let server = published();
        stage_web(&server, "carol");
        let target = |version: &str| GetTarget::ServiceList {
            version: version.to_string(),
            env: "1".to_string(),
            cluster: "web".to_string(),
        };
        assert!(get(&server, "carol", target("carol")).is_ok());

        let resp = get(&server, "dave", target("carol"));
        assert!(resp.status.contains("neither a version tag nor your username"));
    }

    #[test]
    fn test_not_found_messages_are_specific() {
        let server = server();
        let resp = get(&server, "bob", GetTarget::Versions);
        assert!(resp.status.contains("version history not found"));
        assert!(resp.versions.is_empty());

        let resp = get(&server, "bob", GetTarget::Infrastructure);
        assert!(resp.status.contains("infrastructure not found"));

        let resp = get(
            &server,
            "bob",
            GetTarget::Template {
                version: "1.0.0".to_string(),
                env: "1".to_string(),
                cluster: "web".to_string(),
                name: "x".to_string(),
            },
        );
        assert!(resp.status.contains("template not found"));
    }

    #[test]
    fn test_put_validation() {
        let server = server();
        let target = |env: &str| PutTarget::ServiceList {
            env: env.to_string(),
            cluster: "web".to_string(),
        };
        assert!(!put(&server, "alice", target("-1"), b"{}").is_ok());
        assert!(!put(&server, "alice", target("one"), b"{}").is_ok());
        assert!(!put(&server, "a.b", target("1"), b"{}").is_ok());

        let resp = server.handle(Request::Put {
            user: "alice".to_string(),
            target: target("1"),
            file: None,
        });
        assert!(resp.status.contains("no file supplied"));
    }

    #[test]
    fn test_delete_purges_staging() {
        let server = server();
        stage_web(&server, "alice");
        assert!(server
            .handle(Request::Delete {
                user: "alice".to_string()
            })
            .is_ok());
        let resp = commit(&server, "alice", CommitRequest::Config { version: None });
        assert!(resp.status.contains("no staged data"));
    }

    #[test]
    fn test_missing_replicator_number() {
        let server = server();
        put(
            &server,
            "alice",
            PutTarget::ServiceList {
                env: "1".to_string(),
                cluster: "web".to_string(),
            },
            br#"{"deployment_info":[{"hostname":"h1"}]}"#,
        );
        let resp = get(
            &server,
            "alice",
            GetTarget::DeploymentInfo {
                version: "alice".to_string(),
                env: "1".to_string(),
                cluster: "web".to_string(),
            },
        );
        assert!(resp.status.contains("replicator_number"), "{}", resp.status);
    }

    #[test]
    fn test_request_serde_shape() {
        let request = Request::Commit {
            user: "alice".to_string(),
            target: CommitRequest::Config {
                version: Some("1.0.0".to_string()),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["op"], "commit");
        assert_eq!(json["target"]["target"], "config");
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }
}
