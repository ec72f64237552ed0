//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and document
//! snippets to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_infrastructure();
//!     fixture.command().args(["get", "bob", "infrastructure"]).assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::docs;
    pub use super::TestFixture;
}

/// Documents used across tests.
#[allow(dead_code)]
pub mod docs {
    /// Two hosts with one address each.
    pub const INFRASTRUCTURE: &str = r#"{
  "normal": {
    "h1": {"biznet": {"ip": "10.0.0.1"}},
    "h2": {"biznet": {"ip": "10.0.0.2"}}
  }
}"#;

    /// A two-node service list whose IPs resolve through the infrastructure.
    pub const SERVICE_LIST: &str = r#"{
  "replicator_number": 2,
  "deployment_info": [
    {"hostname": "h1", "IP": "{biznet.ip}", "PORT": 8080, "NODE_ID": "11"},
    {"hostname": "h2", "IP": "{biznet.ip}", "PORT": 8081, "NODE_ID": "12"}
  ]
}"#;

    /// A service list without `replicator_number`.
    pub const SERVICE_LIST_NO_REPLICAS: &str = r#"{
  "deployment_info": [{"hostname": "h1", "IP": "{biznet.ip}"}]
}"#;

    /// Renders the calling node's address.
    pub const TEMPLATE: &str = r#"listen {{GetInfo "slice" "web" "deployment_info.IP"}}:{{GetInfo "slice" "web" "deployment_info.PORT"}}"#;

    /// Calls a function that does not exist.
    pub const BROKEN_TEMPLATE: &str = r#"{{NoSuchFunction "x"}}"#;
}

/// A temporary directory holding the store and any input files.
///
/// Commands built by [`TestFixture::command`] point `CONF_CENTER_STORE` at
/// `<tmp>/store` and run inside `<tmp>`, so state persists across the
/// commands of a single test and never leaks between tests.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Publish the standard infrastructure document.
    #[allow(dead_code)]
    pub fn with_infrastructure(self) -> Self {
        let fixture = self.with_file("infra.json", docs::INFRASTRUCTURE);
        fixture
            .command()
            .args(["commit", "admin", "--infrastructure", "--file", "infra.json"])
            .assert()
            .success();
        fixture
    }

    /// Stage the standard service list and template for `user` in `1/web`.
    #[allow(dead_code)]
    pub fn with_staged(self, user: &str) -> Self {
        let fixture = self
            .with_file("services.json", docs::SERVICE_LIST)
            .with_file("listen.tpl", docs::TEMPLATE);
        fixture
            .put(user, "services.json", &["service-list"])
            .assert()
            .success();
        fixture
            .put(user, "listen.tpl", &["template", "listen.conf"])
            .assert()
            .success();
        fixture
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory of the file-backed store.
    pub fn store_path(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run against this fixture's store.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("conf-center");
        cmd.current_dir(self.path())
            .env("CONF_CENTER_STORE", self.store_path())
            .env_remove("CONF_CENTER_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--color")
            .arg("never");
        cmd
    }

    /// A `put` of `file` into env 1, cluster `web`.
    #[allow(dead_code)]
    pub fn put(&self, user: &str, file: &str, kind: &[&str]) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.args(["put", user, "--env", "1", "--cluster", "web", "--file", file])
            .args(kind);
        cmd
    }

    /// A `get` of a per-cluster target in env 1, cluster `web`.
    #[allow(dead_code)]
    pub fn get(&self, user: &str, target: &str, version: &str, rest: &[&str]) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.args([
            "get",
            user,
            target,
            "--version",
            version,
            "--env",
            "1",
            "--cluster",
            "web",
        ])
        .args(rest);
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
        assert!(!fixture.store_path().exists());
    }

    #[test]
    fn test_fixture_with_file() {
        let fixture = TestFixture::new().with_file("test.txt", "hello");
        assert!(fixture.path().join("test.txt").exists());
    }

    #[test]
    fn test_documents_are_valid_json() {
        for doc in [
            docs::INFRASTRUCTURE,
            docs::SERVICE_LIST,
            docs::SERVICE_LIST_NO_REPLICAS,
        ] {
            serde_json::from_str::<serde_json::Value>(doc).expect("document should be JSON");
        }
    }
}
