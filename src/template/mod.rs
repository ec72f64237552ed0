//! # Template Engine
//!
//! A [`TemplateInstance`] binds a point-in-time [`Snapshot`] (version,
//! environment, node identity) to the function table and renders template
//! text against a JSON context.
//!
//! Templates registered on one instance share a namespace, so a template may
//! include another with `{{template "name" .}}` as long as both were
//! registered on the same instance. Batch validation relies on this by
//! registering a whole cluster's templates before executing any of them.
//!
//! ## Language
//!
//! - `{{ .a.b }}` prints a field of the context; missing fields print
//!   `<no value>`.
//! - `{{- ` and ` -}}` trim whitespace around an action.
//! - `if`/`else`/`end`, `range`, `with`, `define`, and `template` control
//!   output.
//! - Pipelines pass each result as the last argument of the next function:
//!   `{{ GetInfo "normal" "web" "replicator_number" | Atoi | Increment }}`.
//!
//! Function names and arities are checked when a template is registered.

use std::collections::HashMap;

use log::debug;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::storage::Storage;

pub mod exec;
pub mod funcs;
pub mod parse;

use exec::Exec;
use funcs::Resolver;
use parse::Node;

/// What a template instance is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Version namespace: a committed tag or a staging username
    pub version: String,
    pub env: String,
    pub global_id: String,
    pub local_id: String,
}

/// One interpreter: a template namespace plus a bound snapshot.
pub struct TemplateInstance<'s> {
    resolver: Resolver<'s>,
    templates: HashMap<String, Vec<Node>>,
}

impl<'s> TemplateInstance<'s> {
    /// Create an instance; fails when no infrastructure document is stored.
    pub fn new(store: &'s dyn Storage, snapshot: Snapshot) -> Result<Self> {
        Ok(Self {
            resolver: Resolver::new(store, snapshot)?,
            templates: HashMap::new(),
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.resolver.snapshot()
    }

    /// Whether a template (or `define` block) named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Parse `template` and register it under `name`, along with any
    /// `define` blocks it contains.
    pub fn register(&mut self, name: &str, template: Option<&[u8]>) -> Result<()> {
        let template = template.ok_or_else(|| Error::validation("template", "no template file"))?;
        let text = std::str::from_utf8(template).map_err(|e| Error::Template {
            message: format!("template is not UTF-8: {}", e),
            name: Some(name.to_string()),
        })?;
        let parsed = parse::parse(text).map_err(|message| Error::Template {
            message,
            name: Some(name.to_string()),
        })?;

        for (define, body) in parsed.defines {
            debug!("registered {} (defined in {})", define, name);
            self.templates.insert(define, body);
        }
        self.templates.insert(name.to_string(), parsed.root);
        Ok(())
    }

    /// Render the registered template `name` with `source` as context.
    pub fn execute(&mut self, name: &str, source: Option<&[u8]>) -> Result<Vec<u8>> {
        let source = source.ok_or_else(|| Error::validation("source", "no JSON source"))?;
        let data: JsonValue = serde_json::from_slice(source)?;
        let rendered = Exec::new(&self.templates, &mut self.resolver).run(name, &data)?;
        Ok(rendered.into_bytes())
    }

    /// Register `template` as `name` and render it against `source`.
    pub fn fill(
        &mut self,
        template: Option<&[u8]>,
        name: &str,
        source: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        if source.is_none() {
            return Err(Error::validation("source", "no JSON source"));
        }
        self.register(name, template)?;
        self.execute(name, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::INFRASTRUCTURE_KEY;
    use crate::storage::MemoryStore;

    const SERVICES: &[u8] = br#"{
        "replicator_number": 2,
        "deployment_info": [
            {"hostname": "h1", "IP": "{biznet.ip}", "PORT": 8080, "NODE_ID": "a"},
            {"hostname": "h2", "IP": "{biznet.ip}", "PORT": 8081, "NODE_ID": "b"}
        ]
    }"#;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .put(
                INFRASTRUCTURE_KEY,
                br#"{"normal":{"h1":{"biznet":{"ip":"10.0.0.1"}},"h2":{"biznet":{"ip":"10.0.0.2"}}}}"#,
            )
            .unwrap();
        store.put("1.0.0/1/web/service_list", SERVICES).unwrap();
        store
    }

    fn instance<'a>(store: &'a MemoryStore, local_id: &str) -> TemplateInstance<'a> {
        TemplateInstance::new(
            store,
            Snapshot {
                version: "1.0.0".to_string(),
                env: "1".to_string(),
                global_id: "7".to_string(),
                local_id: local_id.to_string(),
            },
        )
        .unwrap()
    }

    fn render(tpl: &mut TemplateInstance<'_>, text: &str, source: &str) -> Result<String> {
        tpl.fill(Some(text.as_bytes()), "t", Some(source.as_bytes()))
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_instance_requires_infrastructure() {
        let empty = MemoryStore::new();
        let snapshot = Snapshot {
            version: "1.0.0".to_string(),
            env: "1".to_string(),
            global_id: "0".to_string(),
            local_id: "0".to_string(),
        };
        assert!(matches!(
            TemplateInstance::new(&empty, snapshot),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_fields_and_missing_values() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let out = render(&mut tpl, "{{.name}}:{{.port}}:{{.absent}}", r#"{"name":"api","port":80}"#);
        assert_eq!(out.unwrap(), "api:80:<no value>");
    }

    #[test]
    fn test_get_info_both_modes() {
        let store = store();
        let mut tpl = instance(&store, "1");
        let out = render(
            &mut tpl,
            r#"{{GetInfo "normal" "web" "deployment_info.0.IP"}} {{GetInfo "slice" "web" "deployment_info.IP"}}:{{GetInfo "slice" "web" "deployment_info.PORT"}}"#,
            "{}",
        );
        assert_eq!(out.unwrap(), "10.0.0.1 10.0.0.2:8081");
    }

    #[test]
    fn test_pipeline_and_helpers() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let out = render(
            &mut tpl,
            r#"{{GetInfo "normal" "web" "replicator_number" | Atoi | Increment}} {{FormatFloat (ParseFloat "1.5") 2}} {{LocalId}}/{{GlobalId}}"#,
            "{}",
        );
        assert_eq!(out.unwrap(), "3 1.50 0/7");
    }

    #[test]
    fn test_control_flow() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let text = "{{range .nodes}}[{{.}}]{{else}}none{{end}}\
                    {{if eq .mode \"a\"}}A{{else if eq .mode \"b\"}}B{{else}}?{{end}}\
                    {{with .inner}}{{.x}}{{end}}";
        let out = render(
            &mut tpl,
            text,
            r#"{"nodes":["x","y"],"mode":"b","inner":{"x":1}}"#,
        );
        assert_eq!(out.unwrap(), "[x][y]B1");

        let out = render(&mut tpl, text, r#"{"nodes":[],"mode":"z"}"#);
        assert_eq!(out.unwrap(), "none?");
    }

    #[test]
    fn test_trim_and_comments() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let out = render(&mut tpl, "a  {{- /* gone */ -}}  b\n{{- .x }}", r#"{"x":"c"}"#);
        assert_eq!(out.unwrap(), "abc");
    }

    #[test]
    fn test_templates_share_namespace_across_fills() {
        let store = store();
        let mut tpl = instance(&store, "0");
        tpl.fill(Some(b"port={{.port}}".as_slice()), "port", Some(b"{\"port\":1}".as_slice()))
            .unwrap();
        let out = tpl
            .fill(
                Some(b"[{{template \"port\" .}}]".as_slice()),
                "main",
                Some(b"{\"port\":2}".as_slice()),
            )
            .unwrap();
        assert_eq!(out, b"[port=2]");
        assert!(tpl.contains("port"));
    }

    #[test]
    fn test_define_and_root_variable() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let out = render(
            &mut tpl,
            r#"{{define "row"}}{{.}}{{end}}{{range .items}}{{template "row" .}}-{{$.sep}}{{end}}"#,
            r#"{"items":[1,2],"sep":";"}"#,
        );
        assert_eq!(out.unwrap(), "1-;2-;");
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let err = render(&mut tpl, r#"{{GetInfo "normal" "web" "nope"}}"#, "{}").unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
    }

    #[test]
    fn test_parse_errors_name_template() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let err = render(&mut tpl, "{{Nope}}", "{}").unwrap_err();
        assert!(err.to_string().contains("in 't'"));
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_missing_inputs_rejected() {
        let store = store();
        let mut tpl = instance(&store, "0");
        assert!(matches!(
            tpl.fill(None, "t", Some(b"{}".as_slice())),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            tpl.fill(Some(b"x".as_slice()), "t", None),
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            tpl.fill(Some(b"x".as_slice()), "t", Some(b"not json".as_slice())),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_unknown_and_recursive_templates() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let err = render(&mut tpl, r#"{{template "ghost"}}"#, "{}").unwrap_err();
        assert!(err.to_string().contains("no such template"));

        let err = render(&mut tpl, r#"{{template "t" .}}"#, "{}").unwrap_err();
        assert!(err.to_string().contains("maximum template depth"));
    }

    #[test]
    fn test_field_of_scalar_is_error() {
        let store = store();
        let mut tpl = instance(&store, "0");
        let err = render(&mut tpl, "{{.name.first}}", r#"{"name":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("can't evaluate field first"));
    }
}
