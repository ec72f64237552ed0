//! Template evaluator
//!
//! Walks a parsed [`Node`] tree against a JSON context and writes the output
//! into a string. Function calls are delegated to the [`Resolver`].

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::funcs::{truthy, type_name, Resolver};
use super::parse::{Command, Node, Operand, Pipeline};
use crate::error::{Error, Result};

/// Limit on nested `{{template}}` calls, which stops self-inclusion.
const MAX_TEMPLATE_DEPTH: usize = 100;

/// Printed for a missing value.
pub const NO_VALUE: &str = "<no value>";

static NULL: JsonValue = JsonValue::Null;

pub struct Exec<'a, 's> {
    templates: &'a HashMap<String, Vec<Node>>,
    resolver: &'a mut Resolver<'s>,
    current: String,
    depth: usize,
}

impl<'a, 's> Exec<'a, 's> {
    pub fn new(templates: &'a HashMap<String, Vec<Node>>, resolver: &'a mut Resolver<'s>) -> Self {
        Self {
            templates,
            resolver,
            current: String::new(),
            depth: 0,
        }
    }

    /// Execute the template registered as `name` with `data` as dot.
    pub fn run(&mut self, name: &str, data: &JsonValue) -> Result<String> {
        let mut out = String::new();
        self.invoke(name, data, &mut out)?;
        Ok(out)
    }

    fn invoke(&mut self, name: &str, data: &JsonValue, out: &mut String) -> Result<()> {
        let templates = self.templates;
        let nodes = templates.get(name).ok_or_else(|| Error::Template {
            message: format!("no such template \"{}\"", name),
            name: non_empty(&self.current),
        })?;
        if self.depth >= MAX_TEMPLATE_DEPTH {
            return Err(self.fail(format!(
                "exceeded maximum template depth ({})",
                MAX_TEMPLATE_DEPTH
            )));
        }

        let caller = std::mem::replace(&mut self.current, name.to_string());
        self.depth += 1;
        let result = self.walk(nodes, data, data, out);
        self.depth -= 1;
        self.current = caller;
        result
    }

    fn walk(
        &mut self,
        nodes: &[Node],
        dot: &JsonValue,
        root: &JsonValue,
        out: &mut String,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.pipeline(pipe, dot, root)?;
                    print(&value, out);
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if truthy(&self.pipeline(cond, dot, root)?) {
                        then
                    } else {
                        otherwise
                    };
                    self.walk(branch, dot, root, out)?;
                }
                Node::With {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.pipeline(pipe, dot, root)?;
                    if truthy(&value) {
                        self.walk(body, &value, root, out)?;
                    } else {
                        self.walk(otherwise, dot, root, out)?;
                    }
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                } => {
                    let value = self.pipeline(pipe, dot, root)?;
                    let items: Vec<&JsonValue> = match &value {
                        JsonValue::Null => Vec::new(),
                        JsonValue::Array(items) => items.iter().collect(),
                        JsonValue::Object(map) => map.values().collect(),
                        other => {
                            return Err(self.fail(format!(
                                "range can't iterate over {}",
                                type_name(other)
                            )))
                        }
                    };
                    if items.is_empty() {
                        self.walk(otherwise, dot, root, out)?;
                    }
                    for item in items {
                        self.walk(body, item, root, out)?;
                    }
                }
                Node::Template { name, pipe } => {
                    let data = match pipe {
                        Some(pipe) => self.pipeline(pipe, dot, root)?,
                        None => JsonValue::Null,
                    };
                    self.invoke(name, &data, out)?;
                }
            }
        }
        Ok(())
    }

    fn pipeline(&mut self, pipe: &Pipeline, dot: &JsonValue, root: &JsonValue) -> Result<JsonValue> {
        let mut piped: Option<JsonValue> = None;
        for command in &pipe.commands {
            let value = match command {
                Command::Operand(operand) => self.operand(operand, dot, root)?,
                Command::Call { func, args } => {
                    let mut values = Vec::with_capacity(args.len() + 1);
                    for arg in args {
                        values.push(self.operand(arg, dot, root)?);
                    }
                    if let Some(previous) = piped.take() {
                        values.push(previous);
                    }
                    self.resolver.call(*func, values)?
                }
            };
            piped = Some(value);
        }
        Ok(piped.unwrap_or(JsonValue::Null))
    }

    fn operand(&mut self, operand: &Operand, dot: &JsonValue, root: &JsonValue) -> Result<JsonValue> {
        match operand {
            Operand::Str(s) => Ok(JsonValue::String(s.clone())),
            Operand::Number(n) => Ok(JsonValue::Number(n.clone())),
            Operand::Bool(b) => Ok(JsonValue::Bool(*b)),
            Operand::Nil => Ok(JsonValue::Null),
            Operand::Field(path) => self.field(dot, path),
            Operand::Root(path) => self.field(root, path),
            Operand::Nested(pipe) => self.pipeline(pipe, dot, root),
        }
    }

    fn field(&self, base: &JsonValue, path: &[String]) -> Result<JsonValue> {
        let mut current = base;
        for segment in path {
            current = match current {
                JsonValue::Object(map) => map.get(segment).unwrap_or(&NULL),
                JsonValue::Array(items) => match segment.parse::<usize>() {
                    Ok(index) => items.get(index).unwrap_or(&NULL),
                    Err(_) => return Err(self.cannot_evaluate(segment, current)),
                },
                JsonValue::Null => &NULL,
                other => return Err(self.cannot_evaluate(segment, other)),
            };
        }
        Ok(current.clone())
    }

    fn cannot_evaluate(&self, segment: &str, value: &JsonValue) -> Error {
        self.fail(format!(
            "can't evaluate field {} in type {}",
            segment,
            type_name(value)
        ))
    }

    fn fail(&self, message: String) -> Error {
        Error::Template {
            message,
            name: non_empty(&self.current),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    (!name.is_empty()).then(|| name.to_string())
}

fn print(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Null => out.push_str(NO_VALUE),
        JsonValue::String(s) => out.push_str(s),
        JsonValue::Number(n) => out.push_str(&n.to_string()),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        other => out.push_str(&other.to_string()),
    }
}
