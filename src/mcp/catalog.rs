//! Remote tool catalog and its translation into oracle tool definitions.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::oracle::{sanitize_tool_name, DELEGATE_TOOL};
use crate::types::ToolDefinition;

/// Schema for a tool exposed by the remote tool service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl RemoteTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

/// Deterministic two-way mapping between remote tool names and the
/// sanitized names the oracle sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    /// Keyed by oracle-facing name.
    tools: BTreeMap<String, RemoteTool>,
    oracle_names: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn new(mut remote: Vec<RemoteTool>) -> Self {
        remote.sort_by(|a, b| a.name.cmp(&b.name));
        remote.dedup_by(|a, b| a.name == b.name);

        // Tools whose name is already oracle-safe keep it; renamed ones are
        // suffixed afterwards.
        let (exact, renamed): (Vec<_>, Vec<_>) = remote
            .into_iter()
            .map(|tool| {
                let base = match sanitize_tool_name(&tool.name) {
                    s if s.is_empty() => "tool".to_string(),
                    s => s,
                };
                (tool, base)
            })
            .partition(|(tool, base)| *base == tool.name && base.as_str() != DELEGATE_TOOL);

        let mut catalog = Self::default();
        for (tool, base) in exact.into_iter().chain(renamed) {
            let mut candidate = base.clone();
            let mut n = 1;
            while candidate == DELEGATE_TOOL || catalog.tools.contains_key(&candidate) {
                candidate = format!("{base}_{n}");
                n += 1;
            }
            catalog
                .oracle_names
                .insert(tool.name.clone(), candidate.clone());
            catalog.tools.insert(candidate, tool);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Remote tool behind an oracle-facing name.
    pub fn resolve(&self, oracle_name: &str) -> Option<&RemoteTool> {
        self.tools.get(oracle_name)
    }

    /// Oracle-facing name of a remote tool.
    pub fn oracle_name(&self, remote_name: &str) -> Option<&str> {
        self.oracle_names.get(remote_name).map(String::as_str)
    }

    pub fn remote_tools(&self) -> impl Iterator<Item = &RemoteTool> {
        self.tools.values()
    }

    /// Oracle tool definitions for the tools accepted by `allow`, which
    /// receives the remote name.
    pub fn definitions(&self, allow: impl Fn(&str) -> bool) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|(_, tool)| allow(&tool.name))
            .map(|(name, tool)| ToolDefinition {
                name: name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: normalize_schema(&tool.input_schema),
            })
            .collect()
    }
}

/// Coerce an input schema into the object shape function-calling APIs accept.
fn normalize_schema(schema: &Value) -> Value {
    let mut obj = match schema {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    obj.remove("$schema");
    obj.insert("type".into(), json!("object"));
    obj.entry("properties").or_insert_with(|| json!({}));
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tool(name: &str) -> RemoteTool {
        RemoteTool::new(name, format!("{name} tool"), json!({"type": "object"}))
    }

    #[test]
    fn names_are_sanitized_and_invertible() {
        let catalog = ToolCatalog::new(vec![tool("loan.calc"), tool("lookup")]);
        assert_eq!(catalog.oracle_name("loan.calc"), Some("loancalc"));
        assert_eq!(catalog.resolve("loancalc").unwrap().name, "loan.calc");
        assert_eq!(catalog.resolve("lookup").unwrap().name, "lookup");
    }

    #[test]
    fn collisions_and_reserved_names_get_suffixes() {
        let catalog = ToolCatalog::new(vec![tool("a.b"), tool("ab"), tool("delegate")]);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.oracle_name("ab"), Some("ab"));
        assert_eq!(catalog.oracle_name("a.b"), Some("ab_1"));
        assert_eq!(catalog.oracle_name("delegate"), Some("delegate_1"));
    }

    #[test]
    fn new_upstream_tool_does_not_rename_an_existing_one() {
        let before = ToolCatalog::new(vec![tool("ab")]);
        let after = ToolCatalog::new(vec![tool("a.b"), tool("ab"), tool("a-b!")]);
        assert_eq!(before.oracle_name("ab"), Some("ab"));
        assert_eq!(after.oracle_name("ab"), Some("ab"));
        assert_eq!(after.oracle_name("a-b!"), Some("a-b"));
        assert_eq!(after.oracle_name("a.b"), Some("ab_1"));
    }

    #[test]
    fn translation_is_deterministic_regardless_of_order() {
        let a = ToolCatalog::new(vec![tool("x.y"), tool("xy")]);
        let b = ToolCatalog::new(vec![tool("xy"), tool("x.y")]);
        assert_eq!(a, b);
    }

    #[test]
    fn definitions_respect_allow_list_and_normalize_schema() {
        let catalog = ToolCatalog::new(vec![
            RemoteTool::new("lookup", "find", json!({"$schema": "x", "properties": {"id": {"type": "string"}}})),
            tool("save"),
        ]);
        let defs = catalog.definitions(|name| name == "lookup");
        assert_eq!(defs.len(), 1);
        assert_eq!(
            defs[0].parameters,
            json!({"type": "object", "properties": {"id": {"type": "string"}}})
        );
    }
}
