use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_SNAPSHOT_FULL_ALIAS: &str = "browser_snapshot_full";
pub const DEFAULT_SNAPSHOT_TOOL: &str = "browser_snapshot";
const MCP_RESULT_TOOLS_FIELD: &str = "tools";
const ALIAS_DESCRIPTION_SUFFIX: &str =
    "Returns the complete, unsummarized output; use it only when the compact result is not enough.";

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `ToolAliasError` values.
pub enum ToolAliasError {
    #[error("tool alias '{0}' must use the form ALIAS=TARGET")]
    MissingSeparator(String),
    #[error("tool alias and target names cannot be empty")]
    EmptyName,
    #[error("tool alias '{0}' cannot point at itself")]
    SelfReference(String),
    #[error("tool alias '{alias}' is already mapped to '{target}'")]
    Conflict { alias: String, target: String },
    #[error("tool alias target '{0}' is itself an alias")]
    ChainedAlias(String),
}

/// Parse one `ALIAS=TARGET` mapping.
pub fn parse_tool_alias_mapping(raw: &str) -> Result<(String, String), ToolAliasError> {
    let Some((alias, target)) = raw.split_once('=') else {
        return Err(ToolAliasError::MissingSeparator(raw.to_string()));
    };
    let alias = alias.trim();
    let target = target.trim();
    if alias.is_empty() || target.is_empty() {
        return Err(ToolAliasError::EmptyName);
    }
    if alias == target {
        return Err(ToolAliasError::SelfReference(alias.to_string()));
    }
    Ok((alias.to_string(), target.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Extra public tool names that forward to an existing upstream tool.
pub struct ToolAliasTable {
    aliases: BTreeMap<String, String>,
}

impl ToolAliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_aliases() -> Self {
        let mut table = Self::new();
        table
            .aliases
            .insert(DEFAULT_SNAPSHOT_FULL_ALIAS.to_string(), DEFAULT_SNAPSHOT_TOOL.to_string());
        table
    }

    pub fn insert(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<(), ToolAliasError> {
        let alias = alias.into();
        let target = target.into();
        if alias.trim().is_empty() || target.trim().is_empty() {
            return Err(ToolAliasError::EmptyName);
        }
        if alias == target {
            return Err(ToolAliasError::SelfReference(alias));
        }
        if self.aliases.contains_key(&target) {
            return Err(ToolAliasError::ChainedAlias(target));
        }
        if self.aliases.values().any(|existing| existing == &alias) {
            return Err(ToolAliasError::ChainedAlias(alias));
        }
        match self.aliases.get(&alias) {
            Some(existing) if existing == &target => Ok(()),
            Some(existing) => Err(ToolAliasError::Conflict {
                alias,
                target: existing.clone(),
            }),
            None => {
                self.aliases.insert(alias, target);
                Ok(())
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    /// Rewrite `params.name` of a `tools/call` request from an alias to its
    /// target. Returns the target when a rewrite happened.
    pub fn rewrite_call_params(&self, params: &mut Value) -> Option<String> {
        let name = params.get("name")?.as_str()?;
        let target = self.resolve(name)?.to_string();
        let object = params.as_object_mut()?;
        object.insert("name".to_string(), Value::String(target.clone()));
        Some(target)
    }

    /// Add one synthetic descriptor per alias to a tool listing result.
    ///
    /// An alias is added only when its target is listed and the alias itself
    /// is not. Existing entries are left untouched. Returns the number of
    /// entries added.
    pub fn inject_alias_descriptors(&self, result: &mut Value) -> usize {
        if self.is_empty() {
            return 0;
        }
        let Some(tools) = result
            .get_mut(MCP_RESULT_TOOLS_FIELD)
            .and_then(Value::as_array_mut)
        else {
            return 0;
        };

        let listed = tools
            .iter()
            .filter_map(|tool| tool.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect::<BTreeSet<_>>();

        let mut additions = Vec::new();
        for (alias, target) in self.iter() {
            if listed.contains(alias) || !listed.contains(target) {
                continue;
            }
            let Some(descriptor) = tools
                .iter()
                .find(|tool| tool.get("name").and_then(Value::as_str) == Some(target))
            else {
                continue;
            };
            if let Some(alias_descriptor) = alias_descriptor(descriptor, alias) {
                additions.push(alias_descriptor);
            }
        }
        let added = additions.len();
        tools.extend(additions);
        added
    }
}

fn alias_descriptor(descriptor: &Value, alias: &str) -> Option<Value> {
    let mut copy = descriptor.as_object()?.clone();
    copy.insert("name".to_string(), Value::String(alias.to_string()));

    let description = match copy.get("description").and_then(Value::as_str) {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{} {ALIAS_DESCRIPTION_SUFFIX}", existing.trim_end())
        }
        _ => ALIAS_DESCRIPTION_SUFFIX.to_string(),
    };
    copy.insert("description".to_string(), Value::String(description));

    if let Some(title) = copy.get("title").and_then(Value::as_str) {
        let title = format!("{title} (full)");
        copy.insert("title".to_string(), Value::String(title));
    }
    if let Some(annotations) = copy.get_mut("annotations").and_then(Value::as_object_mut) {
        if let Some(title) = annotations.get("title").and_then(Value::as_str) {
            let title = format!("{title} (full)");
            annotations.insert("title".to_string(), Value::String(title));
        }
    }
    Some(Value::Object(copy))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Tool names whose responses are forwarded without summarization.
pub struct SkipSet {
    names: BTreeSet<String>,
}

impl SkipSet {
    /// Every alias name is skipped in addition to `names`.
    pub fn new<I, S>(names: I, aliases: &ToolAliasTable) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut skip = names
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| !name.trim().is_empty())
            .collect::<BTreeSet<_>>();
        skip.extend(aliases.iter().map(|(alias, _)| alias.to_string()));
        Self { names: skip }
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.names.contains(tool_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
