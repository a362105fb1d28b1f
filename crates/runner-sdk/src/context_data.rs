use crate::case_insensitive::CaseInsensitiveMap;
use crate::error::{PluginError, Result};
use serde::{Deserialize, Serialize};

/// Runner-scoped values such as `CAInfo` or `ProxyUrl`.
pub const RUNNER_CONTEXT: &str = "runner";
/// Job-scoped values such as `workspace` or `repository`.
pub const GITHUB_CONTEXT: &str = "github";

/// A dictionary node of the context tree. Keys are case-insensitive.
pub type DictionaryContextData = CaseInsensitiveMap<PipelineContextData>;

/// One node of the execution-context tree handed over by the runner.
///
/// The tree arrives as plain JSON, so a node is whichever shape the JSON
/// value has. Only dictionaries and strings carry meaning for the plugin SDK;
/// the remaining scalars are kept so the context round-trips intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineContextData {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<PipelineContextData>),
    Dictionary(DictionaryContextData),
}

impl PipelineContextData {
    /// Build a dictionary node from `(key, node)` pairs.
    pub fn dictionary<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PipelineContextData)>,
    {
        Self::Dictionary(entries.into_iter().collect())
    }

    pub fn as_dictionary(&self) -> Option<&DictionaryContextData> {
        match self {
            Self::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PipelineContextData {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PipelineContextData {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Look up `key` inside the `namespace` dictionary of `root`.
///
/// The namespace itself must exist and be a dictionary; anything else means
/// the runner sent a malformed context and is reported as
/// [`PluginError::MalformedContext`]. A missing key, or a key holding a
/// non-string value, yields `Ok(None)`.
pub fn get_scoped_value(
    root: &DictionaryContextData,
    namespace: &str,
    key: &str,
) -> Result<Option<String>> {
    let scope = root
        .get(namespace)
        .and_then(PipelineContextData::as_dictionary)
        .ok_or_else(|| PluginError::MalformedContext {
            namespace: namespace.to_string(),
        })?;

    Ok(scope
        .get(key)
        .and_then(PipelineContextData::as_str)
        .map(str::to_string))
}
