//! # Parameters
//!
//! Raw parameter records as returned by the store, and the decoder that turns
//! their `key=value` encodings into configuration entries.

use crate::error::MalformedParameterError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between segments of a parameter key
pub const PATH_SEPARATOR: char = '/';

const LIST_SEPARATOR: char = ',';
const KEY_VALUE_SEPARATOR: char = '=';

/// Declared type of a stored parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParameterType {
    #[default]
    String,
    StringList,
    SecureString,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "String",
            ParameterType::StringList => "StringList",
            ParameterType::SecureString => "SecureString",
        }
    }
}

/// Unrecognized type names are read as plain strings
impl From<&str> for ParameterType {
    fn from(name: &str) -> Self {
        match name {
            "StringList" => ParameterType::StringList,
            "SecureString" => ParameterType::SecureString,
            _ => ParameterType::String,
        }
    }
}

impl From<String> for ParameterType {
    fn from(name: String) -> Self {
        ParameterType::from(name.as_str())
    }
}

impl From<ParameterType> for String {
    fn from(parameter_type: ParameterType) -> Self {
        parameter_type.as_str().to_string()
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record returned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParameter {
    /// Full key path, e.g. `/config/application`
    pub name: String,
    /// Value; absent for folder nodes
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "type", default)]
    pub parameter_type: ParameterType,
}

impl RawParameter {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        parameter_type: ParameterType,
    ) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            parameter_type,
        }
    }

    /// A folder node: no value and a key ending with the separator
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            parameter_type: ParameterType::String,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.value.is_none() && self.name.ends_with(PATH_SEPARATOR)
    }
}

/// One configuration key/value pair extracted from a parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub key: String,
    pub value: String,
}

impl DecodedEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Decode a single parameter into its configuration entries
///
/// `StringList` values are comma separated `key=value` items, empty items are
/// ignored. Every other type holds a single `key=value` pair. Values are split
/// on the first `=` only, so `x=y=z` yields (`x`, `y=z`). Any item without a
/// `=` fails the whole parameter.
pub fn decode_parameter(
    parameter: &RawParameter,
) -> Result<Vec<DecodedEntry>, MalformedParameterError> {
    let Some(value) = parameter.value.as_deref() else {
        return Ok(Vec::new());
    };

    match parameter.parameter_type {
        ParameterType::StringList => value
            .split(LIST_SEPARATOR)
            .enumerate()
            .filter(|(_, item)| !item.is_empty())
            .map(|(index, item)| split_pair(parameter, item, index))
            .collect(),
        ParameterType::SecureString | ParameterType::String => {
            Ok(vec![split_pair(parameter, value, 0)?])
        }
    }
}

/// Decode parameters in order, concatenating their entries
pub fn decode_all<'a, I>(parameters: I) -> Result<Vec<DecodedEntry>, MalformedParameterError>
where
    I: IntoIterator<Item = &'a RawParameter>,
{
    let mut entries = Vec::new();
    for parameter in parameters {
        entries.extend(decode_parameter(parameter)?);
    }
    Ok(entries)
}

fn split_pair(
    parameter: &RawParameter,
    item: &str,
    item_index: usize,
) -> Result<DecodedEntry, MalformedParameterError> {
    item.split_once(KEY_VALUE_SEPARATOR)
        .map(|(key, value)| DecodedEntry::new(key, value))
        .ok_or_else(|| MalformedParameterError {
            name: parameter.name.clone(),
            parameter_type: parameter.parameter_type,
            item_index,
        })
}
