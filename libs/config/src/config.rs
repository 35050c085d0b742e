//! Key/value configuration
//!
//! Keys are case-insensitive: they are stored lowercased, so `MW-ID`,
//! `mw-id` and `Mw-Id` all name the same option. Values are kept verbatim.

use crate::{file::ConfigFile, ConfigError, ConfigResult};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// An ordered, case-insensitive set of string options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from `key=value` tokens such as command-line
    /// arguments. Tokens without `=`, or with an empty key or value, are
    /// skipped.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::new();
        for token in args {
            let Some((key, value)) = token.as_ref().split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                continue;
            }
            config.add_value(key, value);
        }
        config
    }

    /// Load one CONFIG section from an XML configuration file.
    ///
    /// With `section == None` the first section in the file is used.
    pub fn from_file(path: impl AsRef<Path>, section: Option<&str>) -> ConfigResult<Self> {
        ConfigFile::load(path)?.section(section)
    }

    /// Parse a single `<CONFIG>` document (or the first section of a
    /// `<DEFINITIONS>` document).
    pub fn from_xml(xml: &str) -> ConfigResult<Self> {
        ConfigFile::parse(xml)?.section(None)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let parsed: Config = serde_json::from_str(json)?;
        // Re-insert so keys loaded from hand-written JSON are normalised
        let mut config = Self::new();
        config.name = parsed.name;
        for (key, value) in parsed.parameters {
            config.add_value(&key, value);
        }
        Ok(config)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Set an option, replacing any previous value for the key
    pub fn add_value(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.parameters
            .insert(normalize_key(key.as_ref()), value.into());
    }

    /// Remove an option. Returns true if it was present.
    pub fn clear_value(&mut self, key: &str) -> bool {
        self.parameters.remove(&normalize_key(key)).is_some()
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.parameters.get(&normalize_key(key)).map(String::as_str)
    }

    pub fn get_value<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.value(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.parameters.contains_key(&normalize_key(key))
    }

    /// Interpret an option as a boolean.
    ///
    /// Accepts `true/false`, `yes/no`, `on/off` and `1/0` in any case.
    /// Unparseable values log a warning and yield `default`.
    pub fn get_boolean_value(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.value(key) else {
            return default;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true,
            "false" | "no" | "off" | "0" => false,
            _ => {
                warn!(key, value = raw, default, "Ignoring non-boolean configuration value");
                default
            }
        }
    }

    pub fn get_integer_value(&self, key: &str, default: i64) -> i64 {
        let Some(raw) = self.value(key) else {
            return default;
        };
        raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = raw, default, "Ignoring non-integer configuration value");
            default
        })
    }

    pub fn get_double_value(&self, key: &str, default: f64) -> f64 {
        let Some(raw) = self.value(key) else {
            return default;
        };
        raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = raw, default, "Ignoring non-numeric configuration value");
            default
        })
    }

    /// Copy options from `other`. Existing keys are only replaced when
    /// `overwrite` is set.
    pub fn merge(&mut self, other: &Config, overwrite: bool) {
        for (key, value) in &other.parameters {
            if overwrite || !self.parameters.contains_key(key) {
                self.parameters.insert(key.clone(), value.clone());
            }
        }
    }

    /// Iterate options in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Render as a `<CONFIG>` element, one tab-indented PARAMETER per option
    pub fn to_xml(&self) -> String {
        let mut xml = match &self.name {
            Some(name) => format!("<CONFIG NAME=\"{}\">\n", escape(name.as_str())),
            None => String::from("<CONFIG>\n"),
        };
        for (key, value) in &self.parameters {
            xml.push_str(&format!(
                "\t<PARAMETER NAME=\"{}\">{}</PARAMETER>\n",
                escape(key.as_str()),
                escape(value.as_str())
            ));
        }
        xml.push_str("</CONFIG>");
        xml
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(ConfigError::from)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut config = Self::new();
        for (key, value) in iter {
            config.add_value(key, value);
        }
        config
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
