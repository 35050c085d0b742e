//! XML configuration files
//!
//! A file holds one or more named sections:
//!
//! ```xml
//! <DEFINITIONS>
//!     <CONFIG NAME="Bolt">
//!         <PARAMETER NAME="mw-id">loopback</PARAMETER>
//!     </CONFIG>
//! </DEFINITIONS>
//! ```
//!
//! A bare `<CONFIG>` root is accepted as a file with a single section.

use crate::{Config, ConfigError, ConfigResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_TAG: &str = "CONFIG";
const PARAMETER_TAG: &str = "PARAMETER";

/// The parsed sections of a configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    sections: Vec<Config>,
}

impl ConfigFile {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut file = Self::parse(&xml)?;
        file.path = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            sections = file.sections.len(),
            "Loaded configuration file"
        );
        Ok(file)
    }

    pub fn parse(xml: &str) -> ConfigResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut sections = Vec::new();
        let mut current: Option<Config> = None;
        let mut parameter: Option<String> = None;
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader
                .read_event()
                .map_err(|e| ConfigError::parse(position, e.to_string()))?;

            match event {
                Event::Start(element) => {
                    depth += 1;
                    match tag_name(&element).as_str() {
                        CONFIG_TAG => {
                            if current.is_some() {
                                return Err(ConfigError::parse(position, "nested CONFIG element"));
                            }
                            current = Some(section_from(&element, position)?);
                        }
                        PARAMETER_TAG if current.is_some() => {
                            parameter = name_attribute(&element, position)?;
                            text.clear();
                        }
                        _ => {}
                    }
                }
                Event::Empty(element) => {
                    // <CONFIG NAME="x"/> is an empty section; an empty PARAMETER has no value
                    if tag_name(&element) == CONFIG_TAG && current.is_none() {
                        sections.push(section_from(&element, position)?);
                    }
                }
                Event::Text(content) => {
                    if parameter.is_some() {
                        let unescaped = content
                            .unescape()
                            .map_err(|e| ConfigError::parse(position, e.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(content) => {
                    if parameter.is_some() {
                        text.push_str(&String::from_utf8_lossy(&content));
                    }
                }
                Event::End(element) => {
                    depth = depth.saturating_sub(1);
                    let name = String::from_utf8_lossy(element.name().as_ref()).to_ascii_uppercase();
                    match name.as_str() {
                        PARAMETER_TAG => {
                            if let (Some(config), Some(key)) = (current.as_mut(), parameter.take()) {
                                let value = text.trim();
                                if !value.is_empty() {
                                    config.add_value(&key, value);
                                }
                            }
                            text.clear();
                        }
                        CONFIG_TAG => {
                            if let Some(config) = current.take() {
                                sections.push(config);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 || current.is_some() {
            return Err(ConfigError::parse(
                reader.buffer_position() as u64,
                "unexpected end of document",
            ));
        }

        Ok(Self {
            path: None,
            sections,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sections(&self) -> &[Config] {
        &self.sections
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().filter_map(Config::name)
    }

    /// Look up a section by name, or take the first one when `name` is None
    pub fn section(&self, name: Option<&str>) -> ConfigResult<Config> {
        match name {
            Some(name) => self
                .sections
                .iter()
                .find(|section| section.name() == Some(name))
                .cloned()
                .ok_or_else(|| ConfigError::NotFound(name.to_string())),
            None => self
                .sections
                .first()
                .cloned()
                .ok_or_else(|| ConfigError::parse(0, "no CONFIG section found")),
        }
    }
}

fn tag_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).to_ascii_uppercase()
}

fn section_from(element: &BytesStart<'_>, position: u64) -> ConfigResult<Config> {
    let mut config = Config::new();
    if let Some(name) = name_attribute(element, position)? {
        config.set_name(name);
    }
    Ok(config)
}

fn name_attribute(element: &BytesStart<'_>, position: u64) -> ConfigResult<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| ConfigError::parse(position, e.to_string()))?;
        if attribute.key.as_ref().eq_ignore_ascii_case(b"NAME") {
            let value = attribute
                .unescape_value()
                .map_err(|e| ConfigError::parse(position, e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
