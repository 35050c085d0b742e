//! # Bus Tools
//!
//! Shared plumbing for the command-line programs: `key=value` argument
//! handling, configuration files, logging setup and standard identity
//! fields.
//!
//! Every program accepts free-form `key=value` options. `cfg-file=<path>`
//! loads a configuration file and `cfg-name=<name>` picks a section from
//! it; options given on the command line override the file.

use anyhow::{Context, Result};
use bus_client::options;
use clap::Parser;
use config::Config;
use tracing_subscriber::EnvFilter;
use types::Field;

pub const CFG_FILE: &str = "cfg-file";
pub const CFG_NAME: &str = "cfg-name";
pub const LOG_JSON: &str = "log-json";

#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Options as key=value (e.g. mw-id=loopback loglevel=debug cfg-file=bus.xml)
    #[arg(value_name = "KEY=VALUE")]
    pub options: Vec<String>,
}

impl Args {
    pub fn config(&self) -> Result<Config> {
        load_config(&self.options)
    }
}

/// Build the effective configuration from `key=value` tokens
pub fn load_config<S: AsRef<str>>(tokens: &[S]) -> Result<Config> {
    let from_args = Config::from_args(tokens);

    let Some(path) = from_args.value(CFG_FILE) else {
        return Ok(from_args);
    };
    let mut config = Config::from_file(path, from_args.value(CFG_NAME))
        .with_context(|| format!("loading configuration from {path}"))?;
    config.merge(&from_args, true);
    Ok(config)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `loglevel`.
pub fn init_logging(config: &Config) {
    let level = match config
        .get_value(options::LOG_LEVEL, "info")
        .to_lowercase()
        .as_str()
    {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.get_boolean_value(LOG_JSON, false) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Standard identity fields from `mission-id`, `facility`, `component`
/// and optional `sat-id` options
pub fn standard_fields(config: &Config, default_component: &str) -> Result<Vec<Field>> {
    let mut fields = vec![
        Field::header("MISSION-ID", config.get_value("mission-id", "MISSION"))?,
        Field::header("FACILITY", config.get_value("facility", "FACILITY"))?,
        Field::header(
            "COMPONENT",
            config.get_value(options::COMPONENT, default_component),
        )?,
    ];
    if let Some(sat_id) = config.value("sat-id") {
        fields.push(Field::header("SAT-ID-PHYSICAL", sat_id)?);
        fields.push(Field::header("SAT-ID-LOGICAL", sat_id)?);
    }
    Ok(fields)
}

/// Default to the built-in middleware when none is configured
pub fn ensure_middleware(config: &mut Config) {
    if !config.contains(options::MW_ID) {
        config.add_value(options::MW_ID, "loopback");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_args_override_file_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<DEFINITIONS>
    <CONFIG NAME="ops">
        <PARAMETER NAME="mw-id">loopback</PARAMETER>
        <PARAMETER NAME="loglevel">warn</PARAMETER>
        <PARAMETER NAME="component">FROM-FILE</PARAMETER>
    </CONFIG>
</DEFINITIONS>"#
        )
        .unwrap();

        let tokens = vec![
            format!("cfg-file={}", file.path().display()),
            "cfg-name=ops".to_string(),
            "component=FROM-ARGS".to_string(),
        ];
        let config = load_config(&tokens).unwrap();

        assert_eq!(config.value("loglevel"), Some("warn"));
        assert_eq!(config.value("component"), Some("FROM-ARGS"));
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<CONFIG NAME=\"a\"></CONFIG>").unwrap();

        let tokens = vec![
            format!("cfg-file={}", file.path().display()),
            "cfg-name=b".to_string(),
        ];
        assert!(load_config(&tokens).is_err());
    }

    #[test]
    fn test_standard_fields_from_config() {
        let config = Config::from_args(["mission-id=MSN", "sat-id=SAT1"]);
        let fields = standard_fields(&config, "TOOL").unwrap();

        let names: Vec<_> = fields.iter().map(Field::name).collect();
        assert_eq!(
            names,
            vec!["MISSION-ID", "FACILITY", "COMPONENT", "SAT-ID-PHYSICAL", "SAT-ID-LOGICAL"]
        );
        assert!(fields.iter().all(Field::is_header));
        assert_eq!(fields[2].string_value(), "TOOL");
    }

    #[test]
    fn test_ensure_middleware_keeps_explicit_choice() {
        let mut config = Config::new();
        ensure_middleware(&mut config);
        assert_eq!(config.value("mw-id"), Some("loopback"));

        let mut explicit = Config::from_args(["mw-id=custom"]);
        ensure_middleware(&mut explicit);
        assert_eq!(explicit.value("mw-id"), Some("custom"));
    }
}
