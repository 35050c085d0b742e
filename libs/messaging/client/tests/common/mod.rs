//! Shared helpers for bus client integration tests

#![allow(dead_code)]

use config::Config;
use types::Field;

/// Loopback config on a broker no other test shares
pub fn loopback_config(tag: &str) -> Config {
    Config::from_args([
        "mw-id=loopback".to_string(),
        format!("mw-server={tag}-{}", uuid::Uuid::new_v4().simple()),
    ])
}

pub fn with_option(mut config: Config, key: &str, value: &str) -> Config {
    config.add_value(key, value);
    config
}

/// Identity fields the standard templates require
pub fn standard_fields(component: &str) -> Vec<Field> {
    vec![
        Field::header("MISSION-ID", "MSN").unwrap(),
        Field::header("FACILITY", "FAC").unwrap(),
        Field::header("COMPONENT", component).unwrap(),
    ]
}
