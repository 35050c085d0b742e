//! Loading configuration sections from files on disk

use config::{Config, ConfigError, ConfigFile};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_named_section_from_file() {
    let file = write_config(
        r#"<DEFINITIONS>
    <CONFIG NAME="Bolt">
        <PARAMETER NAME="mw-id">loopback</PARAMETER>
        <PARAMETER NAME="mw-server">bolt</PARAMETER>
    </CONFIG>
    <CONFIG NAME="Nut">
        <PARAMETER NAME="MW-ID">loopback</PARAMETER>
        <PARAMETER NAME="msg-content-validate">true</PARAMETER>
    </CONFIG>
</DEFINITIONS>"#,
    );

    let bolt = Config::from_file(file.path(), Some("Bolt")).unwrap();
    assert_eq!(bolt.len(), 2);
    assert_eq!(bolt.value("mw-server"), Some("bolt"));
    assert!(!bolt.get_boolean_value("msg-content-validate", false));

    let nut = Config::from_file(file.path(), Some("Nut")).unwrap();
    assert_eq!(nut.value("mw-id"), Some("loopback"));
    assert!(nut.get_boolean_value("msg-content-validate", false));

    let loaded = ConfigFile::load(file.path()).unwrap();
    assert_eq!(loaded.path(), Some(file.path()));
    assert_eq!(loaded.sections().len(), 2);
}

#[test]
fn test_unknown_section_name() {
    let file = write_config("<CONFIG NAME=\"Only\"><PARAMETER NAME=\"a\">1</PARAMETER></CONFIG>");

    match Config::from_file(file.path(), Some("Other")) {
        Err(ConfigError::NotFound(name)) => assert_eq!(name, "Other"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.xml");

    let err = Config::from_file(&path, None).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.xml"));
}

#[test]
fn test_saved_xml_reloads() {
    let mut original = Config::from_args(["mw-id=loopback", "tracking-publish-time=false"]);
    original.set_name("Saved");

    let file = write_config(&original.to_xml());
    let reloaded = Config::from_file(file.path(), Some("Saved")).unwrap();
    assert_eq!(reloaded, original);
}
