//! Integration test for config file loading, mirroring the teacher's
//! `tests/plugin_config_test.rs` pattern of writing a temp file and
//! loading it back through the public API.

use anyhow::Result;
use std::io::Write;
use stepcore_host::config::Config;
use tempfile::Builder;

#[test]
fn round_trips_toml_config_from_disk() -> Result<()> {
    let mut file = Builder::new().suffix(".toml").tempfile()?;
    writeln!(
        file,
        r#"
[mcu]
freq = 16000000.0
move_queue_depth = 4

[[steppers]]
oid = 1
max_error = 25
"#
    )?;

    let config = Config::from_file(file.path())?;
    config.validate()?;
    assert_eq!(config.mcu.move_queue_depth, 4);
    assert_eq!(config.steppers[0].oid, 1);
    Ok(())
}

#[test]
fn round_trips_json_config_from_disk() -> Result<()> {
    let mut file = Builder::new().suffix(".json").tempfile()?;
    writeln!(
        file,
        r#"{{"mcu": {{"freq": 16000000.0}}, "steppers": [{{"oid": 2}}]}}"#
    )?;

    let config = Config::from_file(file.path())?;
    config.validate()?;
    assert_eq!(config.steppers[0].oid, 2);
    Ok(())
}

#[test]
fn rejects_config_with_no_steppers() -> Result<()> {
    let mut file = Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "[mcu]\nfreq = 16000000.0\n")?;

    let config = Config::from_file(file.path())?;
    assert!(config.validate().is_err());
    Ok(())
}
