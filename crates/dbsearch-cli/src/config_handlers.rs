//! Handler functions for config CLI commands.
//!
//! Implements the `config` subcommands (`show`, `get`, `init`) over the
//! TOML configuration file, plus the dotted-key helpers they use.

use std::io::Write;
use std::path::Path;

use crate::cli::ConfigAction;
use crate::config::CliConfig;
use crate::error::{Error, Result};

// ============================================================================
// Command dispatch
// ============================================================================

/// Handle a config subcommand.
pub fn handle_config_command(path: &Path, action: ConfigAction, out: &mut dyn Write) -> Result<()> {
    match action {
        ConfigAction::Show => cmd_config_show(path, out),
        ConfigAction::Get { key } => cmd_config_get(path, &key, out),
        ConfigAction::Init { force } => cmd_config_init(path, force, out),
    }
}

/// Print the configuration with defaults filled in.
pub fn cmd_config_show(path: &Path, out: &mut dyn Write) -> Result<()> {
    let config = CliConfig::load(path)?;
    let text = config.to_toml_string()?;
    write!(out, "{text}").map_err(|e| Error::io(e, "stdout"))
}

/// Get a configuration value by dotted key.
pub fn cmd_config_get(path: &Path, key: &str, out: &mut dyn Write) -> Result<()> {
    let config = CliConfig::load(path)?;
    let value = toml::Value::try_from(&config).map_err(|e| Error::config(e.to_string()))?;
    match get_nested_value(&value, key) {
        Some(val) => writeln!(out, "{}", format_toml_value(val)).map_err(|e| Error::io(e, "stdout")),
        None => Err(Error::config(format!(
            "Key '{key}' not found in configuration"
        ))),
    }
}

/// Create a default configuration file.
pub fn cmd_config_init(path: &Path, force: bool, out: &mut dyn Write) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent))?;
    }

    let toml_str = CliConfig::default().to_toml_string()?;
    std::fs::write(path, &toml_str).map_err(|e| Error::io(e, path))?;

    writeln!(out, "Config file created at {}", path.display()).map_err(|e| Error::io(e, "stdout"))
}

// ============================================================================
// TOML dotted-key helpers
// ============================================================================

/// Navigate a dotted key path in a TOML value tree.
pub fn get_nested_value<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    let mut current = value;
    for part in key.split('.') {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

/// Format a TOML value for display on stdout.
pub fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("dbsearch.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn run(path: &Path, action: ConfigAction) -> Result<String> {
        let mut out = Vec::new();
        handle_config_command(path, action, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    // ------------------------------------------------------------------------
    // cmd_config_get tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_cmd_config_get_simple_key() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "min_chars = 4\n");
        let output = run(&path, ConfigAction::Get { key: "min_chars".into() }).unwrap();
        assert_eq!(output, "4\n");
    }

    #[test]
    fn test_cmd_config_get_nested_key_with_default() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let output = run(
            &path,
            ConfigAction::Get {
                key: "autocomplete.suggest_words".into(),
            },
        )
        .unwrap();
        assert_eq!(output, "true\n");
    }

    #[test]
    fn test_cmd_config_get_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");
        let err = run(&path, ConfigAction::Get { key: "nope.deeper".into() }).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    // ------------------------------------------------------------------------
    // cmd_config_init tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_cmd_config_init_creates_loadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dbsearch.toml");
        let output = run(&path, ConfigAction::Init { force: false }).unwrap();
        assert!(output.starts_with("Config file created at"));
        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.backend.default_limit, 10);
    }

    #[test]
    fn test_cmd_config_init_no_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "min_chars = 4\n");
        assert!(run(&path, ConfigAction::Init { force: false }).is_err());
        run(&path, ConfigAction::Init { force: true }).unwrap();
        assert_eq!(CliConfig::load(&path).unwrap().backend.min_chars, 1);
    }

    #[test]
    fn test_cmd_config_show_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "matching = \"partial\"\n");
        let output = run(&path, ConfigAction::Show).unwrap();
        assert!(output.contains("matching = \"partial\""));
        assert!(output.contains("default_limit = 10"));
    }

    // ------------------------------------------------------------------------
    // Helper tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_get_nested_value() {
        let value: toml::Value = toml::from_str("[a]\nb = 1\n").unwrap();
        assert_eq!(
            get_nested_value(&value, "a.b"),
            Some(&toml::Value::Integer(1))
        );
        assert!(get_nested_value(&value, "a.c").is_none());
        assert!(get_nested_value(&value, "a.b.c").is_none());
    }

    #[test]
    fn test_format_toml_value() {
        assert_eq!(format_toml_value(&toml::Value::String("x".into())), "x");
        assert_eq!(format_toml_value(&toml::Value::Boolean(false)), "false");
        assert_eq!(format_toml_value(&toml::Value::Float(0.9)), "0.9");
    }
}
