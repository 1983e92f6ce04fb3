//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, Project, LOCAL_CONFIG_FILE};
use crate::error::{BerthError, BerthResult};
use crate::identity::RuntimeIdentity;
use crate::launch::LaunchConfig;
use crate::ui::{self, UiContext};
use std::path::Path;
use tokio::fs;
use toml_edit::{Array, DocumentMut, Item};

/// How a config value is written to TOML
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Integer,
    Boolean,
    List,
}

/// Keys accepted by `config set`
const KEYS: &[(&str, ValueKind)] = &[
    ("general.log_format", ValueKind::Text),
    ("general.audit_log", ValueKind::Boolean),
    ("image.base", ValueKind::Text),
    ("image.name", ValueKind::Text),
    ("image.workdir", ValueKind::Text),
    ("image.manifest", ValueKind::Text),
    ("image.source", ValueKind::Text),
    ("image.exclude", ValueKind::List),
    ("resolver.installer", ValueKind::List),
    ("resolver.site_dir", ValueKind::Text),
    ("identity.user", ValueKind::Text),
    ("identity.group", ValueKind::Text),
    ("identity.uid", ValueKind::Integer),
    ("identity.gid", ValueKind::Integer),
    ("identity.shell", ValueKind::Text),
    ("launch.executable", ValueKind::List),
    ("launch.entry", ValueKind::Text),
    ("launch.port", ValueKind::Integer),
    ("launch.address", ValueKind::Text),
    ("launch.port_policy", ValueKind::Text),
    ("runtime.binary", ValueKind::Text),
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, project: &Project, manager: &ConfigManager) -> BerthResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(&project.config)?,
        Some(ConfigAction::Path) => show_path(project, manager),
        Some(ConfigAction::Set { key, value, global }) => {
            let path = if global {
                manager.path().to_path_buf()
            } else {
                project.root.join(LOCAL_CONFIG_FILE)
            };
            set_value(&path, &key, &value).await?;
            ui::step_ok(
                &UiContext::detect(),
                &format!("Set {} = {} in {}", key, value, path.display()),
            );
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> BerthResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(project: &Project, manager: &ConfigManager) {
    println!("{}", manager.path().display());
    let local = project.root.join(LOCAL_CONFIG_FILE);
    if local.is_file() {
        println!("{}", local.display());
    }
}

/// Set `key` in the TOML file at `path`, keeping its comments and layout.
///
/// The edited file must still load as a valid configuration; otherwise
/// nothing is written.
async fn set_value(path: &Path, key: &str, value: &str) -> BerthResult<()> {
    let kind = key_kind(key)?;

    let content = if path.exists() {
        fs::read_to_string(path)
            .await
            .map_err(|e| BerthError::io(format!("reading {}", path.display()), e))?
    } else {
        String::new()
    };

    let invalid = |reason: String| BerthError::ConfigInvalid {
        path: path.to_path_buf(),
        reason,
    };

    let mut doc: DocumentMut = content.parse().map_err(|e| invalid(format!("{}", e)))?;
    set_toml_value(&mut doc, key, to_item(kind, value)?)?;

    let updated = doc.to_string();
    let config: Config = toml::from_str(&updated).map_err(|e| invalid(e.to_string()))?;
    validate(&config)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BerthError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::write(path, updated)
        .await
        .map_err(|e| BerthError::io(format!("writing {}", path.display()), e))
}

fn key_kind(key: &str) -> BerthResult<ValueKind> {
    KEYS.iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
        .ok_or_else(|| {
            let valid: Vec<&str> = KEYS.iter().map(|(name, _)| *name).collect();
            BerthError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                valid.join(", ")
            ))
        })
}

fn to_item(kind: ValueKind, value: &str) -> BerthResult<Item> {
    let item = match kind {
        ValueKind::Text => toml_edit::value(value),
        ValueKind::Integer => {
            let n: i64 = value
                .parse()
                .map_err(|_| BerthError::User(format!("Invalid number: {}", value)))?;
            toml_edit::value(n)
        }
        ValueKind::Boolean => toml_edit::value(parse_bool(value)?),
        ValueKind::List => {
            let items: Array = value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .collect();
            toml_edit::value(items)
        }
    };
    Ok(item)
}

/// Set a `section.field` key, creating the section table if needed
fn set_toml_value(doc: &mut DocumentMut, key: &str, item: Item) -> BerthResult<()> {
    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| BerthError::User(format!("Expected section.field, got: {}", key)))?;

    let table = doc
        .entry(section)
        .or_insert(toml_edit::table())
        .as_table_mut()
        .ok_or_else(|| BerthError::User(format!("[{}] is not a table", section)))?;
    table.insert(field, item);
    Ok(())
}

/// Values the type system alone does not catch
fn validate(config: &Config) -> BerthResult<()> {
    LaunchConfig::from_settings(&config.launch)?;
    RuntimeIdentity::from_config(&config.identity)?;
    Ok(())
}

fn parse_bool(value: &str) -> BerthResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(BerthError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}
