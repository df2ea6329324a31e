//! Resolved version lookup.
//!
//! Determines the exact version (or source reference) the project's lockfile
//! pins for a dependency, so the sandbox installs the same thing.

use crate::config::loader::{read_manifest, ConfigError};
use crate::package_details::PackageDetails;
use crate::package_manager::PackageManager;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("could not determine the installed version of {package}: {reason}")]
    Unresolved { package: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Version recorded in the installed copy's `package.json`.
pub fn installed_version(
    app_root: &Path,
    details: &PackageDetails,
) -> Result<String, ResolutionError> {
    let manifest_path = app_root.join(&details.path).join("package.json");
    let manifest = read_manifest(&manifest_path)?;
    manifest
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ResolutionError::Unresolved {
            package: details.path_specifier.clone(),
            reason: format!("{} has no version field", manifest_path.display()),
        })
}

/// Resolve the version string to install for `details`.
///
/// Lockfile lookups that find nothing fall back to the installed version.
pub fn resolve_version(
    details: &PackageDetails,
    package_manager: PackageManager,
    app_root: &Path,
) -> Result<String, ResolutionError> {
    let installed = installed_version(app_root, details)?;
    let lockfile = app_root.join(package_manager.lockfile_name());

    let from_lockfile = match package_manager {
        PackageManager::Npm | PackageManager::NpmShrinkwrap if lockfile.is_file() => {
            let lock = read_manifest(&lockfile)?;
            npm_lock_entry(&lock, details)
                .and_then(|entry| npm_entry_source(&entry, &details.name, app_root))
        }
        PackageManager::Yarn if lockfile.is_file() => {
            let contents = fs::read_to_string(&lockfile).map_err(|source| {
                ConfigError::Io {
                    path: lockfile.clone(),
                    source,
                }
            })?;
            yarn_lock_source(&contents, &details.name, &installed, app_root)
        }
        _ => None,
    };

    let version = from_lockfile.unwrap_or(installed);
    tracing::debug!(package = %details.path_specifier, %version, "resolved version");
    Ok(version)
}

fn npm_lock_entry(lock: &Value, details: &PackageDetails) -> Option<Value> {
    if let Some(entry) = lock.get("packages").and_then(|p| p.get(&details.path)) {
        return Some(entry.clone());
    }

    // lockfileVersion 1: nested `dependencies` objects, possibly hoisted
    let mut node = lock;
    for name in &details.names {
        match node.get("dependencies").and_then(|d| d.get(name)) {
            Some(next) => node = next,
            None => {
                return lock
                    .get("dependencies")
                    .and_then(|d| d.get(&details.name))
                    .cloned();
            }
        }
    }
    Some(node.clone())
}

fn npm_entry_source(entry: &Value, name: &str, app_root: &Path) -> Option<String> {
    let resolved = entry.get("resolved").and_then(Value::as_str);
    let version = entry.get("version").and_then(Value::as_str);

    if entry.get("link").and_then(Value::as_bool) == Some(true) {
        return resolved.map(|path| absolute_file_spec(&format!("file:{path}"), app_root));
    }
    if let Some(resolved) = resolved.filter(|r| is_git_source(r)) {
        return Some(resolved.to_string());
    }
    // aliased install: `"alias": "npm:real@1.0.0"` records the real name
    let real_name = entry.get("name").and_then(Value::as_str).filter(|n| *n != name);
    match version {
        Some(v) if semver::Version::parse(v).is_ok() => match real_name {
            Some(real) => Some(format!("npm:{real}@{v}")),
            None => Some(v.to_string()),
        },
        Some(v) => Some(absolute_file_spec(v, app_root)),
        None => None,
    }
}

#[derive(Default)]
struct YarnEntry {
    /// What the project asked for, the part of the block key after `name@`
    specifier: String,
    version: Option<String>,
    resolved: Option<String>,
}

/// Find the yarn.lock block for `name` matching the installed version.
///
/// Local and aliased dependencies are reinstalled from the key's specifier,
/// git sources from `resolved`, everything else by version.
fn yarn_lock_source(
    contents: &str,
    name: &str,
    installed: &str,
    app_root: &Path,
) -> Option<String> {
    let mut entries: Vec<YarnEntry> = Vec::new();
    let mut in_block = false;

    for line in contents.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') {
            let specifier = line
                .trim_end_matches(':')
                .split(", ")
                .map(|key| key.trim_matches('"'))
                .find(|key| yarn_key_name(key) == Some(name))
                .map(|key| key[name.len() + 1..].to_string());
            in_block = specifier.is_some();
            if let Some(specifier) = specifier {
                entries.push(YarnEntry {
                    specifier,
                    ..YarnEntry::default()
                });
            }
            continue;
        }
        if !in_block {
            continue;
        }
        let Some(current) = entries.last_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if let Some(value) = yarn_field(trimmed, "version") {
            current.version = Some(value);
        } else if let Some(value) = yarn_field(trimmed, "resolved") {
            current.resolved = Some(value);
        }
    }

    let entry = entries
        .iter()
        .find(|entry| entry.version.as_deref() == Some(installed))
        .or_else(|| entries.first())?;

    if entry.specifier.starts_with("file:") {
        return Some(absolute_file_spec(&entry.specifier, app_root));
    }
    if entry.specifier.starts_with("npm:") {
        return Some(entry.specifier.clone());
    }
    match &entry.resolved {
        Some(source) if is_git_source(source) => Some(source.clone()),
        _ => entry.version.clone(),
    }
}

fn yarn_key_name(key: &str) -> Option<&str> {
    let at = key.get(1..)?.find('@')? + 1;
    Some(&key[..at])
}

fn yarn_field(line: &str, field: &str) -> Option<String> {
    let rest = line.strip_prefix(field)?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    if !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim().trim_matches('"').to_string())
}

fn is_git_source(source: &str) -> bool {
    source.starts_with("git+")
        || source.starts_with("git:")
        || source.starts_with("git@")
        || source.starts_with("github:")
        || source.contains("codeload.github.com")
        || (source.contains('#') && !source.contains(".tgz"))
}

fn absolute_file_spec(spec: &str, app_root: &Path) -> String {
    match spec.strip_prefix("file:") {
        Some(path) if !Path::new(path).is_absolute() => {
            format!("file:{}", app_root.join(path).display())
        }
        _ => spec.to_string(),
    }
}

/// Rewrite relative `file:` references to absolute ones.
///
/// Applied to the project's `resolutions`/`overrides` before they are copied
/// into the sandbox manifest, which lives outside the project tree.
pub fn resolve_relative_file_dependencies(app_root: &Path, value: &Value) -> Value {
    match value {
        Value::String(spec) => Value::String(absolute_file_spec(spec, app_root)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_relative_file_dependencies(app_root, v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
