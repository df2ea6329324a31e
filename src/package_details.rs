//! Dependency specifiers.
//!
//! A dependency is addressed by the chain of package names leading to it
//! inside `node_modules`, e.g. `react-native/@babel/core` for
//! `node_modules/react-native/node_modules/@babel/core`.

use std::fmt;

/// Identifies one installed dependency instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDetails {
    /// Package names from outermost to innermost
    pub names: Vec<String>,
    /// Innermost package name
    pub name: String,
    /// Relative path inside the project, `node_modules/a/node_modules/b`
    pub path: String,
    /// Names joined with `/`, `a/b`
    pub path_specifier: String,
    /// Names joined with ` => `, `a => b`
    pub human_readable_path_specifier: String,
}

impl PackageDetails {
    /// Build details from a name chain. Returns `None` for an empty chain.
    pub fn from_names(names: Vec<String>) -> Option<Self> {
        let name = names.last()?.clone();
        if names.iter().any(|n| !is_valid_name(n)) {
            return None;
        }
        Some(Self {
            path: format!("node_modules/{}", names.join("/node_modules/")),
            path_specifier: names.join("/"),
            human_readable_path_specifier: names.join(" => "),
            name,
            names,
        })
    }

    /// Parse what the user typed on the command line.
    ///
    /// Accepts `name`, `@scope/name`, `a/b`, `a/node_modules/b` and a leading
    /// `node_modules/`.
    pub fn from_cli_string(spec: &str) -> Option<Self> {
        let spec = spec.trim().replace('\\', "/");
        let mut names = Vec::new();
        let mut parts = spec
            .split('/')
            .filter(|part| !part.is_empty() && *part != "node_modules");

        while let Some(part) = parts.next() {
            if part.starts_with('@') {
                let rest = parts.next()?;
                names.push(format!("{part}/{rest}"));
            } else {
                names.push(part.to_string());
            }
        }

        Self::from_names(names)
    }

    pub fn has_aliases(&self) -> bool {
        self.names.len() > 1
    }
}

impl fmt::Display for PackageDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.human_readable_path_specifier)
    }
}

fn is_valid_name(name: &str) -> bool {
    let bare = match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, rest)) if !scope.is_empty() && !rest.is_empty() => rest,
            _ => return false,
        },
        None => name,
    };
    !bare.is_empty() && !bare.contains('/') && bare != "." && bare != ".."
}
