use crate::package_manager::PackageManager;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_INCLUDE: &str = ".*";
pub const DEFAULT_EXCLUDE: &str = r"package\.json$";
pub const DEFAULT_PATCH_DIR: &str = "patches";

/// Process-wide switches, threaded explicitly into every component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Echo subprocess output and emit debug logs
    pub verbose: bool,
    /// Emit extra diagnostic output
    pub debug: bool,
}

/// Optional `.node-patcher.toml` at the project root.
///
/// Every key is optional; CLI flags take precedence.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub patch_dir: Option<String>,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub case_sensitive_path_filtering: Option<bool>,
    #[serde(default)]
    pub package_manager: Option<String>,
}

/// Everything one patch-generation run needs besides the package specifier.
#[derive(Debug, Clone)]
pub struct MakePatchOptions {
    /// Project root containing `package.json` and `node_modules`
    pub app_path: PathBuf,
    /// Patches directory, relative to `app_path`
    pub patch_dir: String,
    pub include: String,
    pub exclude: String,
    pub case_sensitive_path_filtering: bool,
    pub package_manager: Option<PackageManager>,
    pub create_issue: bool,
    /// Parent directory for isolated workspaces (system temp when unset)
    pub temp_root: Option<PathBuf>,
    /// Where internal-error diagnostics are written (current dir when unset)
    pub diagnostics_dir: Option<PathBuf>,
    /// Command line echoed into the patch header
    pub invocation: Vec<String>,
    pub options: Options,
}

impl MakePatchOptions {
    pub fn new(app_path: impl Into<PathBuf>) -> Self {
        Self {
            app_path: app_path.into(),
            patch_dir: DEFAULT_PATCH_DIR.to_string(),
            include: DEFAULT_INCLUDE.to_string(),
            exclude: DEFAULT_EXCLUDE.to_string(),
            case_sensitive_path_filtering: false,
            package_manager: None,
            create_issue: false,
            temp_root: None,
            diagnostics_dir: None,
            invocation: Vec::new(),
            options: Options::default(),
        }
    }

    /// Fill unset values from a project config file.
    ///
    /// Only fields still at their defaults are replaced.
    pub fn merge_file_config(&mut self, file: &FileConfig) -> Result<(), String> {
        if let Some(dir) = &file.patch_dir {
            if self.patch_dir == DEFAULT_PATCH_DIR {
                self.patch_dir = dir.clone();
            }
        }
        if let Some(include) = &file.include {
            if self.include == DEFAULT_INCLUDE {
                self.include = include.clone();
            }
        }
        if let Some(exclude) = &file.exclude {
            if self.exclude == DEFAULT_EXCLUDE {
                self.exclude = exclude.clone();
            }
        }
        if let Some(case_sensitive) = file.case_sensitive_path_filtering {
            self.case_sensitive_path_filtering |= case_sensitive;
        }
        if self.package_manager.is_none() {
            if let Some(name) = &file.package_manager {
                let pm = <PackageManager as clap::ValueEnum>::from_str(name, true)
                    .map_err(|_| format!("unknown package_manager '{name}'"))?;
                self.package_manager = Some(pm);
            }
        }
        Ok(())
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.app_path.join(&self.patch_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_fills_defaults_only() {
        let mut opts = MakePatchOptions::new("/app");
        opts.exclude = "spec".to_string();
        let file = FileConfig {
            patch_dir: Some("fixes".to_string()),
            include: Some("^lib/".to_string()),
            exclude: Some("test".to_string()),
            case_sensitive_path_filtering: Some(true),
            package_manager: Some("pnpm".to_string()),
        };
        opts.merge_file_config(&file).unwrap();

        assert_eq!(opts.patch_dir, "fixes");
        assert_eq!(opts.include, "^lib/");
        assert_eq!(opts.exclude, "spec");
        assert!(opts.case_sensitive_path_filtering);
        assert_eq!(opts.package_manager, Some(PackageManager::Pnpm));
        assert_eq!(opts.patches_dir(), PathBuf::from("/app/fixes"));
    }

    #[test]
    fn test_unknown_package_manager_is_rejected() {
        let mut opts = MakePatchOptions::new("/app");
        let file = FileConfig {
            package_manager: Some("bower".to_string()),
            ..FileConfig::default()
        };
        assert!(opts.merge_file_config(&file).is_err());
    }
}
