use node_patcher::{CommandOutput, CommandRunner, MakePatchOptions, RunnerError, SystemRunner};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

pub fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

pub fn copy_tree(from: &Path, to: &Path) {
    for entry in WalkDir::new(from) {
        let entry = entry.unwrap();
        let target = to.join(entry.path().strip_prefix(from).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Stands in for npm, yarn and pnpm; forwards git to the host.
pub struct FakeInstaller {
    registry: PathBuf,
    git: SystemRunner,
    /// Install attempts that should fail before one succeeds
    failures_left: Cell<usize>,
    pub installs: RefCell<Vec<String>>,
}

impl FakeInstaller {
    pub fn new(registry: &Path) -> Self {
        Self {
            registry: registry.to_path_buf(),
            git: SystemRunner::default(),
            failures_left: Cell::new(0),
            installs: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(registry: &Path, failures: usize) -> Self {
        let runner = Self::new(registry);
        runner.failures_left.set(failures);
        runner
    }

    fn install(&self, program: &str, cwd: &Path) -> CommandOutput {
        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(cwd.join("package.json")).unwrap()).unwrap();
        let deps = manifest["dependencies"].as_object().cloned().unwrap_or_default();

        for (name, version) in deps {
            let version = version.as_str().unwrap();
            let (published, version) = match version.strip_prefix("npm:") {
                Some(alias) => alias.rsplit_once('@').unwrap(),
                None => (name.as_str(), version),
            };
            let source = self.registry.join(published).join(version);
            if !source.is_dir() {
                return CommandOutput {
                    stderr: format!("404 {name}@{version}").into_bytes(),
                    status: Some(1),
                    ..CommandOutput::default()
                };
            }
            let dest = cwd.join("node_modules").join(&name);
            if program == "pnpm" {
                let store = cwd
                    .join("node_modules/.pnpm")
                    .join(format!("{}@{version}", name.replace('/', "+")))
                    .join("node_modules")
                    .join(&name);
                copy_tree(&source, &store);
                fs::create_dir_all(dest.parent().unwrap()).unwrap();
                #[cfg(unix)]
                std::os::unix::fs::symlink(&store, &dest).unwrap();
                #[cfg(not(unix))]
                copy_tree(&store, &dest);
            } else {
                copy_tree(&source, &dest);
            }
        }

        CommandOutput {
            status: Some(0),
            ..CommandOutput::default()
        }
    }
}

impl CommandRunner for FakeInstaller {
    fn run(
        &self,
        argv: &[&str],
        cwd: &Path,
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, RunnerError> {
        match argv.first().copied() {
            Some("git") => self.git.run(argv, cwd, env),
            Some(program @ ("npm" | "yarn" | "pnpm")) => {
                self.installs.borrow_mut().push(argv.join(" "));
                if self.failures_left.get() > 0 {
                    self.failures_left.set(self.failures_left.get() - 1);
                    return Ok(CommandOutput {
                        stderr: b"postinstall script failed".to_vec(),
                        status: Some(1),
                        ..CommandOutput::default()
                    });
                }
                Ok(self.install(program, cwd))
            }
            Some(program) => Err(RunnerError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not faked"),
            }),
            None => Err(RunnerError::EmptyCommand),
        }
    }
}

/// A project directory, a fixture registry and a private temp root.
pub struct Project {
    pub app: TempDir,
    pub registry: TempDir,
    pub temp_root: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let project = Self {
            app: tempfile::tempdir().unwrap(),
            registry: tempfile::tempdir().unwrap(),
            temp_root: tempfile::tempdir().unwrap(),
        };
        write(
            &project.app.path().join("package.json"),
            &json!({ "name": "app", "version": "1.0.0" }).to_string(),
        );
        project
    }

    pub fn root(&self) -> &Path {
        self.app.path()
    }

    /// Publish `name@version` to the registry and install it in the project
    /// at `path` (relative, e.g. `node_modules/left-pad`).
    pub fn add_package(&self, path: &str, name: &str, version: &str, files: &[(&str, &str)]) {
        let published = self.registry.path().join(name).join(version);
        let manifest = json!({ "name": name, "version": version }).to_string();
        write(&published.join("package.json"), &manifest);
        for (file, contents) in files {
            write(&published.join(file), contents);
        }
        copy_tree(&published, &self.root().join(path));
    }

    pub fn write_npm_lock(&self, packages: Value) {
        let lock = json!({ "name": "app", "lockfileVersion": 3, "packages": packages });
        write(&self.root().join("package-lock.json"), &lock.to_string());
    }

    pub fn edit(&self, path: &str, contents: &str) {
        write(&self.root().join(path), contents);
    }

    pub fn options(&self) -> MakePatchOptions {
        let mut opts = MakePatchOptions::new(self.root());
        opts.temp_root = Some(self.temp_root.path().to_path_buf());
        opts.diagnostics_dir = Some(self.root().to_path_buf());
        opts.invocation = vec!["node-patcher".to_string()];
        opts
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root().join("patches")
    }

    pub fn leftover_workspaces(&self) -> usize {
        fs::read_dir(self.temp_root.path()).unwrap().count()
    }
}

pub const LEFT_PAD_INDEX: &str =
    "module.exports = leftPad;\n\nfunction leftPad(str, len, ch) {\n  return str;\n}\n";

/// npm project with `left-pad@1.3.0` installed and locked.
pub fn left_pad_project() -> Project {
    let project = Project::new();
    project.add_package(
        "node_modules/left-pad",
        "left-pad",
        "1.3.0",
        &[("index.js", LEFT_PAD_INDEX), ("README.md", "# left-pad\n")],
    );
    project.write_npm_lock(json!({
        "": { "name": "app" },
        "node_modules/left-pad": {
            "version": "1.3.0",
            "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
        }
    }));
    project
}
