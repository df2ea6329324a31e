//! Node Patcher: capture edits to installed npm dependencies as patch files
//!
//! A developer edits files under `node_modules`, then asks for a patch. The
//! pipeline reinstalls a clean copy of that one dependency in a throwaway
//! directory, commits it with git, overlays the edited copy and writes the
//! scoped diff to `patches/<name>+<version>.patch`.
//!
//! # Architecture
//!
//! - [`package_manager`] decides which installer dialect governs the project
//! - [`workspace`] owns the temporary sandbox
//! - [`install`] reproduces the baseline with the project's package manager
//! - [`scribe`] snapshots baseline and edits with git and diffs them
//! - [`patch`] parses the diff back to prove it is re-appliable
//! - [`artifact`] names, headers and persists the result
//!
//! Every external program runs through [`runner::CommandRunner`], so the
//! whole pipeline can be driven by a fake installer in tests.
//!
//! # Example
//!
//! ```no_run
//! use node_patcher::{make_patch, MakePatchOptions, SystemRunner};
//!
//! let opts = MakePatchOptions::new(".");
//! match make_patch("left-pad", &opts, &SystemRunner::default()) {
//!     Ok(outcome) => println!("wrote {}", outcome.patch.path.display()),
//!     Err(e) => eprintln!("patch failed: {e}"),
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod filter;
pub mod install;
pub mod issue;
pub mod package_details;
pub mod package_manager;
pub mod patch;
pub mod pipeline;
pub mod resolution;
pub mod runner;
pub mod scribe;
pub mod telemetry;
pub mod workspace;

// Re-exports
pub use artifact::{
    get_patch_files, package_details_from_patch_filename, patch_file_name, ArtifactError,
    PatchArtifactWriter, PatchedPackage, WrittenPatch,
};
pub use config::{ConfigError, FileConfig, MakePatchOptions, Options};
pub use install::{BaselineInstaller, InstallError, InstallReport};
pub use package_details::PackageDetails;
pub use package_manager::{detect_package_manager, Detection, PackageManager, ResolverError};
pub use patch::{parse_patch, DiffValidator, FilePatch, PatchParseError, ValidationError};
pub use pipeline::{make_patch, MakePatchError, PatchOutcome};
pub use runner::{CommandOutput, CommandRunner, RunnerError, SystemRunner};
pub use scribe::{ScribeError, VersionControlScribe};
pub use workspace::{IsolatedWorkspace, WorkspaceError};
