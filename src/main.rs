use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use node_patcher::config::{load_file_config, DEFAULT_EXCLUDE, DEFAULT_INCLUDE, DEFAULT_PATCH_DIR};
use node_patcher::issue::bug_report_url;
use node_patcher::{
    make_patch, telemetry, MakePatchError, MakePatchOptions, Options, PackageManager, SystemRunner,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "node-patcher")]
#[command(
    about = "Create patch files from edits made to installed npm dependencies",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Packages to patch, e.g. `left-pad`, `@scope/pkg` or `parent/child`
    #[arg(required = true, value_name = "PACKAGE")]
    packages: Vec<String>,

    /// Directory for patch files, relative to the project root
    #[arg(long, default_value = DEFAULT_PATCH_DIR)]
    patch_dir: String,

    /// Only files matching this regex are considered
    #[arg(long, default_value = DEFAULT_INCLUDE)]
    include: String,

    /// Files matching this regex are ignored
    #[arg(long, default_value = DEFAULT_EXCLUDE)]
    exclude: String,

    /// Match --include and --exclude case-sensitively
    #[arg(long)]
    case_sensitive_path_filtering: bool,

    /// Override package manager detection
    #[arg(long, value_enum)]
    package_manager: Option<PackageManager>,

    /// Open a pre-filled GitHub issue for the patched package
    #[arg(long)]
    create_issue: bool,

    /// Echo package manager and git output
    #[arg(short, long)]
    verbose: bool,

    /// Print extra diagnostic output
    #[arg(long)]
    debug: bool,

    /// Project root containing package.json (defaults to the current directory)
    #[arg(long)]
    app_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = Options {
        verbose: cli.verbose || cli.debug,
        debug: cli.debug,
    };
    telemetry::init(options);

    let app_path = match cli.app_path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let mut opts = MakePatchOptions::new(&app_path);
    opts.patch_dir = cli.patch_dir;
    opts.include = cli.include;
    opts.exclude = cli.exclude;
    opts.case_sensitive_path_filtering = cli.case_sensitive_path_filtering;
    opts.package_manager = cli.package_manager;
    opts.create_issue = cli.create_issue;
    opts.invocation = std::env::args().collect();
    opts.options = options;

    if let Some(file_config) = load_file_config(&app_path)? {
        opts.merge_file_config(&file_config)
            .map_err(anyhow::Error::msg)
            .context("Invalid project configuration")?;
    }

    let runner = SystemRunner::new(options.verbose);
    let mut failed = 0usize;
    for package in &cli.packages {
        if let Err(err) = make_patch(package, &opts, &runner) {
            report_failure(package, &err);
            failed += 1;
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn report_failure(package: &str, err: &MakePatchError) {
    eprintln!("{} {}: {}", "✗".red(), package.bold(), err);

    if !err.is_internal() {
        return;
    }
    eprintln!();
    eprintln!(
        "{}",
        "This looks like a bug in node-patcher, not a problem with your changes.".yellow()
    );
    if let Some(path) = err.diagnostic_path() {
        eprintln!("  Diagnostic file: {}", path.display());
        eprintln!("  Please attach it when reporting the problem.");
    }
    let body = format!(
        "Patch generation failed for `{package}`.\n\nError: {err}\n\n\
         Please attach node-patcher-error.json.gz from the directory you ran the command in."
    );
    if let Some(url) = bug_report_url("Patch parse failure", &body) {
        eprintln!("  Report it at: {url}");
    }
}
