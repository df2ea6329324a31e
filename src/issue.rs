//! Upstream issue links.
//!
//! After a patch is written the user can be pointed at the dependency's
//! GitHub issue tracker with a pre-filled report containing the patch.

use crate::package_details::PackageDetails;
use crate::package_manager::PackageManager;
use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use std::path::Path;

/// A GitHub repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    pub owner: String,
    pub repo: String,
}

impl GithubRepo {
    pub fn new_issue_url(&self, title: &str, body: &str) -> String {
        format!(
            "https://github.com/{}/{}/issues/new?title={}&body={}",
            self.owner,
            self.repo,
            percent_encode(title),
            percent_encode(body)
        )
    }
}

/// Percent-encode a string for use in URLs according to RFC 3986.
///
/// Unreserved characters are kept; space becomes `%20`.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push_str("%20"),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

/// Parse the common spellings of a GitHub repository.
///
/// Handles `owner/repo`, `github:owner/repo`, `https://github.com/owner/repo`,
/// `git+https://…`, `git://…` and `git@github.com:owner/repo.git`.
pub fn parse_github_repo(spec: &str) -> Option<GithubRepo> {
    let spec = spec.trim();
    let path = if let Some(rest) = spec.strip_prefix("github:") {
        rest
    } else if let Some(index) = spec.find("github.com") {
        spec[index + "github.com".len()..].trim_start_matches([':', '/'])
    } else if !spec.contains(':') && spec.matches('/').count() == 1 {
        spec
    } else {
        return None;
    };

    let path = path.split(['#', '?']).next().unwrap_or(path);
    let mut parts = path.trim_end_matches('/').splitn(3, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next()?.trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some(GithubRepo {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// GitHub repository declared in a package manifest, if any.
pub fn repository_from_manifest(manifest: &Value) -> Option<GithubRepo> {
    let repository = manifest.get("repository")?;
    let spec = repository
        .as_str()
        .or_else(|| repository.get("url").and_then(Value::as_str))?;
    parse_github_repo(spec)
}

fn issue_body(details: &PackageDetails, version: &str, patch: &str, pm: PackageManager) -> String {
    format!(
        "Hi! Thanks for your work on this project.\n\n\
         Today I used node-patcher to patch `{}@{version}` for the project I'm working on \
         (installed with {pm}).\n\n\
         <!-- Please describe the problem and any relevant context here -->\n\n\
         Here is the diff that solved my problem:\n\n\
         ```diff\n{patch}\n```\n",
        details.name
    )
}

/// Open a URL in the default browser (cross-platform).
///
/// Spawns the platform opener and ignores failures.
pub fn open_url(url: &str) {
    #[cfg(target_os = "windows")]
    let spawned = std::process::Command::new("cmd")
        .args(["/c", "start", "", url])
        .spawn();
    #[cfg(target_os = "macos")]
    let spawned = std::process::Command::new("open").arg(url).spawn();
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let spawned = std::process::Command::new("xdg-open").arg(url).spawn();

    if let Err(err) = spawned {
        tracing::warn!(error = %err, "could not open browser");
        println!("Open this link to create the issue:\n{url}");
    }
}

/// Either open a pre-filled issue or print a hint on how to create one.
///
/// Does nothing when the dependency is not hosted on GitHub.
pub fn offer_issue_creation(
    app_root: &Path,
    details: &PackageDetails,
    version: &str,
    patch: &str,
    pm: PackageManager,
    create_issue: bool,
) {
    let manifest_path = app_root.join(&details.path).join("package.json");
    let Some(repo) = crate::config::read_manifest(&manifest_path)
        .ok()
        .as_ref()
        .and_then(repository_from_manifest)
    else {
        return;
    };

    if create_issue {
        let title = format!("Patch for {}@{version}", details.name);
        open_url(&repo.new_issue_url(&title, &issue_body(details, version, patch, pm)));
    } else {
        println!(
            "\n{} {} is on GitHub! To draft an issue based on your patch run\n\n    \
             {} {} --create-issue\n",
            "💡".yellow(),
            details.name.bold(),
            crate::artifact::CANONICAL_NAME,
            details.path_specifier
        );
    }
}

/// Pre-filled bug report for this tool, when its repository is known.
pub fn bug_report_url(title: &str, body: &str) -> Option<String> {
    parse_github_repo(env!("CARGO_PKG_REPOSITORY")).map(|repo| repo.new_issue_url(title, body))
}
