use super::support::{left_pad_project, write, FakeInstaller, Project, LEFT_PAD_INDEX};
use node_patcher::install::InstallError;
use node_patcher::package_manager::ResolverError;
use node_patcher::{get_patch_files, make_patch, parse_patch, MakePatchError};
use serde_json::json;
use std::fs;

fn patched_index() -> String {
    format!("// fixed for our build\n{LEFT_PAD_INDEX}")
}

#[test]
fn test_npm_left_pad_end_to_end() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("left-pad", &project.options(), &runner).unwrap();

    assert_eq!(outcome.version, "1.3.0");
    assert_eq!(outcome.patch.file_name, "left-pad+1.3.0.patch");
    assert_eq!(outcome.file_count, 1);
    assert_eq!(*runner.installs.borrow(), vec!["npm i --force".to_string()]);

    let contents = fs::read_to_string(project.patches_dir().join("left-pad+1.3.0.patch")).unwrap();
    assert!(contents.starts_with("# generated by node-patcher"));
    assert!(contents.contains("# left-pad: 1.3.0\n"));
    assert!(contents.contains(
        "diff --git a/node_modules/left-pad/index.js b/node_modules/left-pad/index.js"
    ));
    assert!(contents.contains("+// fixed for our build"));
    assert_eq!(contents.matches("diff --git").count(), 1);

    let files = parse_patch(&contents).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "node_modules/left-pad/index.js");

    assert_eq!(project.leftover_workspaces(), 0);
}

#[test]
fn test_unmodified_package_writes_nothing() {
    let project = left_pad_project();
    let runner = FakeInstaller::new(project.registry.path());

    let err = make_patch("left-pad", &project.options(), &runner).unwrap_err();

    assert!(matches!(err, MakePatchError::EmptyDiff { .. }));
    assert!(get_patch_files(&project.patches_dir()).unwrap().is_empty());
    assert_eq!(project.leftover_workspaces(), 0);
}

#[test]
fn test_workspaces_are_removed_after_repeated_runs() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());

    for _ in 0..3 {
        let runner = FakeInstaller::new(project.registry.path());
        make_patch("left-pad", &project.options(), &runner).unwrap();
    }
    for _ in 0..3 {
        let runner = FakeInstaller::failing(project.registry.path(), 2);
        let err = make_patch("left-pad", &project.options(), &runner).unwrap_err();
        assert!(matches!(err, MakePatchError::Install(_)));
    }

    assert_eq!(project.leftover_workspaces(), 0);
    assert_eq!(
        get_patch_files(&project.patches_dir()).unwrap(),
        vec!["left-pad+1.3.0.patch"]
    );
}

#[test]
fn test_install_retries_without_scripts() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());
    let runner = FakeInstaller::failing(project.registry.path(), 1);

    make_patch("left-pad", &project.options(), &runner).unwrap();

    assert_eq!(
        *runner.installs.borrow(),
        vec![
            "npm i --force".to_string(),
            "npm i --ignore-scripts --force".to_string()
        ]
    );
}

#[test]
fn test_install_failure_reports_both_attempts() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());
    let runner = FakeInstaller::failing(project.registry.path(), 2);

    let err = make_patch("left-pad", &project.options(), &runner).unwrap_err();

    let MakePatchError::Install(InstallError::Failed { first, second, .. }) = &err else {
        panic!("expected install failure, got {err:?}");
    };
    assert!(first.to_string().contains("npm i --force"));
    assert!(second.to_string().contains("--ignore-scripts"));
    assert!(!project.patches_dir().exists());
}

#[test]
fn test_new_patch_supersedes_older_version() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());
    write(&project.patches_dir().join("left-pad+1.0.0.patch"), "old\n");
    write(&project.patches_dir().join("right-pad+1.0.0.patch"), "other\n");
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("left-pad", &project.options(), &runner).unwrap();

    assert_eq!(outcome.patch.superseded, vec!["left-pad+1.0.0.patch"]);
    assert_eq!(
        get_patch_files(&project.patches_dir()).unwrap(),
        vec!["left-pad+1.3.0.patch", "right-pad+1.0.0.patch"]
    );
}

#[test]
fn test_missing_package_is_a_target_error() {
    let project = left_pad_project();
    let runner = FakeInstaller::new(project.registry.path());

    let err = make_patch("right-pad", &project.options(), &runner).unwrap_err();

    assert!(matches!(err, MakePatchError::TargetMissing { .. }));
    assert!(runner.installs.borrow().is_empty());
    assert_eq!(project.leftover_workspaces(), 0);
}

#[test]
fn test_project_without_lockfile_is_rejected() {
    let project = Project::new();
    project.add_package("node_modules/left-pad", "left-pad", "1.3.0", &[("index.js", "x\n")]);
    let runner = FakeInstaller::new(project.registry.path());

    let err = make_patch("left-pad", &project.options(), &runner).unwrap_err();

    assert!(matches!(
        err,
        MakePatchError::Resolver(ResolverError::NoLockfile { .. })
    ));
}

#[test]
fn test_nested_scoped_package() {
    let project = Project::new();
    project.add_package("node_modules/parent", "parent", "1.0.0", &[("index.js", "p\n")]);
    project.add_package(
        "node_modules/parent/node_modules/@scope/child",
        "@scope/child",
        "2.0.0",
        &[("lib/child.js", "exports.value = 1;\n")],
    );
    project.write_npm_lock(json!({
        "node_modules/parent": { "version": "1.0.0" },
        "node_modules/parent/node_modules/@scope/child": { "version": "2.0.0" }
    }));
    project.edit(
        "node_modules/parent/node_modules/@scope/child/lib/child.js",
        "exports.value = 2;\n",
    );
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("parent/@scope/child", &project.options(), &runner).unwrap();

    assert_eq!(outcome.patch.file_name, "parent++@scope+child+2.0.0.patch");
    assert!(outcome.patch.contents.contains("# @scope/child: 2.0.0\n"));
    assert!(outcome.patch.contents.contains("# path: parent => @scope/child\n"));
    assert!(outcome
        .patch
        .contents
        .contains("b/node_modules/parent/node_modules/@scope/child/lib/child.js"));
}

#[test]
fn test_exclude_pattern_limits_patch() {
    let project = left_pad_project();
    project.edit("node_modules/left-pad/index.js", &patched_index());
    project.edit("node_modules/left-pad/README.md", "# left-pad (patched)\n");
    let runner = FakeInstaller::new(project.registry.path());
    let mut opts = project.options();
    opts.exclude = r"\.md$".to_string();

    let outcome = make_patch("left-pad", &opts, &runner).unwrap();

    assert_eq!(outcome.file_count, 1);
    assert!(!outcome.patch.contents.contains("README.md"));
}

#[test]
fn test_npm_alias_installs_real_package_and_names_patch_by_alias() {
    let project = Project::new();
    project.add_package(
        "node_modules/pad",
        "left-pad",
        "1.3.0",
        &[("index.js", LEFT_PAD_INDEX)],
    );
    project.write_npm_lock(json!({
        "": { "name": "app" },
        "node_modules/pad": { "name": "left-pad", "version": "1.3.0" }
    }));
    project.edit("node_modules/pad/index.js", &patched_index());
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("pad", &project.options(), &runner).unwrap();

    assert_eq!(outcome.version, "1.3.0");
    assert_eq!(outcome.patch.file_name, "pad+1.3.0.patch");
    assert_eq!(outcome.file_count, 1);
    assert!(outcome
        .patch
        .contents
        .contains("diff --git a/node_modules/pad/index.js b/node_modules/pad/index.js"));
    assert_eq!(project.leftover_workspaces(), 0);
}

#[test]
fn test_yarn_project() {
    let project = Project::new();
    project.add_package(
        "node_modules/left-pad",
        "left-pad",
        "1.3.0",
        &[("index.js", LEFT_PAD_INDEX)],
    );
    write(
        &project.root().join("yarn.lock"),
        "# yarn lockfile v1\n\n\nleft-pad@^1.3.0:\n  version \"1.3.0\"\n  \
         resolved \"https://registry.yarnpkg.com/left-pad/-/left-pad-1.3.0.tgz#abc\"\n",
    );
    project.edit("node_modules/left-pad/index.js", &patched_index());
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("left-pad", &project.options(), &runner).unwrap();

    assert_eq!(outcome.package_manager.to_string(), "yarn");
    assert_eq!(
        *runner.installs.borrow(),
        vec!["yarn install --ignore-engines".to_string()]
    );
    assert_eq!(outcome.patch.file_name, "left-pad+1.3.0.patch");
}

#[test]
#[cfg(unix)]
fn test_pnpm_symlinked_install_is_normalized() {
    let project = Project::new();
    project.add_package(
        "node_modules/left-pad",
        "left-pad",
        "1.3.0",
        &[("index.js", LEFT_PAD_INDEX)],
    );
    write(&project.root().join("pnpm-workspace.yaml"), "packages: []\n");
    write(&project.root().join("pnpm-lock.yaml"), "lockfileVersion: '9.0'\n");
    project.edit("node_modules/left-pad/index.js", &patched_index());
    let runner = FakeInstaller::new(project.registry.path());

    let outcome = make_patch("left-pad", &project.options(), &runner).unwrap();

    assert_eq!(outcome.package_manager.to_string(), "pnpm");
    assert_eq!(outcome.file_count, 1);
    assert!(outcome
        .patch
        .contents
        .contains("diff --git a/node_modules/left-pad/index.js b/node_modules/left-pad/index.js"));
    assert_eq!(project.leftover_workspaces(), 0);
}
