use node_patcher::artifact::{package_details_from_patch_filename, patch_file_name};
use node_patcher::PackageDetails;
use proptest::prelude::*;

fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,12}",
        "@[a-z][a-z0-9]{0,6}/[a-z][a-z0-9-]{0,8}",
    ]
}

fn version_strategy() -> impl Strategy<Value = String> {
    (0u32..20, 0u32..20, 0u32..50)
        .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
}

proptest! {
    #[test]
    fn naming_is_deterministic(
        names in prop::collection::vec(name_strategy(), 1..4),
        version in version_strategy(),
    ) {
        let details = PackageDetails::from_names(names.clone()).unwrap();
        let again = PackageDetails::from_names(names).unwrap();
        prop_assert_eq!(patch_file_name(&details, &version), patch_file_name(&again, &version));
    }

    #[test]
    fn commit_hash_suffix_is_kept(hash in "[0-9a-f]{7,40}") {
        let details = PackageDetails::from_names(vec!["lib".to_string()]).unwrap();
        let version = format!("git+https://github.com/owner/lib.git#{hash}");
        let file_name = patch_file_name(&details, &version);
        prop_assert_eq!(file_name, format!("lib+{hash}.patch"));
    }

    #[test]
    fn file_name_encodes_dependency_path(
        names in prop::collection::vec(name_strategy(), 1..4),
        version in version_strategy(),
    ) {
        let details = PackageDetails::from_names(names).unwrap();
        let file_name = patch_file_name(&details, &version);
        let parsed = package_details_from_patch_filename(&file_name).unwrap();
        prop_assert_eq!(parsed.path_specifier, details.path_specifier);
        prop_assert_eq!(parsed.version, version);
    }
}

#[test]
fn test_deadbeef_suffix() {
    let details = PackageDetails::from_cli_string("left-pad").unwrap();
    let file_name = patch_file_name(&details, "github:stevemao/left-pad#deadbeef");
    assert!(file_name.ends_with("deadbeef.patch"));
    assert!(!file_name.contains("github"));
}
