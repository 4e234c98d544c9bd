// crates/publisher-core/tests/proptest_derivation.rs
// ============================================================================
// Module: Derivation Property-Based Tests
// Description: Property tests for reference splitting and tag/version rules.
// Purpose: Detect panics and invariant breaks across wide input ranges.
// ============================================================================

//! Property-based tests for derivation invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use publisher_core::derive::compute_base_tags;
use publisher_core::derive::is_nightly_version;
use publisher_core::derive::sibling_arch_tag;
use publisher_core::derive::split_repo_and_tag;
use publisher_core::derive::transform_version;

fn repo_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}\\.[a-z]{2,3}(:[0-9]{2,5})?", "[a-z]{1,8}(/[a-z]{1,8}){0,2}")
        .prop_map(|(host, path)| format!("{host}/{path}"))
}

fn platform_strategy() -> impl Strategy<Value = (String, String)> {
    (
        prop_oneof![Just("linux".to_string()), Just("darwin".to_string())],
        prop_oneof![Just("amd64".to_string()), Just("arm64".to_string())],
    )
}

proptest! {
    #[test]
    fn tagged_references_split_at_the_name_colon(
        repo in repo_strategy(),
        tag in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,19}",
    ) {
        let (split_repo, split_tag) = split_repo_and_tag(&format!("{repo}:{tag}")).unwrap();
        prop_assert_eq!(split_repo, repo);
        prop_assert_eq!(split_tag, tag);
    }

    #[test]
    fn digest_references_split_at_the_at_sign(
        repo in repo_strategy(),
        digest in "[0-9a-f]{64}",
    ) {
        let (split_repo, split_tag) =
            split_repo_and_tag(&format!("{repo}@sha256:{digest}")).unwrap();
        prop_assert_eq!(split_repo, repo);
        prop_assert_eq!(split_tag, format!("sha256:{digest}"));
    }

    #[test]
    fn split_never_panics(reference in ".{0,64}") {
        let _ = split_repo_and_tag(&reference);
    }

    #[test]
    fn sibling_arch_tag_is_an_involution(
        base in "[a-z0-9.-]{1,16}",
        arch in prop_oneof![Just("amd64"), Just("arm64")],
    ) {
        let tag = format!("{base}_linux_{arch}");
        let sibling = sibling_arch_tag(&tag).unwrap();
        prop_assert_ne!(&sibling, &tag);
        prop_assert_eq!(sibling_arch_tag(&sibling).unwrap(), tag);
    }

    #[test]
    fn base_tags_drop_platform_suffixes(
        base in "v[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        arch in prop_oneof![Just("amd64"), Just("arm64")],
    ) {
        let tags = compute_base_tags(&format!("{base}_linux_{arch}"), "release").unwrap();
        prop_assert_eq!(tags.first().cloned(), Some(base));
        for tag in &tags {
            prop_assert!(!tag.ends_with("amd64") && !tag.ends_with("arm64"));
        }
    }

    #[test]
    fn base_tags_never_panic(tag in ".{0,40}", suffix in ".{0,12}") {
        let tags = compute_base_tags(&tag, &suffix).unwrap();
        prop_assert!(!tags.is_empty());
    }

    #[test]
    fn ga_tags_take_version_from_tag(
        (major, minor, patch) in (0u32 .. 20, 0u32 .. 20, 0u32 .. 20),
        declared in ".{0,20}",
        (os, arch) in platform_strategy(),
    ) {
        let semver = format!("v{major}.{minor}.{patch}");
        let tag = format!("{semver}_{os}_{arch}");
        prop_assert_eq!(transform_version(&declared, &tag).unwrap(), semver);
    }

    #[test]
    fn nightly_tags_produce_nightly_versions(
        (major, minor, patch) in (0u32 .. 20, 0u32 .. 20, 0u32 .. 20),
        distance in 1u32 .. 500,
        sha in "[0-9a-f]{7,12}",
        branch in prop_oneof![Just("master"), Just("main")],
        (os, arch) in platform_strategy(),
    ) {
        let declared = format!("v{major}.{minor}.{patch}-{distance}-g{sha}");
        let tag = format!("{branch}_{os}_{arch}");
        let version = transform_version(&declared, &tag).unwrap();
        prop_assert_eq!(&version, &format!("v{major}.{minor}.{patch}-nightly"));
        prop_assert!(is_nightly_version(&version).unwrap());
    }

    #[test]
    fn transform_never_panics(version in ".{0,32}", tag in ".{0,32}") {
        let _ = transform_version(&version, &tag);
    }
}
