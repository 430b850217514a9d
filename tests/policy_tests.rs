#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Project policy tests for the Would You Rather client.
//!
//! These tests verify that Cargo.toml lints, features and demo targets conform
//! to project policy. All checks are synchronous filesystem reads.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads a file relative to the project root and returns its contents.
fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    })
}

fn project_file_exists(relative_path: &str) -> bool {
    project_root().join(relative_path).is_file()
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_has_all_panic_free_lints() {
        let cargo = read_project_file("Cargo.toml");

        for lint in REQUIRED_DENY_LINTS {
            let pattern = format!("{lint} = \"deny\"");
            assert!(
                cargo.contains(&pattern),
                "Cargo.toml is missing `{pattern}` in [lints.clippy]. \
                 The session loop must never panic on a malformed snapshot."
            );
        }
    }

    #[test]
    fn cargo_toml_has_lints_clippy_section() {
        let cargo = read_project_file("Cargo.toml");
        assert!(cargo.contains("[lints.clippy]"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    #[test]
    fn memory_store_is_a_default_feature() {
        let cargo = read_project_file("Cargo.toml");
        assert!(cargo.contains("default = [\"store-memory\"]"));
    }

    #[test]
    fn declared_demos_exist() {
        let cargo = read_project_file("Cargo.toml");
        for demo in ["demos/two_player.rs", "demos/custom_store.rs"] {
            assert!(cargo.contains(demo), "Cargo.toml does not declare {demo}");
            assert!(project_file_exists(demo), "{demo} is missing");
        }
    }

    #[test]
    fn fuzz_crate_targets_this_package() {
        let fuzz = read_project_file("fuzz/Cargo.toml");
        assert!(fuzz.contains("[dependencies.wyr-client]"));
        assert!(project_file_exists("fuzz/fuzz_targets/fuzz_game_document.rs"));
    }
}
