use super::*;
use crate::tri_state::TriState;
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_manifest_with_overlay_and_sorting() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    let overlay_path = dir.path().join("overlay.yaml");

    let base = r#"
version: 1
modules:
  - name: cert-manager
    order: 20
    static_enabled: "true"
  - name: ingress-nginx
    order: 5
    static_enabled: "unset"
"#;

    let overlay = r#"
version: 1
modules:
  cert-manager:
    order: 1
  dashboard:
    order: 30
    static_enabled: "false"
"#;

    fs::write(&base_path, base).unwrap();
    fs::write(&overlay_path, overlay).unwrap();

    let manifest = CatalogManifest::load(&base_path, Some(&overlay_path)).unwrap();
    assert_eq!(manifest.version, 1);
    assert_eq!(manifest.modules.len(), 3);
    assert_eq!(manifest.modules[0].name, "cert-manager");
    assert_eq!(manifest.modules[0].order, 1);
    assert_eq!(manifest.modules[1].name, "ingress-nginx");
    assert_eq!(manifest.modules[2].name, "dashboard");
    assert_eq!(manifest.modules[2].static_enabled, TriState::False);
}

#[test]
fn rejects_version_mismatch() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    fs::write(&base_path, "version: 2\nmodules: []\n").unwrap();

    let err = CatalogManifest::load(&base_path, None).unwrap_err();
    assert!(err.to_string().contains("version"));
}

#[test]
fn rejects_duplicate_entries_within_a_layer() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    fs::write(
        &base_path,
        "version: 1\nmodules:\n  - name: a\n  - name: a\n",
    )
    .unwrap();

    let err = CatalogManifest::load(&base_path, None).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn missing_overlay_file_is_not_an_error() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    fs::write(&base_path, "version: 1\nmodules:\n  - name: a\n").unwrap();

    let manifest =
        CatalogManifest::load(&base_path, Some(&dir.path().join("missing.yaml"))).unwrap();
    assert_eq!(manifest.modules.len(), 1);
}

#[test]
fn default_order_and_enabled_state_are_unset() {
    let dir = tempdir().unwrap();
    let base_path = dir.path().join("base.yaml");
    fs::write(&base_path, "version: 1\nmodules:\n  - name: a\n").unwrap();

    let manifest = CatalogManifest::load(&base_path, None).unwrap();
    assert_eq!(manifest.modules[0].order, DEFAULT_ORDER);
    assert_eq!(manifest.modules[0].static_enabled, TriState::Unset);
    assert_eq!(manifest.modules[0].common_static_enabled, TriState::Unset);
}
