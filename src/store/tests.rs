use super::*;
use serde_json::json;
use std::convert::TryFrom;
use tempfile::TempDir;

#[test]
fn test_create_from_plain_names() {
    let store = Box::<dyn Store>::try_from("memory").unwrap();
    assert_eq!(store.name(), "memory");

    let store = Box::<dyn Store>::try_from("memory://").unwrap();
    assert_eq!(store.name(), "memory");
}

#[test]
fn test_create_file_store_from_uris() {
    let store = Box::<dyn Store>::try_from("file:///tmp/depspec").unwrap();
    assert_eq!(store.name(), "file");

    let store = Box::<dyn Store>::try_from("file:state/dev").unwrap();
    assert_eq!(store.name(), "file");
}

#[test]
fn test_file_config_paths() {
    let url = Url::parse("file:///var/lib/depspec").unwrap();
    let config = FileConfig::try_from(&url).unwrap();
    assert_eq!(config.root, std::path::PathBuf::from("/var/lib/depspec"));

    let url = Url::parse("file://state/dev").unwrap();
    assert!(matches!(
        FileConfig::try_from(&url),
        Err(DepSpecError::StoreFailure(_))
    ));
}

#[test]
fn test_file_store_needs_a_directory() {
    for uri in ["file", "file:", "file://", "file:///"] {
        match Box::<dyn Store>::try_from(uri) {
            Err(DepSpecError::StoreFailure(message)) => {
                assert!(message.contains("needs a directory"), "{}: {}", uri, message)
            }
            Err(e) => panic!("{}: unexpected error: {}", uri, e),
            Ok(_) => panic!("{}: expected an error without a directory", uri),
        }
    }
}

#[test]
fn test_relative_file_store_keeps_case() {
    let url = parse_uri("file:My_State/Dev").unwrap();
    let config = FileConfig::try_from(&url).unwrap();
    assert_eq!(
        config.root,
        std::env::current_dir().unwrap().join("My_State/Dev")
    );

    let store = Box::<dyn Store>::try_from("file:My_State/Dev").unwrap();
    assert_eq!(store.name(), "file");
}

#[test]
fn test_unknown_backend() {
    match Box::<dyn Store>::try_from("vault://secrets") {
        Err(DepSpecError::StoreNotFound(scheme)) => assert_eq!(scheme, "vault"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("expected an error for an unregistered scheme"),
    }
}

#[test]
fn test_registry_lists_backends() {
    let names: Vec<_> = stores().iter().map(|info| info.name).collect();
    assert!(names.contains(&"memory"));
    assert!(names.contains(&"file"));

    let file = stores().into_iter().find(|info| info.name == "file").unwrap();
    assert!(file.display_with_examples().starts_with("file: JSON files"));
}

#[test]
fn test_memory_store_overwrites() {
    let store = MemoryStore::default();
    assert_eq!(store.get_secret("asset-management/dev").unwrap(), None);

    store.put_secret("asset-management/dev", "{}").unwrap();
    store
        .put_secret("asset-management/dev", r#"{"svc1":{}}"#)
        .unwrap();
    assert_eq!(
        store.get_secret("asset-management/dev").unwrap().as_deref(),
        Some(r#"{"svc1":{}}"#)
    );

    store
        .put_output("platform", "SettingsOutput", &json!({"vpcId": "vpc-1"}))
        .unwrap();
    assert_eq!(
        store.get_output("platform", "SettingsOutput").unwrap(),
        Some(json!({"vpcId": "vpc-1"}))
    );
    assert_eq!(store.get_output("platform", "Other").unwrap(), None);
}

#[test]
fn test_file_store_layout() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(FileConfig {
        root: dir.path().to_path_buf(),
    });

    store.put_secret("platform/prod", r#"{"svc1":{}}"#).unwrap();
    store
        .put_output("platform", "SettingsOutput", &json!({"vpcId": "vpc-1"}))
        .unwrap();
    store
        .put_output("platform", "DependencySecretName", &json!("platform/prod"))
        .unwrap();

    let secret = std::fs::read_to_string(dir.path().join("secrets/platform/prod.json")).unwrap();
    assert_eq!(secret, r#"{"svc1":{}}"#);

    let outputs: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("outputs/platform.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(outputs["SettingsOutput"]["vpcId"], "vpc-1");
    assert_eq!(outputs["DependencySecretName"], "platform/prod");

    assert_eq!(
        store.get_secret("platform/prod").unwrap().as_deref(),
        Some(r#"{"svc1":{}}"#)
    );
    assert_eq!(store.get_secret("platform/dev").unwrap(), None);
    assert_eq!(store.get_output("other", "SettingsOutput").unwrap(), None);
}

#[test]
fn test_file_store_rejects_escaping_names() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(FileConfig {
        root: dir.path().to_path_buf(),
    });

    assert!(matches!(
        store.put_secret("../outside", "{}"),
        Err(DepSpecError::StoreFailure(_))
    ));
    assert!(matches!(
        store.put_output("a//b", "SettingsOutput", &json!({})),
        Err(DepSpecError::StoreFailure(_))
    ));
}
