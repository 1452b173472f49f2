use crate::store::{MemoryStore, OutputStore, SecretStore};
use crate::*;
use serde_json::json;

const SCHEMA: &str = r#"
[project]
name = "platform"
revision = "1.0"

[kinds.DATABASE]
url = "string"
username = "string"
password = "string"
port = "number"

[kinds.DATABASE.replica]
host = "string"
readonly = "boolean"

[kinds.SENTRY]
dsn = "string"

[settings]
vpcId = "string"
subnetIds = "string_list"
dependencySecretNamePrefix = "string"
"#;

fn schema() -> Schema {
    SCHEMA.parse().unwrap()
}

fn owner() -> BootstrapConfig {
    BootstrapConfig {
        account_id: "123456789012".to_string(),
        region: "eu-west-1".to_string(),
        state_bucket: "tf-state".to_string(),
        environment: "dev".to_string(),
        unit_id: "platform".to_string(),
        mode: UnitMode::Owner,
        secret_prefix: None,
    }
}

fn consumer() -> BootstrapConfig {
    BootstrapConfig {
        unit_id: "billing".to_string(),
        mode: UnitMode::Consumer {
            owner_unit: "platform".to_string(),
        },
        ..owner()
    }
}

fn blob() -> NamespaceBlob {
    NamespaceBlob::from_json(
        r#"{
            "svc1": {
                "DATABASE": {
                    "url": "https://x",
                    "username": "app",
                    "password": "hunter2",
                    "port": 5432,
                    "replica": { "host": "replica.internal", "readonly": true }
                },
                "SENTRY": { "dsn": "https://y" }
            },
            "svc2": {
                "SENTRY": { "dsn": "https://z" }
            }
        }"#,
    )
    .unwrap()
}

fn settings() -> SettingsMap {
    let mut settings = SettingsMap::new();
    settings.insert("vpcId", "vpc-123");
    settings.insert(
        "subnetIds",
        vec!["subnet-a".to_string(), "subnet-b".to_string()],
    );
    settings.insert("dependencySecretNamePrefix", "asset-management");
    settings
}

/// Publishes the fixture payloads as the owner unit.
fn published_store() -> MemoryStore {
    let store = MemoryStore::default();
    let bootstrap = owner();
    let schema = schema();
    Publisher::new(&bootstrap, &schema)
        .unwrap()
        .publish(&blob(), &settings(), &store)
        .unwrap();
    store
}

#[test]
fn test_scenario_a_dependency_attribute() {
    let store = published_store();
    let resolver = Resolver::new(&consumer(), schema());

    let reference = resolver
        .get_dependency("svc1", "DATABASE")
        .unwrap()
        .get(&["url"])
        .unwrap();
    assert_eq!(reference.value_type(), &ValueType::String);

    let value = LocalEvaluator::new(&store).evaluate(&reference).unwrap();
    assert_eq!(value, json!("https://x"));
}

#[test]
fn test_scenario_b_setting() {
    let store = published_store();
    let resolver = Resolver::new(&consumer(), schema());

    let reference = resolver.get_setting("vpcId").unwrap();
    assert_eq!(reference.value_type(), &ValueType::String);
    assert_eq!(
        LocalEvaluator::new(&store).evaluate(&reference).unwrap(),
        json!("vpc-123")
    );

    let subnets = resolver.get_setting("subnetIds").unwrap();
    assert_eq!(subnets.value_type(), &ValueType::StringList);
    assert_eq!(
        LocalEvaluator::new(&store).evaluate(&subnets).unwrap(),
        json!(["subnet-a", "subnet-b"])
    );
}

#[test]
fn test_scenario_c_unknown_attribute() {
    let resolver = Resolver::new(&consumer(), schema());
    let accessor = resolver.get_dependency("svc1", "DATABASE").unwrap();

    match accessor.get(&["dsn"]) {
        Err(DepSpecError::SchemaViolation(PathError::UnknownAttribute { kind, path })) => {
            assert_eq!(kind, "DATABASE");
            assert_eq!(path, "dsn");
        }
        other => panic!("expected a schema violation, got {:?}", other),
    }

    assert!(matches!(
        resolver.get_dependency("svc1", "REDIS"),
        Err(DepSpecError::SchemaViolation(PathError::UnknownKind(_)))
    ));
    assert!(matches!(
        resolver.get_setting("natGatewayId"),
        Err(DepSpecError::SchemaViolation(PathError::UnknownSetting(_)))
    ));
    assert!(matches!(
        accessor.get::<&str>(&[]),
        Err(DepSpecError::SchemaViolation(PathError::EmptyPath { .. }))
    ));
}

#[test]
fn test_scenario_d_owner_cannot_resolve() {
    let resolver = Resolver::new(&owner(), schema());

    let err = resolver.get_setting("vpcId").unwrap_err();
    assert!(matches!(
        err,
        DepSpecError::IllegalModeAccess {
            operation: "get_setting",
            mode: "owner"
        }
    ));
    assert!(err.to_string().contains("owner mode"));

    // Unknown names are refused for the mode before the schema is consulted
    for kind in ["DATABASE", "REDIS"] {
        assert!(matches!(
            resolver.get_dependency("svc1", kind),
            Err(DepSpecError::IllegalModeAccess { .. })
        ));
    }
    assert!(matches!(
        resolver.get_setting("natGatewayId"),
        Err(DepSpecError::IllegalModeAccess { .. })
    ));
    assert!(matches!(
        resolver.declarations(),
        Err(DepSpecError::IllegalModeAccess { .. })
    ));
}

#[test]
fn test_consumer_cannot_publish() {
    let schema = schema();
    let bootstrap = consumer();
    assert!(matches!(
        Publisher::new(&bootstrap, &schema),
        Err(DepSpecError::IllegalModeAccess {
            operation: "publish",
            mode: "consumer"
        })
    ));
}

#[test]
fn test_declared_types_follow_schema() {
    let resolver = Resolver::new(&consumer(), schema());
    let accessor = resolver.get_dependency("svc1", "DATABASE").unwrap();

    assert_eq!(accessor.get(&["port"]).unwrap().value_type(), &ValueType::Number);
    assert_eq!(
        accessor.get(&["replica", "readonly"]).unwrap().value_type(),
        &ValueType::Boolean
    );
    assert_eq!(
        accessor.get(&["replica"]).unwrap().value_type().to_string(),
        "object({host=string,readonly=bool})"
    );
    assert!(matches!(
        accessor.get(&["port", "value"]),
        Err(DepSpecError::SchemaViolation(PathError::NotAnObject { .. }))
    ));
}

#[test]
fn test_nested_object_evaluates_whole() {
    let store = published_store();
    let resolver = Resolver::new(&consumer(), schema());
    let replica = resolver
        .get_dependency("svc1", "DATABASE")
        .unwrap()
        .get(&["replica"])
        .unwrap();

    assert_eq!(
        LocalEvaluator::new(&store).evaluate(&replica).unwrap(),
        json!({"host": "replica.internal", "readonly": true})
    );
}

#[test]
fn test_publish_layout() {
    let store = published_store();

    let payload = store.get_secret("asset-management/dev").unwrap().unwrap();
    assert_eq!(NamespaceBlob::from_json(&payload).unwrap(), blob());
    assert!(!payload.contains('\n'));

    assert_eq!(
        store.get_output("platform", "SettingsOutput").unwrap(),
        Some(json!({
            "dependencySecretNamePrefix": "asset-management",
            "subnetIds": ["subnet-a", "subnet-b"],
            "vpcId": "vpc-123"
        }))
    );
    assert_eq!(
        store.get_output("platform", "DependencySecretName").unwrap(),
        Some(json!("asset-management/dev"))
    );
}

#[test]
fn test_publish_is_idempotent() {
    let first = published_store();
    let second = published_store();
    let again = published_store();

    // Republishing into the same store overwrites with identical payloads
    let bootstrap = owner();
    let schema = schema();
    let published = Publisher::new(&bootstrap, &schema)
        .unwrap()
        .publish(&blob(), &settings(), &again)
        .unwrap();
    assert_eq!(published.secret_name(), "asset-management/dev");

    let name = "asset-management/dev";
    assert_eq!(first.get_secret(name).unwrap(), second.get_secret(name).unwrap());
    assert_eq!(first.get_secret(name).unwrap(), again.get_secret(name).unwrap());
    assert_eq!(
        first.get_output("platform", "SettingsOutput").unwrap(),
        again.get_output("platform", "SettingsOutput").unwrap()
    );
}

#[test]
fn test_blob_round_trip() {
    let blob = blob();
    let json = blob.to_json().unwrap();
    assert_eq!(NamespaceBlob::from_json(&json).unwrap(), blob);
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&json).unwrap()["svc1"]["SENTRY"]["dsn"],
        "https://y"
    );
}

#[test]
fn test_invalid_payloads_write_nothing() {
    let store = MemoryStore::default();
    let bootstrap = owner();
    let schema = schema();

    let mut bad_blob = blob();
    bad_blob.insert(
        "svc3",
        "DATABASE",
        [("url", AttributeValue::from(5432)), ("dsn", AttributeValue::from("x"))],
    );
    let err = Publisher::new(&bootstrap, &schema)
        .unwrap()
        .publish(&bad_blob, &settings(), &store)
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("svc3.DATABASE.url: expected string, found number"));
    assert!(message.contains("svc3.DATABASE.dsn: unknown attribute"));
    assert!(message.contains("svc3.DATABASE.password: missing attribute"));

    let mut bad_settings = settings();
    bad_settings.insert("vpcId", vec!["vpc-1".to_string()]);
    assert!(matches!(
        Publisher::new(&bootstrap, &schema)
            .unwrap()
            .publish(&blob(), &bad_settings, &store),
        Err(DepSpecError::InvalidPayload(_))
    ));

    assert_eq!(store.get_secret("asset-management/dev").unwrap(), None);
    assert_eq!(store.get_output("platform", "SettingsOutput").unwrap(), None);
}

#[test]
fn test_literal_prefix_override() {
    let store = MemoryStore::default();
    let schema = schema();
    let bootstrap = BootstrapConfig {
        secret_prefix: Some("legacy".to_string()),
        ..owner()
    };
    let published = Publisher::new(&bootstrap, &schema)
        .unwrap()
        .publish(&blob(), &settings(), &store)
        .unwrap();
    assert_eq!(published.secret_name(), "legacy/dev");
    assert!(store.get_secret("legacy/dev").unwrap().is_some());

    let resolver = Resolver::new(
        &BootstrapConfig {
            secret_prefix: Some("legacy".to_string()),
            ..consumer()
        },
        schema,
    );
    let dsn = resolver
        .get_dependency("svc2", "SENTRY")
        .unwrap()
        .get(&["dsn"])
        .unwrap();
    assert_eq!(
        LocalEvaluator::new(&store).evaluate(&dsn).unwrap(),
        json!("https://z")
    );
}

#[test]
fn test_consumer_follows_owner_prefix_override() {
    let store = MemoryStore::default();
    let schema = schema();
    let bootstrap = BootstrapConfig {
        secret_prefix: Some("legacy".to_string()),
        ..owner()
    };
    Publisher::new(&bootstrap, &schema)
        .unwrap()
        .publish(&blob(), &settings(), &store)
        .unwrap();

    // The consumer has no override and still finds the secret
    let resolver = Resolver::new(&consumer(), schema);
    let url = resolver
        .get_dependency("svc1", "DATABASE")
        .unwrap()
        .get(&["url"])
        .unwrap();
    assert_eq!(
        LocalEvaluator::new(&store).evaluate(&url).unwrap(),
        json!("https://x")
    );
    assert_eq!(
        resolver.declarations().unwrap()["data"]["aws_secretsmanager_secret_version"]
            ["dependency_secret"]["secret_id"],
        "${data.terraform_remote_state.platform.outputs.DependencySecretName}"
    );
}

fn republish_replaces(store: &dyn Store) {
    let bootstrap = owner();
    let schema = schema();
    let publisher = Publisher::new(&bootstrap, &schema).unwrap();
    publisher.publish(&blob(), &settings(), store).unwrap();

    let next_blob = NamespaceBlob::from_json(
        r#"{ "svc1": { "SENTRY": { "dsn": "https://y2" } } }"#,
    )
    .unwrap();
    let mut next_settings = settings();
    next_settings.insert("vpcId", "vpc-456");
    publisher.publish(&next_blob, &next_settings, store).unwrap();

    let payload = store.get_secret("asset-management/dev").unwrap().unwrap();
    assert_eq!(payload, next_blob.to_json().unwrap());
    assert_eq!(
        store.get_output("platform", "SettingsOutput").unwrap(),
        Some(next_settings.to_value().unwrap())
    );

    let resolver = Resolver::new(&consumer(), schema);
    let evaluator = LocalEvaluator::new(store);
    let dropped = resolver
        .get_dependency("svc2", "SENTRY")
        .unwrap()
        .get(&["dsn"])
        .unwrap();
    assert!(matches!(
        evaluator.evaluate(&dropped),
        Err(DepSpecError::UnresolvedReference(_))
    ));
    let vpc = resolver.get_setting("vpcId").unwrap();
    assert_eq!(evaluator.evaluate(&vpc).unwrap(), json!("vpc-456"));
}

#[test]
fn test_republish_replaces_memory_store() {
    republish_replaces(&MemoryStore::default());
}

#[test]
fn test_republish_replaces_file_store() {
    let dir = tempfile::TempDir::new().unwrap();
    republish_replaces(&crate::store::FileStore::new(crate::store::FileConfig {
        root: dir.path().to_path_buf(),
    }));
}

#[test]
fn test_unpublished_data_is_unresolved() {
    let store = published_store();
    let resolver = Resolver::new(&consumer(), schema());
    let evaluator = LocalEvaluator::new(&store);

    // svc2 publishes no DATABASE
    let url = resolver
        .get_dependency("svc2", "DATABASE")
        .unwrap()
        .get(&["url"])
        .unwrap();
    assert!(matches!(
        evaluator.evaluate(&url),
        Err(DepSpecError::UnresolvedReference(_))
    ));

    let elsewhere = Resolver::new(
        &BootstrapConfig {
            secret_prefix: Some("elsewhere".to_string()),
            ..consumer()
        },
        schema(),
    );
    let dsn = elsewhere
        .get_dependency("svc1", "SENTRY")
        .unwrap()
        .get(&["dsn"])
        .unwrap();
    let err = evaluator.evaluate(&dsn).unwrap_err();
    assert!(err.to_string().contains("elsewhere/dev"));

    // Nothing published yet: the secret name itself is unknown
    let empty = MemoryStore::default();
    let err = LocalEvaluator::new(&empty).evaluate(&url).unwrap_err();
    assert!(err.to_string().contains("DependencySecretName"));
}

#[test]
fn test_rendered_references() {
    let resolver = Resolver::new(&consumer(), schema());

    let url = resolver
        .get_dependency("svc1", "DATABASE")
        .unwrap()
        .get(&["url"])
        .unwrap();
    insta::assert_snapshot!(
        url.to_string(),
        @r#"${jsondecode(data.aws_secretsmanager_secret_version.dependency_secret.secret_string)["svc1"]["DATABASE"]["url"]}"#
    );

    let vpc = resolver.get_setting("vpcId").unwrap();
    insta::assert_snapshot!(
        vpc.to_string(),
        @r#"${data.terraform_remote_state.platform.outputs.SettingsOutput["vpcId"]}"#
    );
}

#[test]
fn test_declarations() {
    let resolver = Resolver::new(&consumer(), schema());
    let declarations = resolver.declarations().unwrap();

    insta::assert_snapshot!(
        serde_json::to_string_pretty(&declarations).unwrap(),
        @r#"
    {
      "data": {
        "aws_secretsmanager_secret_version": {
          "dependency_secret": {
            "secret_id": "${data.terraform_remote_state.platform.outputs.DependencySecretName}"
          }
        },
        "terraform_remote_state": {
          "platform": {
            "backend": "s3",
            "config": {
              "bucket": "tf-state",
              "key": "dev/platform.tfstate",
              "region": "eu-west-1"
            }
          }
        }
      },
      "provider": {
        "aws": {
          "allowed_account_ids": [
            "123456789012"
          ],
          "region": "eu-west-1"
        }
      }
    }
    "#
    );
}

#[test]
fn test_load_schema_reports_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_schema(&dir.path().join("depspec.toml")).unwrap_err();
    assert!(matches!(err, DepSpecError::NoSchema(_)));
}

#[test]
fn test_load_schema_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("depspec.toml");
    std::fs::write(&path, SCHEMA).unwrap();
    let schema = load_schema(&path).unwrap();
    assert_eq!(schema.project.name, "platform");
    assert_eq!(schema.kinds.len(), 2);
}

#[cfg(feature = "macros")]
mod typed {
    use super::*;

    depspec::declare_schema!(toml = r#"
[project]
name = "platform"
revision = "1.0"

[kinds.DATABASE]
url = "string"
port = "number"

[kinds.DATABASE.replica]
host = "string"
readonly = "boolean"

[kinds.SENTRY]
dsn = "string"

[settings]
vpcId = "string"
subnetIds = "string_list"
dependencySecretNamePrefix = "string"
"#);

    use dependencies::{Database, DatabaseReplica, Sentry};
    use settings::{SubnetIds, VpcId};

    #[test]
    fn test_typed_accessors_match_runtime_lookups() {
        let resolver = Resolver::new(&consumer(), schema());

        let url: DeferredReference<String> = resolver.dependency::<Database>("svc1").unwrap().url();
        let runtime = resolver
            .get_dependency("svc1", "DATABASE")
            .unwrap()
            .get(&["url"])
            .unwrap();
        assert_eq!(url.clone().into_dynamic(), runtime);

        let readonly: DeferredReference<bool> = resolver
            .dependency::<Database>("svc1")
            .unwrap()
            .replica()
            .readonly();
        assert_eq!(readonly.value_type(), &ValueType::Boolean);
        assert_eq!(
            readonly.target().path(),
            ["svc1", "DATABASE", "replica", "readonly"]
        );

        let subnets: DeferredReference<Vec<String>> = resolver.setting::<SubnetIds>().unwrap();
        assert_eq!(subnets.value_type(), &ValueType::StringList);
    }

    #[test]
    fn test_typed_evaluation() {
        let store = published_store();
        let resolver = Resolver::new(&consumer(), schema());
        let evaluator = LocalEvaluator::new(&store);

        let database = resolver.dependency::<Database>("svc1").unwrap();
        assert_eq!(evaluator.evaluate(&database.url()).unwrap(), "https://x");
        assert_eq!(evaluator.evaluate(&database.port()).unwrap(), 5432.0);
        assert_eq!(
            evaluator.evaluate(&database.replica().reference()).unwrap(),
            DatabaseReplica {
                host: "replica.internal".to_string(),
                readonly: true,
            }
        );

        let dsn = resolver.dependency::<Sentry>("svc2").unwrap().dsn();
        assert_eq!(evaluator.evaluate(&dsn).unwrap(), "https://z");

        let vpc = resolver.setting::<VpcId>().unwrap();
        assert_eq!(evaluator.evaluate(&vpc).unwrap(), "vpc-123");
    }

    #[test]
    fn test_typed_lookups_fail_in_owner_mode() {
        let resolver = Resolver::new(&owner(), schema());
        assert!(matches!(
            resolver.dependency::<Database>("svc1"),
            Err(DepSpecError::IllegalModeAccess { .. })
        ));
        assert!(matches!(
            resolver.setting::<VpcId>(),
            Err(DepSpecError::IllegalModeAccess { .. })
        ));
    }

    #[test]
    fn test_removed_paths_fail_fast() {
        // The runtime schema dropped DATABASE.replica.readonly and vpcId
        let runtime: Schema = SCHEMA
            .replace("readonly = \"boolean\"\n", "")
            .replace("vpcId = \"string\"\n", "")
            .parse()
            .unwrap();
        let resolver = Resolver::new(&consumer(), runtime);

        assert!(matches!(
            resolver.dependency::<Database>("svc1"),
            Err(DepSpecError::SchemaViolation(PathError::Incompatible { .. }))
        ));
        assert!(matches!(
            resolver.setting::<VpcId>(),
            Err(DepSpecError::SchemaViolation(PathError::UnknownSetting(_)))
        ));
        // SENTRY is untouched
        assert!(resolver.dependency::<Sentry>("svc1").is_ok());
    }
}
