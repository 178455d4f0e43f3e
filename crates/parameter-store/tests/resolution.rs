//! End-to-end resolution tests against in-memory and mocked gateways

use async_trait::async_trait;
use common::config::{load_client_config, ParameterStoreConfig, ENVIRONMENT_SOURCE_PRIORITY};
use futures::StreamExt;
use mockall::mock;
use parameter_store::{
    effective_value, ConfigurationClient, FetchErrorKind, GatewayError, InMemoryParameterStore,
    ParameterGateway, ParameterStoreClient, ParameterType, PropertySource, RawParameter,
    ResolutionContext,
};
use std::collections::HashMap;
use tokio_test::{assert_err, assert_ok};

const BASE: i32 = ENVIRONMENT_SOURCE_PRIORITY;

mock! {
    pub Gateway {}

    #[async_trait]
    impl ParameterGateway for Gateway {
        async fn fetch_flat(
            &self,
            names: &[String],
            decrypt: bool,
        ) -> Result<Vec<RawParameter>, GatewayError>;

        async fn fetch_hierarchy(
            &self,
            path: &str,
            recursive: bool,
            decrypt: bool,
        ) -> Result<Vec<RawParameter>, GatewayError>;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("parameter_store=debug")
        .with_test_writer()
        .try_init();
}

fn string(name: &str, value: &str) -> RawParameter {
    RawParameter::new(name, value, ParameterType::String)
}

fn fixture_path() -> String {
    format!("{}/tests/fixtures/parameters.json", env!("CARGO_MANIFEST_DIR"))
}

fn by_name(sources: &[PropertySource]) -> HashMap<&str, &PropertySource> {
    sources.iter().map(|source| (source.name(), source)).collect()
}

async fn collect(
    client: &ParameterStoreClient,
    context: &ResolutionContext,
) -> Vec<Result<PropertySource, parameter_store::ConfigurationFetchError>> {
    client.property_sources(context).collect().await
}

#[tokio::test]
async fn resolves_single_common_parameter() {
    init_tracing();
    let store = InMemoryParameterStore::with_parameters(vec![string(
        "/config/application",
        "greeting=hello",
    )]);
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store);

    let items = collect(&client, &ResolutionContext::new()).await;
    assert_eq!(items.len(), 1);

    let source = items.into_iter().next().unwrap().unwrap();
    assert_eq!(source.name(), "route53-application");
    assert_eq!(source.priority(), BASE + 100);
    assert_eq!(source.values().len(), 1);
    assert_eq!(source.get("greeting"), Some("hello"));
}

#[tokio::test]
async fn disabled_client_never_contacts_gateway() {
    let mut gateway = MockGateway::new();
    gateway.expect_fetch_flat().never();
    gateway.expect_fetch_hierarchy().never();

    let config = ParameterStoreConfig {
        enabled: false,
        ..Default::default()
    };
    let client = ParameterStoreClient::new(config, gateway);
    let context = ResolutionContext::new()
        .with_profiles(["prod"])
        .with_service_id("billing");

    assert!(collect(&client, &context).await.is_empty());
    assert!(client.resolve(&context).await.unwrap().is_empty());
}

#[tokio::test]
async fn profile_value_overrides_service_and_common_values() {
    let store = InMemoryParameterStore::from_json_file(fixture_path())
        .await
        .unwrap();
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store);
    let context = ResolutionContext::new()
        .with_application_name("billing")
        .with_profiles(["prod"])
        .with_service_id("billing");

    let sources = client.resolve(&context).await.unwrap();
    let sources_by_name = by_name(&sources);

    assert_eq!(sources.len(), 3);
    assert_eq!(
        sources_by_name["route53-application"].get("greeting"),
        Some("hello")
    );
    assert_eq!(
        sources_by_name["route53-billing"].get("greeting"),
        Some("hello from billing")
    );
    assert_eq!(
        sources_by_name["route53-application[prod]"].get("greeting"),
        Some("hello from prod")
    );
    assert!(!sources_by_name.contains_key("route53-shipping"));

    assert_eq!(effective_value(&sources, "greeting"), Some("hello from prod"));
}

#[tokio::test]
async fn priorities_follow_profile_and_service_rules() {
    let store = InMemoryParameterStore::from_json_file(fixture_path())
        .await
        .unwrap();
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store);
    let context = ResolutionContext::new()
        .with_profiles(["prod"])
        .with_service_id("billing");

    let sources = client.resolve(&context).await.unwrap();
    let sources_by_name = by_name(&sources);

    assert_eq!(sources_by_name["route53-application"].priority(), BASE + 100);
    assert_eq!(sources_by_name["route53-billing"].priority(), BASE + 110);
    assert_eq!(
        sources_by_name["route53-application[prod]"].priority(),
        BASE + 150
    );
}

#[tokio::test]
async fn nested_parameters_merge_after_flat_value() {
    let store = InMemoryParameterStore::from_json_file(fixture_path())
        .await
        .unwrap();
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store);
    let context = ResolutionContext::new().with_profiles(["prod"]);

    let sources = client.resolve(&context).await.unwrap();
    let sources_by_name = by_name(&sources);

    let common = sources_by_name["route53-application"];
    assert_eq!(common.get("timeout"), Some("30"));
    let keys: Vec<&str> = common.values().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["greeting", "timeout"]);

    let prod = sources_by_name["route53-application[prod]"];
    assert_eq!(prod.get("pool"), Some("8"));
}

#[tokio::test]
async fn secure_parameter_without_decryption_is_malformed() {
    let store = InMemoryParameterStore::with_parameters(vec![RawParameter::new(
        "/config/application",
        "password=s3cr3t",
        ParameterType::SecureString,
    )]);

    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store.clone());
    let error = client
        .resolve(&ResolutionContext::new())
        .await
        .unwrap_err();
    assert_eq!(error.kind(), FetchErrorKind::MalformedParameter);
    assert!(!error.to_string().contains("s3cr3t"));

    let decrypting = ParameterStoreClient::new(
        ParameterStoreConfig {
            use_secure_parameters: true,
            ..Default::default()
        },
        store,
    );
    let sources = decrypting.resolve(&ResolutionContext::new()).await.unwrap();
    assert_eq!(sources[0].get("password"), Some("s3cr3t"));
}

#[tokio::test]
async fn secure_parameters_are_requested_with_decryption() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_fetch_flat()
        .times(1)
        .returning(|names, decrypt| {
            assert!(decrypt);
            assert_eq!(names.to_vec(), vec!["/config/application".to_string()]);
            Ok(vec![RawParameter::new(
                "/config/application",
                "token=abc",
                ParameterType::SecureString,
            )])
        });
    gateway
        .expect_fetch_hierarchy()
        .times(1)
        .returning(|path, recursive, decrypt| {
            assert_eq!(path, "/config/application");
            assert!(recursive);
            assert!(decrypt);
            Ok(vec![RawParameter::folder("/config/application/")])
        });

    let client = ParameterStoreClient::new(
        ParameterStoreConfig {
            use_secure_parameters: true,
            ..Default::default()
        },
        gateway,
    );

    let sources = client.resolve(&ResolutionContext::new()).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].get("token"), Some("abc"));
}

#[tokio::test]
async fn gateway_failure_yields_single_error_and_no_sources() {
    init_tracing();
    let mut gateway = MockGateway::new();
    gateway.expect_fetch_flat().returning(|names, _| {
        if names[0].ends_with("_prod") {
            Err(GatewayError::Throttled {
                message: "Rate exceeded".to_string(),
            })
        } else {
            Ok(names
                .iter()
                .map(|name| RawParameter::new(name.clone(), "a=1", ParameterType::String))
                .collect())
        }
    });
    gateway
        .expect_fetch_hierarchy()
        .returning(|_, _, _| Ok(Vec::new()));

    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), gateway);
    let context = ResolutionContext::new().with_profiles(["prod"]);

    let items = collect(&client, &context).await;
    assert_eq!(items.len(), 1);

    let error = items.into_iter().next().unwrap().unwrap_err();
    assert_eq!(error.kind(), FetchErrorKind::Transport);
    assert!(error
        .to_string()
        .contains("Error reading distributed configuration from the remote parameter store"));
    assert!(error.to_string().contains("Rate exceeded"));
}

#[tokio::test]
async fn hierarchy_failure_aborts_resolution() {
    init_tracing();
    let mut gateway = MockGateway::new();
    gateway.expect_fetch_flat().returning(|names, _| {
        Ok(vec![RawParameter::new(
            names[0].clone(),
            "a=1",
            ParameterType::String,
        )])
    });
    gateway.expect_fetch_hierarchy().returning(|_, _, _| {
        Err(GatewayError::AccessDenied {
            message: "not authorized to perform GetParametersByPath".to_string(),
        })
    });

    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), gateway);
    let error = assert_err!(client.resolve(&ResolutionContext::new()).await);

    assert_eq!(error.kind(), FetchErrorKind::Transport);
    assert!(std::error::Error::source(&error).is_some());
}

#[tokio::test]
async fn folders_and_deep_keys_never_become_sources() {
    let mut gateway = MockGateway::new();
    gateway.expect_fetch_flat().times(1).returning(|_, _| {
        Ok(vec![
            RawParameter::folder("/config/application/"),
            string("/config/application/db", "url=jdbc"),
        ])
    });
    gateway.expect_fetch_hierarchy().never();

    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), gateway);
    let sources = client.resolve(&ResolutionContext::new()).await.unwrap();

    assert!(sources.is_empty());
}

#[tokio::test]
async fn malformed_parameter_fails_whole_resolution() {
    let store = InMemoryParameterStore::with_parameters(vec![
        string("/config/application", "greeting=hello"),
        RawParameter::new("/config/application_prod", "a=1,broken", ParameterType::StringList),
    ]);
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store);
    let context = ResolutionContext::new().with_profiles(["prod"]);

    let items = collect(&client, &context).await;
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].as_ref().unwrap_err().kind(),
        FetchErrorKind::MalformedParameter
    );
}

#[tokio::test]
async fn cancelled_client_fetches_nothing() {
    let store = InMemoryParameterStore::with_parameters(vec![string(
        "/config/application",
        "greeting=hello",
    )]);
    let token = tokio_util::sync::CancellationToken::new();
    let client = ParameterStoreClient::new(ParameterStoreConfig::default(), store.clone())
        .with_cancellation(token.clone());

    token.cancel();
    let error = assert_err!(client.resolve(&ResolutionContext::new()).await);

    assert_eq!(error.kind(), FetchErrorKind::Cancelled);
    assert_eq!(store.request_count(), 0);
}

#[tokio::test]
async fn custom_root_and_base_priority() {
    let store = InMemoryParameterStore::with_parameters(vec![string(
        "/services/application",
        "greeting=hello",
    )]);
    let config = ParameterStoreConfig {
        root_hierarchy_path: "/services".to_string(),
        base_priority: 0,
        ..Default::default()
    };
    let client = ParameterStoreClient::new(config, store).with_source_tag("paramstore");

    let sources = client.resolve(&ResolutionContext::new()).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name(), "paramstore-application");
    assert_eq!(sources[0].priority(), 100);
}

#[tokio::test]
async fn client_configured_from_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paramstore.toml");
    std::fs::write(
        &path,
        r#"
[application]
name = "billing"
active_profiles = ["prod"]

[parameter_store]
root_hierarchy_path = "/config"
base_priority = -200

[discovery]
service_id = "billing"
source_tag = "ssm"
"#,
    )
    .unwrap();

    let config = load_client_config(Some(path)).unwrap();
    let store = InMemoryParameterStore::from_json_file(fixture_path())
        .await
        .unwrap();
    let client = ParameterStoreClient::from_client_config(&config, store);
    let context = ResolutionContext::from_config(&config);

    let sources = assert_ok!(client.resolve(&context).await);
    let sources_by_name = by_name(&sources);

    assert_eq!(sources.len(), 3);
    assert_eq!(sources_by_name["ssm-billing"].priority(), -200 + 110);
    assert_eq!(sources_by_name["ssm-application[prod]"].priority(), -200 + 150);
    assert_eq!(client.description(), "Remote Parameter Store");
}
