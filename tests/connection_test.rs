use msolap::descriptor::{Auth, ConnectionDescriptor, DEFAULT_RESOURCE, Endpoint, Topology};
use msolap::error::MsolapError;
use msolap::provider::memory::MemoryProvider;
use msolap::provider::{PropertyId, PropertyValue};
use msolap::session::{Session, SessionBuilder, init_properties};
use pretty_assertions::assert_eq;

fn text(value: &str) -> Option<PropertyValue> {
    Some(PropertyValue::Text(value.to_string()))
}

#[test]
fn test_local_without_auth_submits_address_catalog_mode() {
    let d = ConnectionDescriptor::resolve("Server=localhost;Database=Sales");
    assert_eq!(d.topology(), Topology::Local);
    assert_eq!(d.auth, Auth::None);

    let props = init_properties(&d);
    assert_eq!(
        props.ids(),
        vec![PropertyId::DataSource, PropertyId::Catalog, PropertyId::Mode]
    );
    assert_eq!(props.get(PropertyId::DataSource).cloned(), text("localhost"));
    assert_eq!(props.get(PropertyId::Catalog).cloned(), text("Sales"));
}

#[test]
fn test_hosted_dataset_scenario() {
    let d = ConnectionDescriptor::resolve("Server=powerbi://api.powerbi.com/v1.0/contoso.com/Sales");
    assert_eq!(d.topology(), Topology::HostedDataset);
    assert_eq!(d.tenant_id.as_deref(), Some("contoso.com"));
    assert_eq!(
        d.endpoint,
        Endpoint::HostedDataset {
            tenant: "contoso.com".to_string(),
            workspace: Some("Sales".to_string()),
        }
    );
    assert_eq!(d.resource.as_deref(), Some(DEFAULT_RESOURCE));

    let props = init_properties(&d);
    assert_eq!(
        props.get(PropertyId::DataSource).cloned(),
        text("powerbi://api.powerbi.com/v1.0/contoso.com/Sales")
    );
    assert_eq!(props.get(PropertyId::TenantId).cloned(), text("contoso.com"));
}

#[test]
fn test_endpoint_round_trips_through_properties() {
    for server in [
        "asazure://westus.asazure.windows.net/myserver",
        "asazure://northeurope.asazure.windows.net/other",
        "powerbi://api.powerbi.com/v1.0/tenant.onmicrosoft.com/Workspace One",
        "powerbi://api.powerbi.com/v1.0/tenant.onmicrosoft.com",
        "myhost:2383",
    ] {
        let d = ConnectionDescriptor::resolve(&format!("Data Source={}", server));
        let props = init_properties(&d);
        assert_eq!(props.get(PropertyId::DataSource).cloned(), text(server), "{}", server);
        assert_eq!(Endpoint::parse(server), d.endpoint);
    }
}

#[test]
fn test_each_auth_variant_populates_only_its_fields() {
    let cases = [
        ("AppId=a;AppKey=k", "service-principal"),
        ("UID=u;PWD=p", "user-password"),
        ("Integrated Security=sspi", "integrated"),
        ("", "none"),
    ];
    for (keys, expected) in cases {
        let d = ConnectionDescriptor::resolve(&format!("Server=localhost;{}", keys));
        assert_eq!(d.auth.name(), expected);
        match &d.auth {
            Auth::ServicePrincipal {
                application_id,
                application_key,
            } => {
                assert!(!application_id.is_empty());
                assert_eq!(application_key.as_deref(), Some("k"));
            }
            Auth::UserPassword { user, password } => {
                assert_eq!((user.as_str(), password.as_str()), ("u", "p"));
            }
            Auth::Integrated | Auth::None => {}
        }
    }
}

#[test]
fn test_secrets_are_masked() {
    let d = ConnectionDescriptor::resolve(
        "Server=asazure://westus.asazure.windows.net/s;AppId=a;AppKey=topsecret",
    );
    let masked = init_properties(&d).masked();
    assert_eq!(masked.get(PropertyId::ApplicationKey).cloned(), text("***"));
    assert!(!format!("{:?}", masked).contains("topsecret"));
}

#[test]
fn test_login_failure_is_connection_error() {
    let provider = MemoryProvider::new()
        .with_catalog("Sales")
        .with_login("bob", "right");
    let err = Session::open(
        &provider,
        ConnectionDescriptor::resolve("Server=localhost;Database=Sales;UID=bob;PWD=wrong"),
    )
    .unwrap_err();
    match err {
        MsolapError::Connection(msg) => {
            assert!(msg.starts_with("Failed to initialize data source"));
            assert!(msg.contains("Authentication failed for user 'bob'"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(provider.ledger().is_balanced());
}

#[test]
fn test_unknown_catalog_is_connection_error() {
    let provider = MemoryProvider::new().with_catalog("Sales");
    let err = Session::open(
        &provider,
        ConnectionDescriptor::resolve("Server=localhost;Database=Finance"),
    )
    .unwrap_err();
    assert!(matches!(err, MsolapError::Connection(_)));
    assert!(err.to_string().contains("'Finance'"));
    assert!(provider.ledger().is_balanced());
}

#[test]
fn test_default_catalog_is_first_by_name() {
    let provider = MemoryProvider::new()
        .with_catalog("Sales")
        .with_catalog("Finance")
        .with_catalog("Marketing");
    let session = Session::open(&provider, ConnectionDescriptor::resolve("Server=localhost")).unwrap();
    assert_eq!(session.catalog(), Some("Finance"));
    assert_eq!(
        provider.executed_queries(),
        vec![msolap::session::CATALOG_QUERY.to_string()]
    );
}

#[test]
fn test_no_catalogs_proceeds_catalog_less() {
    let provider = MemoryProvider::new();
    let session = Session::open(&provider, ConnectionDescriptor::resolve("Server=localhost")).unwrap();
    assert!(session.is_connected());
    assert_eq!(session.catalog(), None);
    assert_eq!(provider.init_properties().len(), 1);
}

#[test]
fn test_discovery_can_be_disabled() {
    let provider = MemoryProvider::new().with_catalog("Sales");
    let session = SessionBuilder::new(&provider, ConnectionDescriptor::resolve("Server=localhost"))
        .discover_catalog(false)
        .build()
        .unwrap();
    assert_eq!(session.catalog(), None);
    assert!(provider.executed_queries().is_empty());
}

#[test]
fn test_commands_carry_timeout_and_no_bookmarks() {
    let provider = MemoryProvider::new().with_catalog("Sales");
    let _session = SessionBuilder::new(&provider, ConnectionDescriptor::resolve("Server=localhost"))
        .timeout(15)
        .build()
        .unwrap();
    let submitted = provider.command_properties();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].get(PropertyId::CommandTimeout),
        Some(&PropertyValue::Int(15))
    );
    assert_eq!(
        submitted[0].get(PropertyId::Bookmarks),
        Some(&PropertyValue::Bool(false))
    );
}
