//! Session builder and query session.
//!
//! A [`Session`] owns one runtime scope, one initialized data source and one
//! command factory. Handles are released in reverse order of acquisition,
//! both on [`Session::close`] and on every failing build path.

use crate::config::DEFAULT_TIMEOUT_SECONDS;
use crate::cursor::RowCursor;
use crate::descriptor::{Auth, ConnectionDescriptor, Topology};
use crate::error::{MsolapError, MsolapResult};
use crate::provider::{
    CommandFactory, DB_MODE_READ, DataSource, PropertyId, PropertySet, Provider, RuntimeScope,
};
use crate::types::{LogicalType, UNSUPPORTED_PLACEHOLDER, Value};

/// Metadata query used to find the default catalog.
pub const CATALOG_QUERY: &str =
    "SELECT [CATALOG_NAME] FROM $SYSTEM.DBSCHEMA_CATALOGS ORDER BY [CATALOG_NAME]";

/// Marker value for integrated security.
const INTEGRATED_SECURITY: &str = "SSPI";

/// Initialization properties for a descriptor, in submission order.
///
/// | Topology       | Auth             | Properties after address, catalog, mode             |
/// |----------------|------------------|-----------------------------------------------------|
/// | Local          | Integrated       | integrated security                                 |
/// | Local          | UserPassword     | user id, password                                   |
/// | Local          | other            | none                                                |
/// | Cloud / Hosted | ServicePrincipal | application id, key?, authority, resource?, tenant? |
/// | Cloud / Hosted | UserPassword     | user id, password, authority, resource?, tenant?    |
/// | Cloud / Hosted | Integrated       | integrated security, authority, resource?, tenant?  |
/// | Cloud / Hosted | None             | authority, resource?, tenant?                       |
pub fn init_properties(descriptor: &ConnectionDescriptor) -> PropertySet {
    let mut props = PropertySet::new().text(PropertyId::DataSource, descriptor.data_source_address());
    if let Some(catalog) = &descriptor.catalog {
        props = props.text(PropertyId::Catalog, catalog);
    }
    props = props.int(PropertyId::Mode, DB_MODE_READ);

    props = match &descriptor.auth {
        Auth::Integrated => props.text(PropertyId::IntegratedSecurity, INTEGRATED_SECURITY),
        Auth::UserPassword { user, password } => props
            .text(PropertyId::UserId, user)
            .text(PropertyId::Password, password),
        Auth::ServicePrincipal {
            application_id,
            application_key,
        } if descriptor.topology() != Topology::Local => {
            let props = props.text(PropertyId::ApplicationId, application_id);
            match application_key {
                Some(key) => props.text(PropertyId::ApplicationKey, key),
                None => props,
            }
        }
        Auth::ServicePrincipal { .. } | Auth::None => props,
    };

    if descriptor.topology() != Topology::Local {
        props = props.text(PropertyId::Authority, &descriptor.authority);
        if let Some(resource) = &descriptor.resource {
            props = props.text(PropertyId::Resource, resource);
        }
        if let Some(tenant) = &descriptor.tenant_id {
            props = props.text(PropertyId::TenantId, tenant);
        }
    }
    props
}

/// Rowset properties applied to every command.
pub fn command_properties(timeout_seconds: u32) -> PropertySet {
    PropertySet::new()
        .flag(PropertyId::Bookmarks, false)
        .int(
            PropertyId::CommandTimeout,
            i32::try_from(timeout_seconds).unwrap_or(i32::MAX),
        )
}

/// Builds a connected [`Session`].
pub struct SessionBuilder<'a> {
    provider: &'a dyn Provider,
    descriptor: ConnectionDescriptor,
    timeout_seconds: u32,
    discover_catalog: bool,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(provider: &'a dyn Provider, descriptor: ConnectionDescriptor) -> Self {
        Self {
            provider,
            descriptor,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            discover_catalog: true,
        }
    }

    /// Per-command timeout in seconds.
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Look up a default catalog when none is given (on by default).
    pub fn discover_catalog(mut self, enabled: bool) -> Self {
        self.discover_catalog = enabled;
        self
    }

    pub fn build(self) -> MsolapResult<Session> {
        let mut descriptor = self.descriptor;
        tracing::debug!(
            "Opening {} session ({} auth) via {} provider",
            descriptor.topology(),
            descriptor.auth.name(),
            self.provider.name()
        );

        let runtime = self
            .provider
            .enter_runtime()
            .map_err(|e| MsolapError::connection("Failed to initialize provider runtime", &e))?;
        let mut data_source = self
            .provider
            .create_data_source()
            .map_err(|e| MsolapError::connection("Failed to create data source instance", &e))?;

        submit(data_source.as_mut(), &descriptor)?;

        if descriptor.catalog.is_none() && self.discover_catalog {
            match find_default_catalog(data_source.as_mut(), self.timeout_seconds) {
                Ok(Some(catalog)) => {
                    tracing::debug!("Using default catalog '{}'", catalog);
                    data_source.uninitialize();
                    descriptor = descriptor.with_catalog(catalog);
                    submit(data_source.as_mut(), &descriptor)?;
                }
                Ok(None) => tracing::debug!("No default catalog found"),
                Err(e) => tracing::debug!("Default catalog discovery failed: {}", e),
            }
        }

        let commands = match data_source.create_session() {
            Ok(commands) => commands,
            Err(e) => {
                data_source.uninitialize();
                return Err(MsolapError::connection("Failed to create session", &e));
            }
        };

        Ok(Session {
            commands: Some(commands),
            data_source: Some(data_source),
            runtime: Some(runtime),
            descriptor,
            timeout_seconds: self.timeout_seconds,
            connected: true,
        })
    }
}

fn submit(data_source: &mut dyn DataSource, descriptor: &ConnectionDescriptor) -> MsolapResult<()> {
    let props = init_properties(descriptor);
    tracing::debug!("Submitting {} initialization properties", props.len());
    data_source
        .set_properties(&props)
        .map_err(|e| MsolapError::connection("Failed to set connection properties", &e))?;
    data_source
        .initialize()
        .map_err(|e| MsolapError::connection("Failed to initialize data source", &e))
}

/// First catalog name by order, over a throwaway command factory.
fn find_default_catalog(
    data_source: &mut dyn DataSource,
    timeout_seconds: u32,
) -> MsolapResult<Option<String>> {
    let mut factory = data_source
        .create_session()
        .map_err(|e| MsolapError::protocol("Failed to create session", &e))?;
    let mut cursor = run_command(factory.as_mut(), CATALOG_QUERY, timeout_seconds)?;
    let name = if cursor.step()? {
        match cursor.get_value(0, LogicalType::Varchar)? {
            Value::Varchar(name) if name != UNSUPPORTED_PLACEHOLDER => Some(name),
            _ => None,
        }
    } else {
        None
    };
    cursor.close();
    Ok(name.filter(|n| !n.is_empty()))
}

fn run_command(
    factory: &mut dyn CommandFactory,
    text: &str,
    timeout_seconds: u32,
) -> MsolapResult<RowCursor> {
    let mut command = factory
        .create_command()
        .map_err(|e| MsolapError::protocol("Failed to create command", &e))?;
    command
        .set_text(text)
        .map_err(|e| MsolapError::protocol("Failed to set command text", &e))?;
    if let Err(e) = command.set_properties(&command_properties(timeout_seconds)) {
        tracing::warn!("Rowset properties rejected: {}", e);
    }
    let mut rowset = command
        .execute()
        .map_err(|e| MsolapError::protocol("Failed to execute query", &e))?;
    let columns = rowset
        .column_info()
        .map_err(|e| MsolapError::protocol("Failed to get column information", &e))?;
    Ok(RowCursor::new(command, rowset, columns))
}

/// An open provider session.
pub struct Session {
    commands: Option<Box<dyn CommandFactory>>,
    data_source: Option<Box<dyn DataSource>>,
    runtime: Option<Box<dyn RuntimeScope>>,
    descriptor: ConnectionDescriptor,
    timeout_seconds: u32,
    connected: bool,
}

impl Session {
    /// Resolve nothing, discover the catalog if needed, default timeout.
    pub fn open(provider: &dyn Provider, descriptor: ConnectionDescriptor) -> MsolapResult<Self> {
        SessionBuilder::new(provider, descriptor).build()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Descriptor as used, including a discovered catalog.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn catalog(&self) -> Option<&str> {
        self.descriptor.catalog.as_deref()
    }

    pub fn timeout_seconds(&self) -> u32 {
        self.timeout_seconds
    }

    /// Run `query` and return an unexecuted cursor over its result.
    pub fn execute(&mut self, query: &str) -> MsolapResult<RowCursor> {
        if !self.connected {
            return Err(MsolapError::NotConnected);
        }
        let factory = self.commands.as_mut().ok_or(MsolapError::NotConnected)?;
        tracing::debug!("Executing query ({} chars)", query.len());
        run_command(factory.as_mut(), query, self.timeout_seconds)
    }

    /// Release the command factory, then the data source, then the runtime.
    pub fn close(&mut self) {
        if !self.connected && self.runtime.is_none() {
            return;
        }
        self.commands = None;
        if let Some(mut data_source) = self.data_source.take() {
            data_source.uninitialize();
        }
        self.runtime = None;
        self.connected = false;
        tracing::debug!("Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("topology", &self.descriptor.topology())
            .field("catalog", &self.descriptor.catalog)
            .field("connected", &self.connected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::PropertyValue;
    use crate::provider::memory::{MemoryProvider, MemoryTable, NativeValue, ProviderCall};
    use crate::provider::DbType;
    use pretty_assertions::assert_eq;

    fn ids(descriptor: &str) -> Vec<PropertyId> {
        init_properties(&ConnectionDescriptor::resolve(descriptor)).ids()
    }

    #[test]
    fn test_local_property_sets() {
        use PropertyId::*;
        assert_eq!(
            ids("Server=localhost;Database=Sales"),
            vec![DataSource, Catalog, Mode]
        );
        assert_eq!(
            ids("Server=localhost;Database=Sales;Integrated Security=SSPI"),
            vec![DataSource, Catalog, Mode, IntegratedSecurity]
        );
        assert_eq!(
            ids("Server=localhost;User ID=bob;Password=pw"),
            vec![DataSource, Mode, UserId, Password]
        );
        assert_eq!(ids("Server=localhost;AppId=a;AppKey=k"), vec![DataSource, Mode]);
    }

    #[test]
    fn test_cloud_property_sets() {
        use PropertyId::*;
        assert_eq!(
            ids("Server=asazure://westus.asazure.windows.net/srv;AppId=a;AppKey=k;TenantId=t"),
            vec![DataSource, Mode, ApplicationId, ApplicationKey, Authority, Resource, TenantId]
        );
        assert_eq!(
            ids("Server=powerbi://api.powerbi.com/v1.0/contoso.com/Sales;User ID=u;Password=p"),
            vec![DataSource, Mode, UserId, Password, Authority, Resource, TenantId]
        );
        assert_eq!(
            ids("Server=asazure://westus.asazure.windows.net/srv;Integrated Security=true"),
            vec![DataSource, Mode, IntegratedSecurity, Authority, Resource]
        );
    }

    #[test]
    fn test_property_values() {
        let props = init_properties(&ConnectionDescriptor::resolve(
            "Server=powerbi://api.powerbi.com/v1.0/contoso.com/Sales;AppId=a",
        ));
        assert_eq!(
            props.get(PropertyId::DataSource),
            Some(&PropertyValue::Text(
                "powerbi://api.powerbi.com/v1.0/contoso.com/Sales".to_string()
            ))
        );
        assert_eq!(props.get(PropertyId::Mode), Some(&PropertyValue::Int(DB_MODE_READ)));
        assert_eq!(props.get(PropertyId::ApplicationKey), None);
    }

    #[test]
    fn test_command_properties() {
        let props = command_properties(30);
        assert_eq!(props.get(PropertyId::Bookmarks), Some(&PropertyValue::Bool(false)));
        assert_eq!(props.get(PropertyId::CommandTimeout), Some(&PropertyValue::Int(30)));
    }

    #[test]
    fn test_build_discovers_catalog() {
        let provider = MemoryProvider::new()
            .with_catalog("Zeta")
            .with_catalog("Alpha");
        let session = Session::open(&provider, ConnectionDescriptor::resolve("Server=localhost"))
            .unwrap();
        assert_eq!(session.catalog(), Some("Alpha"));

        let submitted = provider.init_properties();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].get(PropertyId::Catalog), None);
        assert_eq!(
            submitted[1].get(PropertyId::Catalog),
            Some(&PropertyValue::Text("Alpha".to_string()))
        );
    }

    #[test]
    fn test_discovery_reads_any_catalog_column_type() {
        for db_type in [DbType::Variant, DbType::Str, DbType::Bstr] {
            let provider = MemoryProvider::new()
                .with_catalog("Sales")
                .with_catalog_type(db_type);
            let session =
                Session::open(&provider, ConnectionDescriptor::resolve("Server=localhost")).unwrap();
            assert_eq!(session.catalog(), Some("Sales"), "{}", db_type);
        }
    }

    #[test]
    fn test_discovery_failure_is_not_fatal() {
        let provider = MemoryProvider::new()
            .with_catalog("Sales")
            .fail_on(ProviderCall::Execute, 1);
        let session = Session::open(&provider, ConnectionDescriptor::resolve("Server=localhost"))
            .unwrap();
        assert!(session.is_connected());
        assert_eq!(session.catalog(), None);
    }

    #[test]
    fn test_execute_and_close() {
        let provider = MemoryProvider::new().with_catalog("Sales").with_table(
            "EVALUATE T",
            MemoryTable::new()
                .column("T[A]", DbType::I8)
                .row(vec![NativeValue::Int(1)]),
        );
        let mut session = Session::open(
            &provider,
            ConnectionDescriptor::resolve("Server=localhost;Database=Sales"),
        )
        .unwrap();
        let mut cursor = session.execute("EVALUATE T").unwrap();
        assert!(cursor.step().unwrap());
        assert_eq!(cursor.get_integer(0).unwrap(), Some(1));
        cursor.close();

        session.close();
        session.close();
        assert!(matches!(
            session.execute("EVALUATE T"),
            Err(MsolapError::NotConnected)
        ));
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_bad_query_is_protocol_error() {
        let provider = MemoryProvider::new().with_catalog("Sales");
        let mut session = Session::open(
            &provider,
            ConnectionDescriptor::resolve("Server=localhost;Database=Sales"),
        )
        .unwrap();
        let err = session.execute("EVALUATE Nope").unwrap_err();
        assert!(matches!(err, MsolapError::Protocol(_)));
        assert!(err.to_string().contains("Failed to resolve name"));
    }
}
