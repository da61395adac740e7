//! Connection descriptor resolution.
//!
//! Turns a parsed connection string into a [`ConnectionDescriptor`]: which
//! topology to reach, where, which catalog, and how to authenticate.
//!
//! | `Server` value                               | Topology         |
//! |----------------------------------------------|------------------|
//! | `powerbi://api.powerbi.com/v1.0/tenant/ws`   | `HostedDataset`  |
//! | `asazure://westus.asazure.windows.net/srv`   | `CloudGateway`   |
//! | anything else (default `localhost`)          | `Local`          |

use serde::Serialize;

use crate::parser::{self, ConnectionString};

pub const HOSTED_SCHEME: &str = "powerbi://";
pub const CLOUD_SCHEME: &str = "asazure://";
pub const DEFAULT_SERVER: &str = "localhost";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
/// Both cloud topologies default to the BI-service API resource.
pub const DEFAULT_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

const SERVER_KEYS: &[&str] = &["Server", "Data Source"];
const CATALOG_KEYS: &[&str] = &["Database", "Catalog"];
const USER_KEYS: &[&str] = &["User ID", "UID"];
const PASSWORD_KEYS: &[&str] = &["Password", "PWD"];
const INTEGRATED_KEYS: &[&str] = &["Integrated Security"];
const APP_ID_KEYS: &[&str] = &["Application ID", "AppId"];
const APP_KEY_KEYS: &[&str] = &["Application Key", "AppKey"];
const TENANT_KEYS: &[&str] = &["Tenant ID", "TenantId"];
const AUTHORITY_KEYS: &[&str] = &["Authority"];
const RESOURCE_KEYS: &[&str] = &["Resource"];
const ENCRYPT_KEYS: &[&str] = &["Encrypt"];

/// Network/deployment shape of the target server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Topology {
    Local,
    CloudGateway,
    HostedDataset,
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topology::Local => write!(f, "local"),
            Topology::CloudGateway => write!(f, "cloud-gateway"),
            Topology::HostedDataset => write!(f, "hosted-dataset"),
        }
    }
}

/// Where the server lives, with the fields extracted from its URL form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Local {
        server: String,
    },
    CloudGateway {
        region: Option<String>,
        server: String,
    },
    HostedDataset {
        tenant: String,
        workspace: Option<String>,
    },
}

impl Endpoint {
    /// Parse a `Server`/`Data Source` value by URL scheme.
    pub fn parse(server: &str) -> Self {
        if let Some(rest) = server.strip_prefix(HOSTED_SCHEME) {
            // api-host/version/tenant/workspace
            let mut segments = rest.splitn(4, '/');
            let _api_host = segments.next();
            let _version = segments.next();
            let tenant = segments.next().unwrap_or_default().to_string();
            let workspace = segments
                .next()
                .filter(|w| !w.is_empty())
                .map(str::to_string);
            Endpoint::HostedDataset { tenant, workspace }
        } else if let Some(rest) = server.strip_prefix(CLOUD_SCHEME) {
            // region.domain/serverName
            match rest.split_once('/') {
                Some((domain, name)) => Endpoint::CloudGateway {
                    region: domain
                        .split_once('.')
                        .map(|(region, _)| region.to_string())
                        .filter(|r| !r.is_empty()),
                    server: name.to_string(),
                },
                None => Endpoint::CloudGateway {
                    region: None,
                    server: rest.to_string(),
                },
            }
        } else {
            Endpoint::Local {
                server: server.to_string(),
            }
        }
    }

    pub fn topology(&self) -> Topology {
        match self {
            Endpoint::Local { .. } => Topology::Local,
            Endpoint::CloudGateway { .. } => Topology::CloudGateway,
            Endpoint::HostedDataset { .. } => Topology::HostedDataset,
        }
    }
}

/// Authentication strategy; exactly one variant's fields are populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Auth {
    Integrated,
    UserPassword {
        user: String,
        #[serde(skip)]
        password: String,
    },
    ServicePrincipal {
        application_id: String,
        #[serde(skip)]
        application_key: Option<String>,
    },
    None,
}

impl Auth {
    pub fn name(&self) -> &'static str {
        match self {
            Auth::Integrated => "integrated",
            Auth::UserPassword { .. } => "user-password",
            Auth::ServicePrincipal { .. } => "service-principal",
            Auth::None => "none",
        }
    }
}

/// Resolved, immutable description of a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionDescriptor {
    pub endpoint: Endpoint,
    pub catalog: Option<String>,
    pub auth: Auth,
    pub authority: String,
    pub resource: Option<String>,
    pub tenant_id: Option<String>,
    /// Parsed but never submitted to the provider.
    pub encrypt: Option<String>,
}

impl ConnectionDescriptor {
    /// Resolve a raw connection string.
    pub fn resolve(connection_string: &str) -> Self {
        Self::from_parsed(&parser::parse(connection_string))
    }

    /// Resolve from already-tokenized pairs.
    pub fn from_parsed(cs: &ConnectionString) -> Self {
        let endpoint = Endpoint::parse(cs.get(SERVER_KEYS).unwrap_or(DEFAULT_SERVER));
        let topology = endpoint.topology();

        let non_empty = |keys: &[&str]| {
            cs.get(keys)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let auth = if let Some(application_id) = non_empty(APP_ID_KEYS) {
            Auth::ServicePrincipal {
                application_id,
                application_key: non_empty(APP_KEY_KEYS),
            }
        } else if let Some(user) = non_empty(USER_KEYS) {
            Auth::UserPassword {
                user,
                password: cs.get(PASSWORD_KEYS).unwrap_or_default().to_string(),
            }
        } else if cs.get(INTEGRATED_KEYS).is_some_and(is_truthy) {
            Auth::Integrated
        } else {
            Auth::None
        };

        // The URL tenant takes precedence over an explicit key.
        let tenant_id = match &endpoint {
            Endpoint::HostedDataset { tenant, .. } if !tenant.is_empty() => Some(tenant.clone()),
            _ => non_empty(TENANT_KEYS),
        };

        let resource = non_empty(RESOURCE_KEYS).or_else(|| match topology {
            Topology::Local => None,
            Topology::CloudGateway | Topology::HostedDataset => Some(DEFAULT_RESOURCE.to_string()),
        });

        Self {
            endpoint,
            catalog: non_empty(CATALOG_KEYS),
            auth,
            authority: non_empty(AUTHORITY_KEYS).unwrap_or_else(|| DEFAULT_AUTHORITY.to_string()),
            resource,
            tenant_id,
            encrypt: non_empty(ENCRYPT_KEYS),
        }
    }

    pub fn topology(&self) -> Topology {
        self.endpoint.topology()
    }

    /// Data-source address as submitted to the provider.
    pub fn data_source_address(&self) -> String {
        match &self.endpoint {
            Endpoint::Local { server } => server.clone(),
            Endpoint::CloudGateway { region, server } => match region {
                Some(region) => format!("{}{}.asazure.windows.net/{}", CLOUD_SCHEME, region, server),
                None => format!("{}asazure.windows.net/{}", CLOUD_SCHEME, server),
            },
            Endpoint::HostedDataset { workspace, .. } => {
                let tenant = self.tenant_id.as_deref().unwrap_or_default();
                match workspace {
                    Some(ws) => format!("{}api.powerbi.com/v1.0/{}/{}", HOSTED_SCHEME, tenant, ws),
                    None => format!("{}api.powerbi.com/v1.0/{}", HOSTED_SCHEME, tenant),
                }
            }
        }
    }

    /// Same descriptor with a catalog filled in.
    pub fn with_catalog(&self, catalog: impl Into<String>) -> Self {
        Self {
            catalog: Some(catalog.into()),
            ..self.clone()
        }
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    matches!(value.as_str(), "true" | "sspi" | "yes")
}
