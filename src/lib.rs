//! # msolap: typed row streaming from OLAP tabular providers
//!
//! Resolves a free-form connection string into an authenticated session
//! against an Analysis-Services-compatible provider, negotiates a fixed
//! row-buffer layout per query, and streams rows out as engine values.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use msolap::prelude::*;
//!
//! let descriptor = ConnectionDescriptor::resolve(
//!     "Server=powerbi://api.powerbi.com/v1.0/contoso.com/Sales;AppId=app;AppKey=key",
//! );
//! let mut session = Session::open(&provider, descriptor)?;
//! let mut cursor = session.execute("EVALUATE TOPN(10, Customer)")?;
//! while cursor.step()? {
//!     println!("{}", cursor.get_value(0, LogicalType::Varchar)?);
//! }
//! ```
//!
//! ## Pipeline
//!
//! | Stage                | Module        | Output                    |
//! |----------------------|---------------|---------------------------|
//! | Tokenize             | [`parser`]    | `ConnectionString`        |
//! | Resolve              | [`descriptor`]| `ConnectionDescriptor`    |
//! | Connect              | [`session`]   | `Session`                 |
//! | Plan buffer layout   | [`binding`]   | `BindingPlan`             |
//! | Fetch rows           | [`cursor`]    | `RowCursor`               |
//! | Convert              | [`types`]     | `Value`                   |
//! | Host table function  | [`engine`]    | `DataChunk`               |

pub mod binding;
pub mod config;
pub mod cursor;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod parser;
pub mod provider;
pub mod session;
pub mod types;

pub mod prelude {
    pub use crate::config::ScanConfig;
    pub use crate::cursor::{CursorState, RowCursor};
    pub use crate::descriptor::{Auth, ConnectionDescriptor, Endpoint, Topology};
    pub use crate::engine::{BindData, BindInput, DataChunk, MsolapScan, ScanState};
    pub use crate::error::*;
    pub use crate::provider::Provider;
    pub use crate::provider::memory::MemoryProvider;
    pub use crate::session::{Session, SessionBuilder};
    pub use crate::types::{LogicalType, Value};
}

/// Resolve a connection string into a descriptor.
///
/// # Example
///
/// ```
/// use msolap::descriptor::Topology;
///
/// let d = msolap::resolve("Server=asazure://westus.asazure.windows.net/srv;Database=Model");
/// assert_eq!(d.topology(), Topology::CloudGateway);
/// assert_eq!(d.catalog.as_deref(), Some("Model"));
/// ```
pub fn resolve(connection_string: &str) -> descriptor::ConnectionDescriptor {
    descriptor::ConnectionDescriptor::resolve(connection_string)
}
