//! Tabular-data binding protocol.
//!
//! The provider surface is modelled as a small set of traits. Every interface
//! handle is an owned `Box<dyn ...>`: dropping it is the release, so a handle
//! is released exactly once on every control path. Row and accessor handles
//! are plain ids that must be handed back through the [`Rowset`] that issued
//! them; [`crate::cursor::RowCursor`] is their single owner.
//!
//! Call order for one query:
//!
//! ```text
//! Provider ─enter_runtime──────────────▶ RuntimeScope
//!          ─create_data_source─────────▶ DataSource ─set_properties/initialize
//!                                        DataSource ─create_session─▶ CommandFactory
//! CommandFactory ─create_command───────▶ Command ─set_text/set_properties/execute─▶ Rowset
//! Rowset ─column_info / create_accessor / next_row / get_data / release_row / release_accessor
//! ```

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::RowBuffer;

/// Generic failure code used when a provider has no specific HRESULT.
pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;

/// `DB_MODE_READ` access mode value.
pub const DB_MODE_READ: i32 = 1;

/// Error reported by a provider interface call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HRESULT-style failure code.
    pub code: i32,
    /// Native error text.
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure with the generic `E_FAIL` code.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(E_FAIL, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.message, self.code as u32)
    }
}

impl std::error::Error for ProviderError {}

/// Result type for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

// ==================== Native type tags ====================

/// Native column/value type tag as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum DbType {
    Empty,
    Null,
    I1,
    I2,
    I4,
    I8,
    UI1,
    UI2,
    UI4,
    UI8,
    R4,
    R8,
    Cy,
    Decimal,
    Numeric,
    VarNumeric,
    Bool,
    Date,
    DbDate,
    DbTime,
    DbTimestamp,
    FileTime,
    Bstr,
    Str,
    WStr,
    Variant,
    Guid,
    Bytes,
    Error,
    IDispatch,
    IUnknown,
    Udt,
    /// A code this crate does not name.
    Other(u16),
}

impl DbType {
    const NAMED: &'static [(DbType, u16, &'static str)] = &[
        (DbType::Empty, 0, "EMPTY"),
        (DbType::Null, 1, "NULL"),
        (DbType::I2, 2, "I2"),
        (DbType::I4, 3, "I4"),
        (DbType::R4, 4, "R4"),
        (DbType::R8, 5, "R8"),
        (DbType::Cy, 6, "CY"),
        (DbType::Date, 7, "DATE"),
        (DbType::Bstr, 8, "BSTR"),
        (DbType::IDispatch, 9, "IDISPATCH"),
        (DbType::Error, 10, "ERROR"),
        (DbType::Bool, 11, "BOOL"),
        (DbType::Variant, 12, "VARIANT"),
        (DbType::IUnknown, 13, "IUNKNOWN"),
        (DbType::Decimal, 14, "DECIMAL"),
        (DbType::I1, 16, "I1"),
        (DbType::UI1, 17, "UI1"),
        (DbType::UI2, 18, "UI2"),
        (DbType::UI4, 19, "UI4"),
        (DbType::I8, 20, "I8"),
        (DbType::UI8, 21, "UI8"),
        (DbType::FileTime, 64, "FILETIME"),
        (DbType::Guid, 72, "GUID"),
        (DbType::Bytes, 128, "BYTES"),
        (DbType::Str, 129, "STR"),
        (DbType::WStr, 130, "WSTR"),
        (DbType::Numeric, 131, "NUMERIC"),
        (DbType::Udt, 132, "UDT"),
        (DbType::DbDate, 133, "DBDATE"),
        (DbType::DbTime, 134, "DBTIME"),
        (DbType::DbTimestamp, 135, "DBTIMESTAMP"),
        (DbType::VarNumeric, 139, "VARNUMERIC"),
    ];

    /// Wire code of this tag.
    pub fn code(self) -> u16 {
        match self {
            DbType::Other(code) => code,
            named => Self::NAMED
                .iter()
                .find(|(t, _, _)| *t == named)
                .map(|(_, code, _)| *code)
                .unwrap_or_default(),
        }
    }

    pub fn from_code(code: u16) -> Self {
        Self::NAMED
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(t, _, _)| *t)
            .unwrap_or(DbType::Other(code))
    }

    /// Parse a short name such as `I4` or `DBTYPE_WSTR` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let short = upper.strip_prefix("DBTYPE_").unwrap_or(&upper);
        Self::NAMED
            .iter()
            .find(|(_, _, n)| *n == short)
            .map(|(t, _, _)| *t)
    }

    pub fn name(self) -> String {
        match self {
            DbType::Other(code) => format!("TYPE({})", code),
            named => Self::NAMED
                .iter()
                .find(|(t, _, _)| *t == named)
                .map(|(_, _, n)| n.to_string())
                .unwrap_or_default(),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DbType::I1
                | DbType::I2
                | DbType::I4
                | DbType::I8
                | DbType::UI1
                | DbType::UI2
                | DbType::UI4
                | DbType::UI8
        )
    }

    /// Floating and fixed-point encodings, currency included.
    pub fn is_fractional(self) -> bool {
        matches!(
            self,
            DbType::R4 | DbType::R8 | DbType::Cy | DbType::Decimal | DbType::Numeric
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            DbType::Date | DbType::DbDate | DbType::DbTime | DbType::DbTimestamp | DbType::FileTime
        )
    }

    pub fn is_wide_string(self) -> bool {
        matches!(self, DbType::Bstr | DbType::WStr)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<String> for DbType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        DbType::from_name(&value).ok_or_else(|| format!("unknown native type '{}'", value))
    }
}

// ==================== Status ====================

/// Per-value status written by the provider next to each bound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnStatus {
    Ok,
    BadAccessor,
    CantConvertValue,
    IsNull,
    Truncated,
    SignMismatch,
    DataOverflow,
    CantCreate,
    Unavailable,
    Other(u32),
}

impl ColumnStatus {
    pub fn code(self) -> u32 {
        match self {
            ColumnStatus::Ok => 0,
            ColumnStatus::BadAccessor => 1,
            ColumnStatus::CantConvertValue => 2,
            ColumnStatus::IsNull => 3,
            ColumnStatus::Truncated => 4,
            ColumnStatus::SignMismatch => 5,
            ColumnStatus::DataOverflow => 6,
            ColumnStatus::CantCreate => 7,
            ColumnStatus::Unavailable => 8,
            ColumnStatus::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => ColumnStatus::Ok,
            1 => ColumnStatus::BadAccessor,
            2 => ColumnStatus::CantConvertValue,
            3 => ColumnStatus::IsNull,
            4 => ColumnStatus::Truncated,
            5 => ColumnStatus::SignMismatch,
            6 => ColumnStatus::DataOverflow,
            7 => ColumnStatus::CantCreate,
            8 => ColumnStatus::Unavailable,
            other => ColumnStatus::Other(other),
        }
    }

    /// A payload is present. Truncated strings still carry their prefix.
    pub fn has_value(self) -> bool {
        matches!(self, ColumnStatus::Ok | ColumnStatus::Truncated)
    }
}

// ==================== Properties ====================

/// Property group a property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PropertyGroup {
    /// Data-source initialization properties.
    DbInit,
    /// Per-command rowset properties.
    Rowset,
}

/// Properties this crate submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyId {
    DataSource,
    Catalog,
    Mode,
    IntegratedSecurity,
    UserId,
    Password,
    ApplicationId,
    ApplicationKey,
    Authority,
    Resource,
    TenantId,
    Bookmarks,
    CommandTimeout,
}

impl PropertyId {
    /// Provider property id.
    pub fn code(self) -> u32 {
        match self {
            PropertyId::DataSource => 0x3B,
            PropertyId::Catalog => 0xE9,
            PropertyId::Mode => 0x3F,
            PropertyId::IntegratedSecurity => 0x07,
            PropertyId::UserId => 0x0C,
            PropertyId::Password => 0x09,
            // provider-specific ids for directory authentication
            PropertyId::ApplicationId => 1,
            PropertyId::ApplicationKey => 2,
            PropertyId::Authority => 3,
            PropertyId::Resource => 4,
            PropertyId::TenantId => 5,
            PropertyId::Bookmarks => 0x0E,
            PropertyId::CommandTimeout => 0x22,
        }
    }

    pub fn group(self) -> PropertyGroup {
        match self {
            PropertyId::Bookmarks | PropertyId::CommandTimeout => PropertyGroup::Rowset,
            _ => PropertyGroup::DbInit,
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, PropertyId::Password | PropertyId::ApplicationKey)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Int(i32),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => write!(f, "{}", s),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub id: PropertyId,
    pub value: PropertyValue,
}

/// An ordered property set, submitted atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertySet {
    properties: Vec<Property>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, id: PropertyId, value: impl Into<String>) -> Self {
        self.push(id, PropertyValue::Text(value.into()));
        self
    }

    pub fn int(mut self, id: PropertyId, value: i32) -> Self {
        self.push(id, PropertyValue::Int(value));
        self
    }

    pub fn flag(mut self, id: PropertyId, value: bool) -> Self {
        self.push(id, PropertyValue::Bool(value));
        self
    }

    pub fn push(&mut self, id: PropertyId, value: PropertyValue) {
        self.properties.push(Property { id, value });
    }

    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.properties.iter().find(|p| p.id == id).map(|p| &p.value)
    }

    pub fn ids(&self) -> Vec<PropertyId> {
        self.properties.iter().map(|p| p.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Copy with secret values replaced by `***`.
    pub fn masked(&self) -> Self {
        Self {
            properties: self
                .properties
                .iter()
                .map(|p| Property {
                    id: p.id,
                    value: if p.id.is_secret() {
                        PropertyValue::Text("***".to_string())
                    } else {
                        p.value.clone()
                    },
                })
                .collect(),
        }
    }
}

// ==================== Metadata & bindings ====================

/// Column metadata as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// 1-based, provider-assigned, not necessarily dense.
    pub ordinal: usize,
    pub name: Option<String>,
    pub db_type: DbType,
}

/// Where one column's value, length and status live in the row buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub ordinal: usize,
    pub value_offset: usize,
    pub length_offset: usize,
    pub status_offset: usize,
    /// Payload capacity in bytes.
    pub max_len: usize,
    /// Type the provider must convert the value to.
    pub db_type: DbType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessorHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowHandle(pub u64);

// ==================== Interfaces ====================

/// Entry point of a provider implementation.
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire the per-thread runtime capability; released on drop.
    fn enter_runtime(&self) -> ProviderResult<Box<dyn RuntimeScope>>;

    fn create_data_source(&self) -> ProviderResult<Box<dyn DataSource>>;
}

/// Marker for an acquired runtime capability.
pub trait RuntimeScope {}

/// Uninitialized or initialized data source.
pub trait DataSource {
    fn set_properties(&mut self, properties: &PropertySet) -> ProviderResult<()>;

    fn initialize(&mut self) -> ProviderResult<()>;

    fn uninitialize(&mut self);

    /// Derive a session-scoped command factory.
    fn create_session(&mut self) -> ProviderResult<Box<dyn CommandFactory>>;
}

pub trait CommandFactory {
    fn create_command(&mut self) -> ProviderResult<Box<dyn Command>>;
}

pub trait Command {
    fn set_text(&mut self, text: &str) -> ProviderResult<()>;

    fn set_properties(&mut self, properties: &PropertySet) -> ProviderResult<()>;

    fn execute(&mut self) -> ProviderResult<Box<dyn Rowset>>;
}

/// Forward-only row source.
pub trait Rowset {
    fn column_info(&mut self) -> ProviderResult<Vec<ColumnInfo>>;

    fn create_accessor(&mut self, bindings: &[Binding], row_size: usize)
    -> ProviderResult<AccessorHandle>;

    fn release_accessor(&mut self, accessor: AccessorHandle);

    /// Fetch exactly one row; `None` at end of rowset.
    fn next_row(&mut self) -> ProviderResult<Option<RowHandle>>;

    /// Copy the row into `buffer` following the accessor's bindings.
    fn get_data(
        &mut self,
        row: RowHandle,
        accessor: AccessorHandle,
        buffer: &mut RowBuffer,
    ) -> ProviderResult<()>;

    fn release_row(&mut self, row: RowHandle);
}
