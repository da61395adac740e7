//! Scripted in-process provider.
//!
//! Serves fixed tables keyed by query text, counts every interface call,
//! can fail any single call on demand, and keeps a ledger of live handles
//! so tests can assert that everything acquired was released exactly once.
//!
//! ```rust,ignore
//! let provider = MemoryProvider::new()
//!     .with_catalog("Sales")
//!     .with_table(
//!         "EVALUATE Customer",
//!         MemoryTable::new()
//!             .column("Customer[CustomerKey]", DbType::I4)
//!             .row(vec![NativeValue::Int(1)]),
//!     )
//!     .fail_on(ProviderCall::NextRow, 2);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{
    AccessorHandle, Binding, ColumnInfo, ColumnStatus, Command, CommandFactory, DataSource,
    DbType, PropertyId, PropertySet, PropertyValue, Provider, ProviderError, ProviderResult,
    RowHandle, Rowset, RuntimeScope,
};
use crate::binding::{RowBuffer, Variant};
use crate::error::{MsolapError, MsolapResult};
use crate::session::CATALOG_QUERY;
use crate::types::temporal::{self, DbTimestamp};

/// `DB_E_ERRORSINCOMMAND`
const E_ERRORS_IN_COMMAND: i32 = 0x8004_0E14_u32 as i32;
/// `DB_SEC_E_AUTH_FAILED`
const E_AUTH_FAILED: i32 = 0x8004_0E4D_u32 as i32;
/// `DB_E_ROWSNOTRELEASED`
const E_ROWS_NOT_RELEASED: i32 = 0x8004_0E25_u32 as i32;
/// `DB_E_BADACCESSORHANDLE`
const E_BAD_ACCESSOR: i32 = 0x8004_0E00_u32 as i32;
/// `DB_E_BADROWHANDLE`
const E_BAD_ROW: i32 = 0x8004_0E04_u32 as i32;

/// Interface calls that are counted and can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderCall {
    EnterRuntime,
    CreateDataSource,
    SetProperties,
    Initialize,
    CreateSession,
    CreateCommand,
    SetText,
    SetCommandProperties,
    Execute,
    ColumnInfo,
    CreateAccessor,
    NextRow,
    GetData,
}

impl ProviderCall {
    pub const ALL: &'static [ProviderCall] = &[
        ProviderCall::EnterRuntime,
        ProviderCall::CreateDataSource,
        ProviderCall::SetProperties,
        ProviderCall::Initialize,
        ProviderCall::CreateSession,
        ProviderCall::CreateCommand,
        ProviderCall::SetText,
        ProviderCall::SetCommandProperties,
        ProviderCall::Execute,
        ProviderCall::ColumnInfo,
        ProviderCall::CreateAccessor,
        ProviderCall::NextRow,
        ProviderCall::GetData,
    ];
}

/// Live handle counts. Every field returns to zero once all owners are gone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceLedger {
    pub runtimes: i64,
    pub data_sources: i64,
    pub sessions: i64,
    pub commands: i64,
    pub rowsets: i64,
    pub accessors: i64,
    pub rows: i64,
    /// Releases of a handle that was not live.
    pub double_releases: i64,
}

impl ResourceLedger {
    pub fn is_balanced(&self) -> bool {
        *self == Self::default()
    }
}

/// A cell value as stored by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl NativeValue {
    fn as_text(&self) -> Option<String> {
        match self {
            NativeValue::Null => None,
            NativeValue::Int(v) => Some(v.to_string()),
            NativeValue::Float(v) => Some(v.to_string()),
            NativeValue::Bool(v) => Some(v.to_string()),
            NativeValue::Text(s) => Some(s.clone()),
            NativeValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int(v) => Some(*v),
            NativeValue::Float(v) => Some(*v as i64),
            NativeValue::Bool(v) => Some(*v as i64),
            NativeValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Int(v) => Some(*v as f64),
            NativeValue::Float(v) => Some(*v),
            NativeValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            NativeValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Int(v) => Some(*v != 0),
            NativeValue::Float(v) => Some(*v != 0.0),
            NativeValue::Bool(v) => Some(*v),
            NativeValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            NativeValue::Timestamp(ts) => Some(*ts),
            NativeValue::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryColumn {
    pub name: Option<String>,
    pub db_type: DbType,
}

/// A result set served for one query text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<MemoryColumn>,
    pub rows: Vec<Vec<NativeValue>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, db_type: DbType) -> Self {
        self.columns.push(MemoryColumn {
            name: Some(name.to_string()),
            db_type,
        });
        self
    }

    /// A column the provider reports without a name.
    pub fn unnamed_column(mut self, db_type: DbType) -> Self {
        self.columns.push(MemoryColumn { name: None, db_type });
        self
    }

    pub fn row(mut self, values: Vec<NativeValue>) -> Self {
        self.rows.push(values);
        self
    }
}

// ==================== Fixture format ====================

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    catalogs: Vec<String>,
    #[serde(default)]
    queries: BTreeMap<String, FixtureTable>,
}

#[derive(Debug, Deserialize)]
struct FixtureTable {
    columns: Vec<FixtureColumn>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct FixtureColumn {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    db_type: DbType,
}

fn cell_from_json(value: &serde_json::Value, db_type: DbType) -> Result<NativeValue, String> {
    use serde_json::Value as Json;
    match value {
        Json::Null => Ok(NativeValue::Null),
        Json::Bool(b) => Ok(NativeValue::Bool(*b)),
        Json::Number(n) => match n.as_i64() {
            Some(i) if !db_type.is_fractional() => Ok(NativeValue::Int(i)),
            _ => n
                .as_f64()
                .map(NativeValue::Float)
                .ok_or_else(|| format!("number {} out of range", n)),
        },
        Json::String(s) if db_type.is_temporal() => parse_timestamp(s)
            .map(NativeValue::Timestamp)
            .ok_or_else(|| format!("invalid timestamp '{}'", s)),
        Json::String(s) => Ok(NativeValue::Text(s.clone())),
        other => Err(format!("unsupported cell {}", other)),
    }
}

// ==================== Provider ====================

#[derive(Debug, Default)]
struct State {
    catalogs: Vec<String>,
    catalog_type: Option<DbType>,
    tables: HashMap<String, MemoryTable>,
    login: Option<(String, String)>,
    calls: HashMap<ProviderCall, usize>,
    faults: Vec<(ProviderCall, usize)>,
    ledger: ResourceLedger,
    init_properties: Vec<PropertySet>,
    command_properties: Vec<PropertySet>,
    executed: Vec<String>,
    next_handle: u64,
}

impl State {
    /// Count a call and fail it if a fault is armed for this occurrence.
    fn record(&mut self, call: ProviderCall) -> ProviderResult<()> {
        let count = self.calls.entry(call).or_insert(0);
        *count += 1;
        if self.faults.contains(&(call, *count)) {
            return Err(ProviderError::fail(format!("Injected failure in {:?}", call)));
        }
        Ok(())
    }

    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn catalog_table(&self) -> MemoryTable {
        let mut names = self.catalogs.clone();
        names.sort();
        names.into_iter().fold(
            MemoryTable::new().column(
                "CATALOG_NAME",
                self.catalog_type.unwrap_or(DbType::WStr),
            ),
            |table, name| table.row(vec![NativeValue::Text(name)]),
        )
    }
}

type Shared = Arc<Mutex<State>>;

fn lock(state: &Shared) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fixture-driven provider. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    state: Shared,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON fixture (`catalogs` plus `queries`).
    pub fn from_fixture_str(json: &str) -> MsolapResult<Self> {
        let fixture: Fixture = serde_json::from_str(json)
            .map_err(|e| MsolapError::Config(format!("Invalid fixture: {}", e)))?;

        let mut provider = Self::new();
        for catalog in fixture.catalogs {
            provider = provider.with_catalog(&catalog);
        }
        for (query, table) in fixture.queries {
            let mut memory = MemoryTable::new();
            for column in &table.columns {
                memory.columns.push(MemoryColumn {
                    name: column.name.clone(),
                    db_type: column.db_type,
                });
            }
            for (i, row) in table.rows.iter().enumerate() {
                if row.len() != table.columns.len() {
                    return Err(MsolapError::Config(format!(
                        "Fixture query '{}' row {} has {} cells, expected {}",
                        query,
                        i,
                        row.len(),
                        table.columns.len()
                    )));
                }
                let cells = row
                    .iter()
                    .zip(&table.columns)
                    .map(|(cell, column)| cell_from_json(cell, column.db_type))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        MsolapError::Config(format!("Fixture query '{}' row {}: {}", query, i, e))
                    })?;
                memory.rows.push(cells);
            }
            provider = provider.with_table(&query, memory);
        }
        Ok(provider)
    }

    pub fn from_fixture_file(path: impl AsRef<Path>) -> MsolapResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_fixture_str(&json)
    }

    pub fn with_catalog(self, name: &str) -> Self {
        lock(&self.state).catalogs.push(name.to_string());
        self
    }

    /// Report `CATALOG_NAME` as `db_type` instead of WSTR.
    pub fn with_catalog_type(self, db_type: DbType) -> Self {
        lock(&self.state).catalog_type = Some(db_type);
        self
    }

    pub fn with_table(self, query: &str, table: MemoryTable) -> Self {
        lock(&self.state).tables.insert(query.to_string(), table);
        self
    }

    /// Reject initialization unless these credentials are submitted.
    pub fn with_login(self, user: &str, password: &str) -> Self {
        lock(&self.state).login = Some((user.to_string(), password.to_string()));
        self
    }

    /// Fail the `nth` (1-based) occurrence of `call`.
    pub fn fail_on(self, call: ProviderCall, nth: usize) -> Self {
        lock(&self.state).faults.push((call, nth));
        self
    }

    pub fn calls(&self, call: ProviderCall) -> usize {
        lock(&self.state).calls.get(&call).copied().unwrap_or(0)
    }

    pub fn ledger(&self) -> ResourceLedger {
        lock(&self.state).ledger.clone()
    }

    /// Every initialization property set submitted, in order.
    pub fn init_properties(&self) -> Vec<PropertySet> {
        lock(&self.state).init_properties.clone()
    }

    /// Every rowset property set submitted to a command, in order.
    pub fn command_properties(&self) -> Vec<PropertySet> {
        lock(&self.state).command_properties.clone()
    }

    pub fn executed_queries(&self) -> Vec<String> {
        lock(&self.state).executed.clone()
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn enter_runtime(&self) -> ProviderResult<Box<dyn RuntimeScope>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::EnterRuntime)?;
        state.ledger.runtimes += 1;
        Ok(Box::new(MemoryRuntime {
            state: Arc::clone(&self.state),
        }))
    }

    fn create_data_source(&self) -> ProviderResult<Box<dyn DataSource>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::CreateDataSource)?;
        state.ledger.data_sources += 1;
        Ok(Box::new(MemoryDataSource {
            state: Arc::clone(&self.state),
            properties: None,
            initialized: false,
        }))
    }
}

struct MemoryRuntime {
    state: Shared,
}

impl RuntimeScope for MemoryRuntime {}

impl Drop for MemoryRuntime {
    fn drop(&mut self) {
        lock(&self.state).ledger.runtimes -= 1;
    }
}

struct MemoryDataSource {
    state: Shared,
    properties: Option<PropertySet>,
    initialized: bool,
}

impl MemoryDataSource {
    fn check_login(&self, state: &State, properties: &PropertySet) -> ProviderResult<()> {
        let Some((user, password)) = &state.login else {
            return Ok(());
        };
        let text = |id| match properties.get(id) {
            Some(PropertyValue::Text(s)) => Some(s.as_str()),
            _ => None,
        };
        if text(PropertyId::UserId) == Some(user) && text(PropertyId::Password) == Some(password) {
            Ok(())
        } else {
            Err(ProviderError::new(
                E_AUTH_FAILED,
                format!(
                    "Authentication failed for user '{}'",
                    text(PropertyId::UserId).unwrap_or_default()
                ),
            ))
        }
    }
}

impl DataSource for MemoryDataSource {
    fn set_properties(&mut self, properties: &PropertySet) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::SetProperties)?;
        state.init_properties.push(properties.clone());
        self.properties = Some(properties.clone());
        Ok(())
    }

    fn initialize(&mut self) -> ProviderResult<()> {
        let state_ref = Arc::clone(&self.state);
        let mut state = lock(&state_ref);
        state.record(ProviderCall::Initialize)?;

        let properties = self
            .properties
            .clone()
            .ok_or_else(|| ProviderError::fail("Initialization properties not set"))?;
        if properties.get(PropertyId::DataSource).is_none() {
            return Err(ProviderError::fail("Data source not specified"));
        }
        self.check_login(&state, &properties)?;
        if let Some(PropertyValue::Text(catalog)) = properties.get(PropertyId::Catalog)
            && !state.catalogs.contains(catalog)
        {
            return Err(ProviderError::fail(format!(
                "Either the user does not have access to the '{}' database, or the database does not exist",
                catalog
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn uninitialize(&mut self) {
        self.initialized = false;
    }

    fn create_session(&mut self) -> ProviderResult<Box<dyn CommandFactory>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::CreateSession)?;
        if !self.initialized {
            return Err(ProviderError::fail("Data source is not initialized"));
        }
        state.ledger.sessions += 1;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Drop for MemoryDataSource {
    fn drop(&mut self) {
        lock(&self.state).ledger.data_sources -= 1;
    }
}

struct MemorySession {
    state: Shared,
}

impl CommandFactory for MemorySession {
    fn create_command(&mut self) -> ProviderResult<Box<dyn Command>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::CreateCommand)?;
        state.ledger.commands += 1;
        Ok(Box::new(MemoryCommand {
            state: Arc::clone(&self.state),
            text: None,
        }))
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        lock(&self.state).ledger.sessions -= 1;
    }
}

struct MemoryCommand {
    state: Shared,
    text: Option<String>,
}

impl Command for MemoryCommand {
    fn set_text(&mut self, text: &str) -> ProviderResult<()> {
        lock(&self.state).record(ProviderCall::SetText)?;
        self.text = Some(text.to_string());
        Ok(())
    }

    fn set_properties(&mut self, properties: &PropertySet) -> ProviderResult<()> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::SetCommandProperties)?;
        state.command_properties.push(properties.clone());
        Ok(())
    }

    fn execute(&mut self) -> ProviderResult<Box<dyn Rowset>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::Execute)?;
        let text = self
            .text
            .clone()
            .ok_or_else(|| ProviderError::fail("Command text was not set"))?;

        let table = if text == CATALOG_QUERY {
            state.catalog_table()
        } else {
            state.tables.get(&text).cloned().ok_or_else(|| {
                ProviderError::new(
                    E_ERRORS_IN_COMMAND,
                    format!("Query (1, 1) Failed to resolve name '{}'", text),
                )
            })?
        };
        state.executed.push(text);
        state.ledger.rowsets += 1;
        Ok(Box::new(MemoryRowset {
            state: Arc::clone(&self.state),
            table,
            position: 0,
            accessors: HashMap::new(),
            rows: HashMap::new(),
        }))
    }
}

impl Drop for MemoryCommand {
    fn drop(&mut self) {
        lock(&self.state).ledger.commands -= 1;
    }
}

struct MemoryRowset {
    state: Shared,
    table: MemoryTable,
    position: usize,
    accessors: HashMap<u64, Vec<Binding>>,
    /// Held row handle → row index.
    rows: HashMap<u64, usize>,
}

impl Rowset for MemoryRowset {
    fn column_info(&mut self) -> ProviderResult<Vec<ColumnInfo>> {
        lock(&self.state).record(ProviderCall::ColumnInfo)?;
        Ok(self
            .table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| ColumnInfo {
                ordinal: i + 1,
                name: c.name.clone(),
                db_type: c.db_type,
            })
            .collect())
    }

    fn create_accessor(
        &mut self,
        bindings: &[Binding],
        row_size: usize,
    ) -> ProviderResult<AccessorHandle> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::CreateAccessor)?;
        for b in bindings {
            if b.ordinal == 0 || b.ordinal > self.table.columns.len() {
                return Err(ProviderError::fail(format!("Invalid column ordinal {}", b.ordinal)));
            }
            if b.value_offset + b.max_len > row_size || b.status_offset + 4 > row_size {
                return Err(ProviderError::fail(format!(
                    "Binding for column {} exceeds row size {}",
                    b.ordinal, row_size
                )));
            }
        }
        let id = state.handle();
        state.ledger.accessors += 1;
        self.accessors.insert(id, bindings.to_vec());
        Ok(AccessorHandle(id))
    }

    fn release_accessor(&mut self, accessor: AccessorHandle) {
        let mut state = lock(&self.state);
        if self.accessors.remove(&accessor.0).is_some() {
            state.ledger.accessors -= 1;
        } else {
            state.ledger.double_releases += 1;
        }
    }

    fn next_row(&mut self) -> ProviderResult<Option<RowHandle>> {
        let mut state = lock(&self.state);
        state.record(ProviderCall::NextRow)?;
        if !self.rows.is_empty() {
            return Err(ProviderError::new(
                E_ROWS_NOT_RELEASED,
                "Previously fetched row was not released",
            ));
        }
        if self.position >= self.table.rows.len() {
            return Ok(None);
        }
        let id = state.handle();
        state.ledger.rows += 1;
        self.rows.insert(id, self.position);
        self.position += 1;
        Ok(Some(RowHandle(id)))
    }

    fn get_data(
        &mut self,
        row: RowHandle,
        accessor: AccessorHandle,
        buffer: &mut RowBuffer,
    ) -> ProviderResult<()> {
        lock(&self.state).record(ProviderCall::GetData)?;
        let index = *self
            .rows
            .get(&row.0)
            .ok_or_else(|| ProviderError::new(E_BAD_ROW, "Invalid row handle"))?;
        let bindings = self
            .accessors
            .get(&accessor.0)
            .ok_or_else(|| ProviderError::new(E_BAD_ACCESSOR, "Invalid accessor handle"))?;
        let cells = &self.table.rows[index];

        for b in bindings {
            let native = self.table.columns[b.ordinal - 1].db_type;
            let cell = cells.get(b.ordinal - 1).unwrap_or(&NativeValue::Null);
            let (status, length) = encode_cell(buffer, b, native, cell);
            buffer.set_status(b.status_offset, status);
            buffer.set_length(b.length_offset, length);
        }
        Ok(())
    }

    fn release_row(&mut self, row: RowHandle) {
        let mut state = lock(&self.state);
        if self.rows.remove(&row.0).is_some() {
            state.ledger.rows -= 1;
        } else {
            state.ledger.double_releases += 1;
        }
    }
}

impl Drop for MemoryRowset {
    fn drop(&mut self) {
        lock(&self.state).ledger.rowsets -= 1;
    }
}

/// Convert one cell to the bound type and write it. Returns status and length.
fn encode_cell(
    buffer: &mut RowBuffer,
    binding: &Binding,
    native: DbType,
    cell: &NativeValue,
) -> (ColumnStatus, u64) {
    if *cell == NativeValue::Null && binding.db_type != DbType::Variant {
        return (ColumnStatus::IsNull, 0);
    }
    let offset = binding.value_offset;
    let fixed = binding.max_len as u64;

    match binding.db_type {
        DbType::I8 => match cell.as_i64() {
            Some(v) => {
                buffer.write_i64(offset, v);
                (ColumnStatus::Ok, fixed)
            }
            None => (ColumnStatus::CantConvertValue, 0),
        },
        DbType::R8 => match cell.as_f64() {
            Some(v) => {
                buffer.write_f64(offset, v);
                (ColumnStatus::Ok, fixed)
            }
            None => (ColumnStatus::CantConvertValue, 0),
        },
        DbType::Bool => match cell.as_bool() {
            Some(v) => {
                buffer.write_bool(offset, v);
                (ColumnStatus::Ok, fixed)
            }
            None => (ColumnStatus::CantConvertValue, 0),
        },
        DbType::WStr => match cell.as_text() {
            Some(text) => buffer.write_wide(offset, binding.max_len, &text),
            None => (ColumnStatus::CantConvertValue, 0),
        },
        DbType::DbTimestamp => match cell.as_timestamp() {
            Some(ts) => {
                buffer.write_timestamp(offset, &DbTimestamp::from_naive(&ts));
                (ColumnStatus::Ok, fixed)
            }
            None => (ColumnStatus::CantConvertValue, 0),
        },
        DbType::Variant => {
            buffer.write_variant(offset, &to_variant(native, cell));
            (ColumnStatus::Ok, fixed)
        }
        _ => (ColumnStatus::BadAccessor, 0),
    }
}

/// The self-describing form a cell takes when bound as a tagged value.
fn to_variant(native: DbType, cell: &NativeValue) -> Variant {
    match (native, cell) {
        (_, NativeValue::Null) => Variant::Null,
        (DbType::Cy, v) => v
            .as_f64()
            .map(|f| Variant::Cy((f * crate::types::CURRENCY_SCALE).round() as i64))
            .unwrap_or(Variant::Null),
        (DbType::VarNumeric, v) => v
            .as_f64()
            .map(|f| Variant::Decimal {
                scale: 4,
                negative: f < 0.0,
                mantissa: (f.abs() * 10_000.0).round() as u128,
            })
            .unwrap_or(Variant::Null),
        (DbType::Guid | DbType::Bytes | DbType::Udt | DbType::Other(_), _) => {
            Variant::Other(native.code())
        }
        (_, NativeValue::Int(v)) => Variant::I8(*v),
        (_, NativeValue::Float(v)) => Variant::R8(*v),
        (_, NativeValue::Bool(v)) => Variant::Bool(*v),
        (_, NativeValue::Text(s)) => Variant::Bstr(s.clone()),
        (_, NativeValue::Timestamp(ts)) => Variant::Date(temporal::naive_to_ole_date(ts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingPlan;
    use crate::types::TaggedValue;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r#"{
        "catalogs": ["Sales"],
        "queries": {
            "EVALUATE Sales": {
                "columns": [
                    {"name": "Sales[Amount]", "type": "R8"},
                    {"name": "Sales[Date]", "type": "DBTIMESTAMP"},
                    {"type": "CY"}
                ],
                "rows": [[1.5, "2024-01-02 03:04:05", 12.5], [null, null, null]]
            }
        }
    }"#;

    #[test]
    fn test_fixture_loads() {
        let provider = MemoryProvider::from_fixture_str(FIXTURE).unwrap();
        let state = lock(&provider.state);
        let table = &state.tables["EVALUATE Sales"];
        assert_eq!(table.columns[2].name, None);
        assert_eq!(table.columns[2].db_type, DbType::Cy);
        assert_eq!(table.rows[0][0], NativeValue::Float(1.5));
        assert!(matches!(table.rows[0][1], NativeValue::Timestamp(_)));
        assert_eq!(table.rows[1][0], NativeValue::Null);
    }

    #[test]
    fn test_fixture_rejects_bad_rows() {
        let bad = r#"{"queries": {"q": {"columns": [{"type": "I4"}], "rows": [[1, 2]]}}}"#;
        assert!(matches!(
            MemoryProvider::from_fixture_str(bad),
            Err(MsolapError::Config(_))
        ));
        let bad_type = r#"{"queries": {"q": {"columns": [{"type": "NOPE"}]}}}"#;
        assert!(MemoryProvider::from_fixture_str(bad_type).is_err());
    }

    #[test]
    fn test_fault_fires_on_nth_call() {
        let provider = MemoryProvider::new().fail_on(ProviderCall::EnterRuntime, 2);
        let first = provider.enter_runtime();
        assert!(first.is_ok());
        assert!(provider.enter_runtime().is_err());
        assert_eq!(provider.calls(ProviderCall::EnterRuntime), 2);
        drop(first);
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_rowset_requires_row_release() {
        let provider = MemoryProvider::new().with_table(
            "q",
            MemoryTable::new()
                .column("A", DbType::I4)
                .row(vec![NativeValue::Int(1)])
                .row(vec![NativeValue::Int(2)]),
        );
        let mut ds = provider.create_data_source().unwrap();
        ds.set_properties(&PropertySet::new().text(PropertyId::DataSource, "x"))
            .unwrap();
        ds.initialize().unwrap();
        let mut session = ds.create_session().unwrap();
        let mut command = session.create_command().unwrap();
        command.set_text("q").unwrap();
        let mut rowset = command.execute().unwrap();

        let row = rowset.next_row().unwrap().unwrap();
        assert!(rowset.next_row().is_err());
        rowset.release_row(row);
        rowset.release_row(row);
        assert_eq!(provider.ledger().double_releases, 1);
    }

    #[test]
    fn test_get_data_encodes_per_binding() {
        let provider = MemoryProvider::from_fixture_str(FIXTURE).unwrap();
        let mut ds = provider.create_data_source().unwrap();
        ds.set_properties(&PropertySet::new().text(PropertyId::DataSource, "x"))
            .unwrap();
        ds.initialize().unwrap();
        let mut session = ds.create_session().unwrap();
        let mut command = session.create_command().unwrap();
        command.set_text("EVALUATE Sales").unwrap();
        let mut rowset = command.execute().unwrap();

        let plan = BindingPlan::new(&rowset.column_info().unwrap());
        let accessor = rowset
            .create_accessor(&plan.bindings(), plan.row_size())
            .unwrap();
        let mut buffer = RowBuffer::new(plan.row_size());
        let row = rowset.next_row().unwrap().unwrap();
        rowset.get_data(row, accessor, &mut buffer).unwrap();

        let amount = &plan.columns()[0];
        assert_eq!(buffer.status(amount.status_offset()), ColumnStatus::Ok);
        assert_eq!(buffer.read_f64(amount.value_offset()), 1.5);
        let date = &plan.columns()[1];
        assert_eq!(
            buffer.read_naive(date.value_offset()).map(|d| d.to_string()),
            Some("2024-01-02 03:04:05".to_string())
        );
        let cy = &plan.columns()[2];
        assert_eq!(buffer.read_f64(cy.value_offset()), 12.5);

        rowset.release_row(row);
        let row = rowset.next_row().unwrap().unwrap();
        buffer.clear();
        rowset.get_data(row, accessor, &mut buffer).unwrap();
        assert_eq!(buffer.status(amount.status_offset()), ColumnStatus::IsNull);
        rowset.release_row(row);
        rowset.release_accessor(accessor);
    }

    #[test]
    fn test_variant_encoding() {
        assert_eq!(
            to_variant(DbType::Cy, &NativeValue::Float(1.25)).to_tagged(),
            TaggedValue::Float(1.25)
        );
        assert_eq!(
            to_variant(DbType::Guid, &NativeValue::Text("x".into())),
            Variant::Other(72)
        );
        assert_eq!(
            to_variant(DbType::Str, &NativeValue::Text("x".into())),
            Variant::Bstr("x".into())
        );
    }

    #[test]
    fn test_unknown_catalog_rejected() {
        let provider = MemoryProvider::new().with_catalog("Sales");
        let mut ds = provider.create_data_source().unwrap();
        ds.set_properties(
            &PropertySet::new()
                .text(PropertyId::DataSource, "x")
                .text(PropertyId::Catalog, "Nope"),
        )
        .unwrap();
        let err = ds.initialize().unwrap_err();
        assert!(err.message.contains("'Nope'"));
    }
}
