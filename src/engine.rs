//! Table-function boundary for a host query engine.
//!
//! The host calls the scan in three phases:
//!
//! 1. [`MsolapScan::bind`] runs the query once on a probe session to learn
//!    the output names and types, then closes the probe.
//! 2. [`MsolapScan::init`] opens the session and cursor used for scanning.
//! 3. [`MsolapScan::scan`] fills one [`DataChunk`] per call until exhausted.
//!
//! # Example
//!
//! ```rust,ignore
//! let scan = MsolapScan::new(Arc::new(provider), ScanConfig::default());
//! let bind = scan.bind(BindInput::new("Server=localhost;Database=Sales", "EVALUATE Sales"))?;
//! let mut state = scan.init(&bind, None)?;
//! let mut chunk = state.new_chunk();
//! while scan.scan(&mut state, &mut chunk)? > 0 {
//!     // consume chunk
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::binding::PlanTag;
use crate::config::ScanConfig;
use crate::cursor::RowCursor;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{MsolapError, MsolapResult};
use crate::parser;
use crate::provider::Provider;
use crate::session::{Session, SessionBuilder};
use crate::types::{LogicalType, Value};

/// Arguments of one table-function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindInput {
    pub connection_string: String,
    pub query: String,
    /// Named `timeout` argument in seconds; must be positive when given.
    pub timeout: Option<i64>,
}

impl BindInput {
    pub fn new(connection_string: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            query: query.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, seconds: i64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// Result of the bind phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BindData {
    pub connection_string: String,
    pub query: String,
    pub timeout_seconds: u32,
    /// Unique output column names.
    pub names: Vec<String>,
    pub types: Vec<LogicalType>,
}

/// Scan phase state. The cursor is dropped before the session it came from.
#[derive(Debug)]
pub struct ScanState {
    cursor: RowCursor,
    session: Session,
    column_ids: Vec<usize>,
    types: Vec<LogicalType>,
    batch_size: usize,
    finished: bool,
}

impl ScanState {
    /// Output columns, as indexes into the bound columns.
    pub fn column_ids(&self) -> &[usize] {
        &self.column_ids
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A chunk shaped for this scan's projection.
    pub fn new_chunk(&self) -> DataChunk {
        DataChunk::new(
            self.column_ids.iter().map(|&i| self.types[i]).collect(),
            self.batch_size,
        )
    }

    /// Close the cursor and the session.
    pub fn close(mut self) {
        self.cursor.close();
        self.session.close();
    }
}

/// Columnar output batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk {
    types: Vec<LogicalType>,
    columns: Vec<Vec<Value>>,
    len: usize,
    capacity: usize,
}

impl DataChunk {
    pub fn new(types: Vec<LogicalType>, capacity: usize) -> Self {
        let columns = types.iter().map(|_| Vec::with_capacity(capacity)).collect();
        Self {
            types,
            columns,
            len: 0,
            capacity,
        }
    }

    /// Rows in the chunk.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn types(&self) -> &[LogicalType] {
        &self.types
    }

    pub fn column(&self, index: usize) -> &[Value] {
        self.columns.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| c.get(index).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn reset(&mut self) {
        self.columns.iter_mut().for_each(Vec::clear);
        self.len = 0;
    }
}

/// The scan table function.
#[derive(Clone)]
pub struct MsolapScan {
    provider: Arc<dyn Provider>,
    config: ScanConfig,
}

impl MsolapScan {
    pub fn new(provider: Arc<dyn Provider>, config: ScanConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the query on a probe session and report its output columns.
    pub fn bind(&self, input: BindInput) -> MsolapResult<BindData> {
        self.config.validate()?;
        let timeout_seconds = match input.timeout {
            Some(t) if t <= 0 => {
                return Err(MsolapError::Config(
                    "timeout must be a positive integer".to_string(),
                ));
            }
            Some(t) => u32::try_from(t).unwrap_or(u32::MAX),
            None => self.config.timeout_seconds,
        };
        let connection_string = self
            .config
            .resolve_connection(&input.connection_string)?
            .to_string();

        let mut session = self.open(&connection_string, timeout_seconds)?;
        let mut cursor = session.execute(&input.query)?;
        let specs = cursor.column_specs();
        cursor.close();
        session.close();

        if specs.is_empty() {
            return Err(MsolapError::Protocol(
                "No columns found in query result".to_string(),
            ));
        }

        let names = unique_names(specs.iter().map(|s| s.name.clone()).collect());
        let types = specs.iter().map(|s| s.logical_type).collect();
        tracing::debug!("Bound {} columns: {}", names.len(), names.join(", "));

        Ok(BindData {
            connection_string,
            query: input.query,
            timeout_seconds,
            names,
            types,
        })
    }

    /// Open the scanning session and cursor. `projection` lists the bound
    /// column indexes to produce, in output order; `None` means all.
    pub fn init(&self, bind: &BindData, projection: Option<&[usize]>) -> MsolapResult<ScanState> {
        let session = self.open(&bind.connection_string, bind.timeout_seconds)?;
        self.init_with_session(bind, projection, session)
    }

    /// Like [`init`](Self::init) but scans over a caller-owned session.
    pub fn init_with_session(
        &self,
        bind: &BindData,
        projection: Option<&[usize]>,
        mut session: Session,
    ) -> MsolapResult<ScanState> {
        self.config.validate()?;
        let column_ids = match projection {
            Some(ids) => {
                if let Some(bad) = ids.iter().find(|&&i| i >= bind.names.len()) {
                    return Err(MsolapError::contract(format!(
                        "Projected column {} out of range ({} columns)",
                        bad,
                        bind.names.len()
                    )));
                }
                ids.to_vec()
            }
            None => (0..bind.names.len()).collect(),
        };

        let mut cursor = session.execute(&bind.query)?;
        if cursor.column_count() != bind.names.len() {
            return Err(MsolapError::Protocol(format!(
                "Query returned {} columns, expected {}",
                cursor.column_count(),
                bind.names.len()
            )));
        }
        cursor.execute()?;

        Ok(ScanState {
            cursor,
            session,
            column_ids,
            types: bind.types.clone(),
            batch_size: self.config.batch_size,
            finished: false,
        })
    }

    /// Fill `chunk` with up to its capacity of rows. Returns the row count;
    /// zero means the scan is complete.
    pub fn scan(&self, state: &mut ScanState, chunk: &mut DataChunk) -> MsolapResult<usize> {
        if chunk.columns.len() != state.column_ids.len() {
            return Err(MsolapError::contract(format!(
                "Chunk has {} columns, scan projects {}",
                chunk.columns.len(),
                state.column_ids.len()
            )));
        }
        if chunk.capacity() == 0 {
            return Err(MsolapError::contract("Chunk has zero capacity"));
        }
        chunk.reset();
        if state.finished {
            return Ok(0);
        }

        let mut rows = 0;
        while rows < chunk.capacity() {
            if !state.cursor.step()? {
                state.finished = true;
                break;
            }
            for (out, &col) in state.column_ids.iter().enumerate() {
                let value = read_column(&state.cursor, col, state.types[col])?;
                chunk.columns[out].push(value);
            }
            rows += 1;
        }
        chunk.len = rows;
        Ok(rows)
    }

    /// Diagnostic description with credentials masked.
    pub fn describe(&self, bind: &BindData) -> Vec<(String, String)> {
        vec![
            (
                "Connection".to_string(),
                parser::parse(&bind.connection_string).masked(),
            ),
            ("Query".to_string(), bind.query.clone()),
        ]
    }

    fn open(&self, connection_string: &str, timeout_seconds: u32) -> MsolapResult<Session> {
        SessionBuilder::new(
            self.provider.as_ref(),
            ConnectionDescriptor::resolve(connection_string),
        )
        .timeout(timeout_seconds)
        .build()
    }
}

/// Typed fast path when the buffer shape matches the output type.
fn read_column(cursor: &RowCursor, col: usize, target: LogicalType) -> MsolapResult<Value> {
    let value = match (cursor.plan_tag(col), target) {
        (Some(PlanTag::Integer64), LogicalType::BigInt) => {
            cursor.get_integer(col)?.map(Value::BigInt)
        }
        (Some(PlanTag::Float64), LogicalType::Double | LogicalType::Decimal) => {
            cursor.get_float(col)?.map(Value::Double)
        }
        (Some(PlanTag::Boolean), LogicalType::Boolean) => cursor.get_boolean(col)?.map(Value::Boolean),
        (Some(PlanTag::FixedWideString), LogicalType::Varchar) => {
            cursor.get_string(col)?.map(Value::Varchar)
        }
        (Some(PlanTag::PackedTimestamp), LogicalType::Timestamp) => {
            cursor.get_timestamp(col)?.map(Value::Timestamp)
        }
        _ => return cursor.get_value(col, target),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Suffix repeated names with `_1`, `_2`, ... skipping names already taken.
fn unique_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{}_{}", name, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DbType;
    use crate::provider::memory::{MemoryProvider, MemoryTable, NativeValue};
    use pretty_assertions::assert_eq;

    fn scan_over(provider: &MemoryProvider, batch_size: usize) -> MsolapScan {
        MsolapScan::new(
            Arc::new(provider.clone()),
            ScanConfig::builder().batch_size(batch_size).build(),
        )
    }

    fn provider() -> MemoryProvider {
        let table = (0..5).fold(
            MemoryTable::new()
                .column("Customer[CustomerKey]", DbType::I4)
                .column("Customer[Name]", DbType::WStr)
                .column("Sales[Amount]", DbType::Cy),
            |t, i| {
                t.row(vec![
                    NativeValue::Int(i),
                    NativeValue::Text(format!("c{}", i)),
                    NativeValue::Float(i as f64 * 1.5),
                ])
            },
        );
        MemoryProvider::new()
            .with_catalog("Sales")
            .with_table("EVALUATE Customer", table)
    }

    #[test]
    fn test_unique_names() {
        assert_eq!(
            unique_names(vec!["a".into(), "a".into(), "a_1".into(), "b".into()]),
            vec!["a", "a_1", "a_1_1", "b"]
        );
    }

    #[test]
    fn test_bind_reports_columns() {
        let provider = provider();
        let scan = scan_over(&provider, 2);
        let bind = scan
            .bind(BindInput::new("Server=localhost;Database=Sales", "EVALUATE Customer"))
            .unwrap();
        assert_eq!(bind.names, vec!["CustomerKey", "Name", "Amount"]);
        assert_eq!(
            bind.types,
            vec![LogicalType::Integer, LogicalType::Varchar, LogicalType::Decimal]
        );
        assert_eq!(bind.timeout_seconds, 60);
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_bind_rejects_bad_timeout() {
        let provider = provider();
        let scan = scan_over(&provider, 2);
        let err = scan
            .bind(BindInput::new("Server=localhost", "EVALUATE Customer").timeout(0))
            .unwrap_err();
        assert!(matches!(err, MsolapError::Config(_)));
    }

    #[test]
    fn test_scan_in_batches_with_projection() {
        let provider = provider();
        let scan = scan_over(&provider, 2);
        let bind = scan
            .bind(BindInput::new("Server=localhost;Database=Sales", "EVALUATE Customer"))
            .unwrap();
        let mut state = scan.init(&bind, Some(&[2, 0][..])).unwrap();
        let mut chunk = state.new_chunk();
        assert_eq!(chunk.types(), &[LogicalType::Decimal, LogicalType::Integer]);

        let mut sizes = Vec::new();
        let mut keys = Vec::new();
        loop {
            let n = scan.scan(&mut state, &mut chunk).unwrap();
            if n == 0 {
                break;
            }
            sizes.push(n);
            keys.extend(chunk.column(1).iter().cloned());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            keys,
            (0..5).map(Value::Integer).collect::<Vec<_>>()
        );
        state.close();
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_scan_rejects_misshapen_chunk() {
        let provider = provider();
        let scan = scan_over(&provider, 2);
        let bind = scan
            .bind(BindInput::new("Server=localhost;Database=Sales", "EVALUATE Customer"))
            .unwrap();
        let mut state = scan.init(&bind, Some(&[0, 1][..])).unwrap();

        let err = scan
            .scan(&mut state, &mut DataChunk::new(vec![], 16))
            .unwrap_err();
        assert!(err.is_contract());
        let err = scan
            .scan(
                &mut state,
                &mut DataChunk::new(vec![LogicalType::Integer, LogicalType::Varchar], 0),
            )
            .unwrap_err();
        assert!(err.is_contract());

        let mut chunk = state.new_chunk();
        assert_eq!(scan.scan(&mut state, &mut chunk).unwrap(), 2);
        state.close();
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let provider = provider();
        let bind = scan_over(&provider, 2)
            .bind(BindInput::new("Server=localhost;Database=Sales", "EVALUATE Customer"))
            .unwrap();
        let err = scan_over(&provider, 0).init(&bind, None).unwrap_err();
        assert!(matches!(err, MsolapError::Config(_)));
        assert!(provider.ledger().is_balanced());
    }

    #[test]
    fn test_describe_masks_secrets() {
        let provider = provider();
        let scan = scan_over(&provider, 2);
        let bind = BindData {
            connection_string: "Server=x;User ID=u;Password=secret".to_string(),
            query: "EVALUATE T".to_string(),
            timeout_seconds: 60,
            names: vec![],
            types: vec![],
        };
        assert_eq!(
            scan.describe(&bind),
            vec![
                ("Connection".to_string(), "Server=x;User ID=u;Password=***".to_string()),
                ("Query".to_string(), "EVALUATE T".to_string()),
            ]
        );
    }
}
