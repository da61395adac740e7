//! Forward-only row cursor over one executed command.
//!
//! ```text
//! Unexecuted ─execute─▶ ExecutedNoRow ─step─▶ ExecutedHasRow ─step (end)─▶ Exhausted
//!      │                     │                    │  ▲  │                      │
//!      │                     │                    └─step┘                      │
//!      └─────────────────────┴──────────── close ─┴────────────────────────────┴─▶ Closed
//! ```
//!
//! The cursor owns the command, the rowset, the accessor and at most one row
//! handle. Only one row is materialized at a time in the shared buffer.

use chrono::NaiveDateTime;

use crate::binding::{BindingPlan, ColumnSpec, PlanTag, PlannedColumn, RowBuffer, Variant};
use crate::error::{MsolapError, MsolapResult};
use crate::provider::{AccessorHandle, ColumnInfo, ColumnStatus, Command, RowHandle, Rowset};
use crate::types::temporal;
use crate::types::{LogicalType, TaggedValue, Value, convert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unexecuted,
    ExecutedNoRow,
    ExecutedHasRow,
    Exhausted,
    Closed,
}

pub struct RowCursor {
    command: Option<Box<dyn Command>>,
    rowset: Option<Box<dyn Rowset>>,
    columns: Vec<ColumnInfo>,
    plan: BindingPlan,
    buffer: RowBuffer,
    accessor: Option<AccessorHandle>,
    row: Option<RowHandle>,
    state: CursorState,
}

impl RowCursor {
    pub fn new(command: Box<dyn Command>, rowset: Box<dyn Rowset>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            command: Some(command),
            rowset: Some(rowset),
            columns,
            plan: BindingPlan::default(),
            buffer: RowBuffer::default(),
            accessor: None,
            row: None,
            state: CursorState::Unexecuted,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Raw provider metadata.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Normalized names and logical types; available before `execute`.
    pub fn column_specs(&self) -> Vec<ColumnSpec> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, info)| ColumnSpec::from_info(i, info))
            .collect()
    }

    /// Empty until `execute`.
    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    pub fn plan_tag(&self, column: usize) -> Option<PlanTag> {
        self.plan.column(column).map(|c| c.tag)
    }

    /// Build the binding plan and accessor. Idempotent.
    pub fn execute(&mut self) -> MsolapResult<()> {
        match self.state {
            CursorState::Closed => return Err(MsolapError::contract("Cursor is closed")),
            CursorState::Unexecuted => {}
            _ => return Ok(()),
        }

        let plan = BindingPlan::new(&self.columns);
        if !plan.is_empty() {
            let rowset = self
                .rowset
                .as_mut()
                .ok_or_else(|| MsolapError::contract("Cursor has no rowset"))?;
            let accessor = rowset
                .create_accessor(&plan.bindings(), plan.row_size())
                .map_err(|e| MsolapError::protocol("Failed to create accessor", &e))?;
            self.accessor = Some(accessor);
        }
        tracing::debug!(
            "Binding plan: {} columns, {} bytes per row",
            plan.len(),
            plan.row_size()
        );

        self.buffer = RowBuffer::new(plan.row_size());
        self.plan = plan;
        self.state = CursorState::ExecutedNoRow;
        Ok(())
    }

    /// Advance to the next row. Returns `false` once the rowset is exhausted,
    /// and keeps returning `false` without asking the provider again.
    pub fn step(&mut self) -> MsolapResult<bool> {
        match self.state {
            CursorState::Closed => return Err(MsolapError::contract("Cursor is closed")),
            CursorState::Exhausted => return Ok(false),
            CursorState::Unexecuted => self.execute()?,
            CursorState::ExecutedNoRow | CursorState::ExecutedHasRow => {}
        }

        self.release_row();
        self.state = CursorState::ExecutedNoRow;

        let rowset = self
            .rowset
            .as_mut()
            .ok_or_else(|| MsolapError::contract("Cursor has no rowset"))?;
        let row = match rowset.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.state = CursorState::Exhausted;
                return Ok(false);
            }
            Err(e) => return Err(MsolapError::data("Failed to fetch row", &e)),
        };

        self.row = Some(row);
        self.buffer.clear();
        if let Some(accessor) = self.accessor
            && let Err(e) = rowset.get_data(row, accessor, &mut self.buffer)
        {
            rowset.release_row(row);
            self.row = None;
            return Err(MsolapError::data("Failed to read row data", &e));
        }

        tracing::trace!("Fetched row {:?}", row);
        self.state = CursorState::ExecutedHasRow;
        Ok(true)
    }

    fn release_row(&mut self) {
        if let (Some(row), Some(rowset)) = (self.row.take(), self.rowset.as_mut()) {
            rowset.release_row(row);
        }
    }

    fn current(&self, column: usize) -> MsolapResult<(&PlannedColumn, ColumnStatus)> {
        if self.state != CursorState::ExecutedHasRow {
            return Err(MsolapError::contract("No current row"));
        }
        let planned = self.plan.column(column).ok_or_else(|| {
            MsolapError::contract(format!(
                "Column index {} out of range ({} columns)",
                column,
                self.plan.len()
            ))
        })?;
        Ok((planned, self.buffer.status(planned.status_offset())))
    }

    /// The column if it is bound as `tag` and holds a value.
    fn typed(&self, column: usize, tag: PlanTag) -> MsolapResult<Option<&PlannedColumn>> {
        let (planned, status) = self.current(column)?;
        if planned.tag != tag {
            return Err(MsolapError::contract(format!(
                "Column {} is bound as {:?}, not {:?}",
                column, planned.tag, tag
            )));
        }
        Ok(status.has_value().then_some(planned))
    }

    pub fn is_null(&self, column: usize) -> MsolapResult<bool> {
        let (planned, status) = self.current(column)?;
        if !status.has_value() {
            return Ok(true);
        }
        Ok(planned.tag == PlanTag::TaggedUnion
            && matches!(
                self.buffer.read_variant(planned.value_offset()),
                Variant::Null | Variant::Empty
            ))
    }

    pub fn get_integer(&self, column: usize) -> MsolapResult<Option<i64>> {
        Ok(self
            .typed(column, PlanTag::Integer64)?
            .map(|c| self.buffer.read_i64(c.value_offset())))
    }

    pub fn get_float(&self, column: usize) -> MsolapResult<Option<f64>> {
        Ok(self
            .typed(column, PlanTag::Float64)?
            .map(|c| self.buffer.read_f64(c.value_offset())))
    }

    pub fn get_boolean(&self, column: usize) -> MsolapResult<Option<bool>> {
        Ok(self
            .typed(column, PlanTag::Boolean)?
            .map(|c| self.buffer.read_bool(c.value_offset())))
    }

    /// Strings longer than the inline capacity come back truncated.
    pub fn get_string(&self, column: usize) -> MsolapResult<Option<String>> {
        Ok(self
            .typed(column, PlanTag::FixedWideString)?
            .map(|c| self.buffer.read_wide(c.value_offset(), c.tag.payload_size())))
    }

    /// Malformed calendar fields yield the zero epoch.
    pub fn get_timestamp(&self, column: usize) -> MsolapResult<Option<NaiveDateTime>> {
        Ok(self.typed(column, PlanTag::PackedTimestamp)?.map(|c| {
            self.buffer
                .read_naive(c.value_offset())
                .unwrap_or_else(temporal::epoch)
        }))
    }

    /// Read any column as `target`, converting as needed.
    pub fn get_value(&self, column: usize, target: LogicalType) -> MsolapResult<Value> {
        let (planned, status) = self.current(column)?;
        if !status.has_value() {
            return Ok(Value::Null);
        }
        let offset = planned.value_offset();
        let tagged = match planned.tag {
            PlanTag::Integer64 => TaggedValue::Integer(self.buffer.read_i64(offset)),
            PlanTag::Float64 => TaggedValue::Float(self.buffer.read_f64(offset)),
            PlanTag::Boolean => TaggedValue::Boolean(self.buffer.read_bool(offset)),
            PlanTag::FixedWideString => {
                TaggedValue::String(self.buffer.read_wide(offset, planned.tag.payload_size()))
            }
            PlanTag::PackedTimestamp => TaggedValue::Timestamp(
                self.buffer
                    .read_naive(offset)
                    .unwrap_or_else(temporal::epoch),
            ),
            PlanTag::TaggedUnion => self.buffer.read_variant(offset).to_tagged(),
        };
        Ok(convert(&tagged, target))
    }

    /// Release the held row, the accessor, the buffers, the rowset and the
    /// command, in that order. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        self.release_row();
        if let (Some(accessor), Some(rowset)) = (self.accessor.take(), self.rowset.as_mut()) {
            rowset.release_accessor(accessor);
        }
        self.plan = BindingPlan::default();
        self.buffer = RowBuffer::default();
        self.columns.clear();
        self.rowset = None;
        self.command = None;
        self.state = CursorState::Closed;
        tracing::debug!("Cursor closed");
    }
}

impl Drop for RowCursor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("state", &self.state)
            .field("columns", &self.columns.len())
            .field("row_size", &self.plan.row_size())
            .finish()
    }
}
