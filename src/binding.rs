//! Column binding planner and the row buffer layout.
//!
//! Every column gets one contiguous region in a single shared row buffer:
//!
//! ```text
//! region ─┬─ +0   status  u32 (+4 pad)
//!         ├─ +8   length  u64
//!         └─ +16  payload (plan-tag size, rounded up to 8)
//! ```
//!
//! | Plan tag          | Bound as      | Payload                               |
//! |-------------------|---------------|---------------------------------------|
//! | `Integer64`       | `I8`          | i64                                   |
//! | `Float64`         | `R8`          | f64                                   |
//! | `Boolean`         | `BOOL`        | i16, `-1` is true                     |
//! | `FixedWideString` | `WSTR`        | 4096 UTF-16 units, NUL-terminated     |
//! | `PackedTimestamp` | `DBTIMESTAMP` | 16-byte calendar timestamp            |
//! | `TaggedUnion`     | `VARIANT`     | 16-byte self-describing value         |

use chrono::NaiveDateTime;

use crate::provider::{Binding, ColumnInfo, ColumnStatus, DbType};
use crate::types::temporal::{self, DbTimestamp, PACKED_TIMESTAMP_SIZE};
use crate::types::{self, LogicalType, TaggedValue};

/// Capacity of an inline wide string in UTF-16 code units, terminator included.
pub const WIDE_STRING_CAPACITY: usize = 4096;

/// Size of a tagged value in the row buffer.
pub const TAGGED_VALUE_SIZE: usize = 16;

const STATUS_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 8;
const VALUE_OFFSET: usize = 16;

const VARIANT_TRUE: i16 = -1;
const DECIMAL_NEGATIVE: u8 = 0x80;

/// Buffer layout chosen for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanTag {
    Integer64,
    Float64,
    Boolean,
    FixedWideString,
    PackedTimestamp,
    TaggedUnion,
}

impl PlanTag {
    pub fn for_native(db_type: DbType) -> Self {
        if db_type.is_integer() {
            PlanTag::Integer64
        } else if db_type.is_fractional() {
            PlanTag::Float64
        } else if db_type == DbType::Bool {
            PlanTag::Boolean
        } else if db_type.is_temporal() {
            PlanTag::PackedTimestamp
        } else if db_type.is_wide_string() {
            PlanTag::FixedWideString
        } else {
            PlanTag::TaggedUnion
        }
    }

    /// Type the provider is asked to convert into.
    pub fn bind_type(self) -> DbType {
        match self {
            PlanTag::Integer64 => DbType::I8,
            PlanTag::Float64 => DbType::R8,
            PlanTag::Boolean => DbType::Bool,
            PlanTag::FixedWideString => DbType::WStr,
            PlanTag::PackedTimestamp => DbType::DbTimestamp,
            PlanTag::TaggedUnion => DbType::Variant,
        }
    }

    /// Payload capacity in bytes.
    pub fn payload_size(self) -> usize {
        match self {
            PlanTag::Integer64 | PlanTag::Float64 => 8,
            PlanTag::Boolean => 2,
            PlanTag::FixedWideString => WIDE_STRING_CAPACITY * 2,
            PlanTag::PackedTimestamp => PACKED_TIMESTAMP_SIZE,
            PlanTag::TaggedUnion => TAGGED_VALUE_SIZE,
        }
    }

    /// Bytes one column of this tag occupies in the row buffer.
    pub fn region_size(self) -> usize {
        VALUE_OFFSET + align8(self.payload_size())
    }
}

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Column metadata after naming and type mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Provider ordinal.
    pub ordinal: usize,
    pub db_type: DbType,
    pub raw_name: Option<String>,
    /// Normalized short name.
    pub name: String,
    pub logical_type: LogicalType,
}

impl ColumnSpec {
    /// `index` is the 0-based position in the result, used for unnamed columns.
    pub fn from_info(index: usize, info: &ColumnInfo) -> Self {
        Self {
            ordinal: info.ordinal,
            db_type: info.db_type,
            raw_name: info.name.clone(),
            name: normalize_name(info.name.as_deref(), index),
            logical_type: LogicalType::from_native(info.db_type),
        }
    }
}

/// `Customer[CustomerKey]` becomes `CustomerKey`; other names have characters
/// outside `[A-Za-z0-9_]` replaced by `_`. Missing names become `Column_<index>`.
pub fn normalize_name(raw: Option<&str>, index: usize) -> String {
    let fallback = || format!("Column_{}", index);
    let Some(raw) = raw else {
        return fallback();
    };

    let bracketed = raw.find('[').and_then(|open| {
        let close = raw.find(']')?;
        (open < close).then(|| &raw[open + 1..close])
    });

    let name = match bracketed {
        Some(inner) => inner.to_string(),
        None => raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect(),
    };

    if name.is_empty() { fallback() } else { name }
}

/// One planned column: its spec, region offset and tag.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedColumn {
    pub spec: ColumnSpec,
    pub offset: usize,
    pub tag: PlanTag,
}

impl PlannedColumn {
    pub fn status_offset(&self) -> usize {
        self.offset + STATUS_OFFSET
    }

    pub fn length_offset(&self) -> usize {
        self.offset + LENGTH_OFFSET
    }

    pub fn value_offset(&self) -> usize {
        self.offset + VALUE_OFFSET
    }

    pub fn binding(&self) -> Binding {
        Binding {
            ordinal: self.spec.ordinal,
            value_offset: self.value_offset(),
            length_offset: self.length_offset(),
            status_offset: self.status_offset(),
            max_len: self.tag.payload_size(),
            db_type: self.tag.bind_type(),
        }
    }
}

/// Immutable per-query layout of the row buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingPlan {
    columns: Vec<PlannedColumn>,
    row_size: usize,
}

impl BindingPlan {
    pub fn new(infos: &[ColumnInfo]) -> Self {
        let mut offset = 0;
        let columns = infos
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let spec = ColumnSpec::from_info(index, info);
                let tag = PlanTag::for_native(spec.db_type);
                let planned = PlannedColumn { spec, offset, tag };
                offset += tag.region_size();
                planned
            })
            .collect();
        Self {
            columns,
            row_size: offset,
        }
    }

    pub fn columns(&self) -> &[PlannedColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&PlannedColumn> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Total buffer bytes per row.
    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.columns.iter().map(PlannedColumn::binding).collect()
    }
}

/// The provider's self-describing value as carried in a `TaggedUnion` region.
///
/// ```text
/// +0 vt u16 | +2 scale u8 | +3 sign u8 | +4 aux u32 | +8 payload u64
/// ```
///
/// Decimals keep their high 32 mantissa bits in `aux`; strings live in the
/// buffer's side heap with their index in `aux`.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Empty,
    Null,
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    R4(f32),
    R8(f64),
    /// Ten-thousandths.
    Cy(i64),
    /// 96-bit mantissa scaled by `10^-scale`.
    Decimal {
        scale: u8,
        negative: bool,
        mantissa: u128,
    },
    Bool(bool),
    /// OLE automation date.
    Date(f64),
    Bstr(String),
    /// Any other tag; payload is opaque.
    Other(u16),
}

impl Variant {
    pub fn tag(&self) -> DbType {
        match self {
            Variant::Empty => DbType::Empty,
            Variant::Null => DbType::Null,
            Variant::I1(_) => DbType::I1,
            Variant::I2(_) => DbType::I2,
            Variant::I4(_) => DbType::I4,
            Variant::I8(_) => DbType::I8,
            Variant::UI1(_) => DbType::UI1,
            Variant::UI2(_) => DbType::UI2,
            Variant::UI4(_) => DbType::UI4,
            Variant::UI8(_) => DbType::UI8,
            Variant::R4(_) => DbType::R4,
            Variant::R8(_) => DbType::R8,
            Variant::Cy(_) => DbType::Cy,
            Variant::Decimal { .. } => DbType::Decimal,
            Variant::Bool(_) => DbType::Bool,
            Variant::Date(_) => DbType::Date,
            Variant::Bstr(_) => DbType::Bstr,
            Variant::Other(vt) => DbType::from_code(*vt),
        }
    }

    /// Decode into the closed value set used by conversion.
    pub fn to_tagged(&self) -> TaggedValue {
        match self {
            Variant::Empty | Variant::Null => TaggedValue::Null,
            Variant::I1(v) => TaggedValue::Integer(*v as i64),
            Variant::I2(v) => TaggedValue::Integer(*v as i64),
            Variant::I4(v) => TaggedValue::Integer(*v as i64),
            Variant::I8(v) => TaggedValue::Integer(*v),
            Variant::UI1(v) => TaggedValue::Integer(*v as i64),
            Variant::UI2(v) => TaggedValue::Integer(*v as i64),
            Variant::UI4(v) => TaggedValue::Integer(*v as i64),
            Variant::UI8(v) => TaggedValue::Integer(*v as i64),
            Variant::R4(v) => TaggedValue::Float(*v as f64),
            Variant::R8(v) => TaggedValue::Float(*v),
            Variant::Cy(v) => TaggedValue::Float(types::currency_to_f64(*v)),
            Variant::Decimal {
                scale,
                negative,
                mantissa,
            } => {
                let magnitude = *mantissa as f64 / 10f64.powi(*scale as i32);
                TaggedValue::Float(if *negative { -magnitude } else { magnitude })
            }
            Variant::Bool(v) => TaggedValue::Boolean(*v),
            Variant::Date(v) => {
                TaggedValue::Timestamp(temporal::ole_date_to_naive(*v).unwrap_or_else(temporal::epoch))
            }
            Variant::Bstr(s) => TaggedValue::String(s.clone()),
            Variant::Other(vt) => TaggedValue::Unsupported(*vt),
        }
    }
}

/// Shared row buffer filled by the provider through an accessor.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    bytes: Vec<u8>,
    heap: Vec<String>,
}

impl RowBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            heap: Vec::new(),
        }
    }

    /// Zero the buffer and drop out-of-line strings from the previous row.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn read<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(src) = self.bytes.get(offset..offset + N) {
            out.copy_from_slice(src);
        }
        out
    }

    fn write(&mut self, offset: usize, src: &[u8]) {
        if let Some(dst) = self.bytes.get_mut(offset..offset + src.len()) {
            dst.copy_from_slice(src);
        }
    }

    pub fn status(&self, offset: usize) -> ColumnStatus {
        ColumnStatus::from_code(u32::from_le_bytes(self.read(offset)))
    }

    pub fn set_status(&mut self, offset: usize, status: ColumnStatus) {
        self.write(offset, &status.code().to_le_bytes());
    }

    pub fn length(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.read(offset))
    }

    pub fn set_length(&mut self, offset: usize, length: u64) {
        self.write(offset, &length.to_le_bytes());
    }

    pub fn read_i64(&self, offset: usize) -> i64 {
        i64::from_le_bytes(self.read(offset))
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.write(offset, &value.to_le_bytes());
    }

    pub fn read_f64(&self, offset: usize) -> f64 {
        f64::from_le_bytes(self.read(offset))
    }

    pub fn write_f64(&mut self, offset: usize, value: f64) {
        self.write(offset, &value.to_le_bytes());
    }

    /// Any non-zero value is true.
    pub fn read_bool(&self, offset: usize) -> bool {
        i16::from_le_bytes(self.read(offset)) != 0
    }

    pub fn write_bool(&mut self, offset: usize, value: bool) {
        let raw: i16 = if value { VARIANT_TRUE } else { 0 };
        self.write(offset, &raw.to_le_bytes());
    }

    /// Read a NUL-terminated wide string of at most `max_len` bytes.
    pub fn read_wide(&self, offset: usize, max_len: usize) -> String {
        let units: Vec<u16> = self
            .bytes
            .get(offset..offset + max_len)
            .unwrap_or_default()
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|unit| *unit != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }

    /// Write `value` as UTF-16 into `max_len` bytes, truncating to leave room
    /// for the terminator. Returns the status and the untruncated byte length.
    pub fn write_wide(&mut self, offset: usize, max_len: usize, value: &str) -> (ColumnStatus, u64) {
        let units: Vec<u16> = value.encode_utf16().collect();
        let full_len = (units.len() * 2) as u64;
        let capacity = (max_len / 2).saturating_sub(1);
        let (kept, status) = if units.len() > capacity {
            (&units[..capacity], ColumnStatus::Truncated)
        } else {
            (&units[..], ColumnStatus::Ok)
        };

        let mut encoded: Vec<u8> = kept.iter().flat_map(|u| u.to_le_bytes()).collect();
        encoded.extend_from_slice(&[0, 0]);
        self.write(offset, &encoded);
        (status, full_len)
    }

    pub fn read_timestamp(&self, offset: usize) -> DbTimestamp {
        DbTimestamp::from_bytes(&self.read(offset))
    }

    pub fn write_timestamp(&mut self, offset: usize, value: &DbTimestamp) {
        self.write(offset, &value.to_bytes());
    }

    /// Convenience for a packed timestamp already recombined.
    pub fn read_naive(&self, offset: usize) -> Option<NaiveDateTime> {
        self.read_timestamp(offset).to_naive()
    }

    pub fn read_variant(&self, offset: usize) -> Variant {
        let vt = u16::from_le_bytes(self.read(offset));
        let scale = self.read::<1>(offset + 2)[0];
        let sign = self.read::<1>(offset + 3)[0];
        let aux = u32::from_le_bytes(self.read(offset + 4));
        let raw: [u8; 8] = self.read(offset + 8);
        let payload = u64::from_le_bytes(raw);

        match DbType::from_code(vt) {
            DbType::Empty => Variant::Empty,
            DbType::Null => Variant::Null,
            DbType::I1 => Variant::I1(raw[0] as i8),
            DbType::I2 => Variant::I2(i16::from_le_bytes([raw[0], raw[1]])),
            DbType::I4 => Variant::I4(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            DbType::I8 => Variant::I8(payload as i64),
            DbType::UI1 => Variant::UI1(raw[0]),
            DbType::UI2 => Variant::UI2(u16::from_le_bytes([raw[0], raw[1]])),
            DbType::UI4 => Variant::UI4(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            DbType::UI8 => Variant::UI8(payload),
            DbType::R4 => Variant::R4(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
            DbType::R8 => Variant::R8(f64::from_le_bytes(raw)),
            DbType::Cy => Variant::Cy(payload as i64),
            DbType::Decimal => Variant::Decimal {
                scale,
                negative: sign & DECIMAL_NEGATIVE != 0,
                mantissa: ((aux as u128) << 64) | payload as u128,
            },
            DbType::Bool => Variant::Bool(i16::from_le_bytes([raw[0], raw[1]]) != 0),
            DbType::Date => Variant::Date(f64::from_le_bytes(raw)),
            DbType::Bstr => Variant::Bstr(self.heap.get(aux as usize).cloned().unwrap_or_default()),
            _ => Variant::Other(vt),
        }
    }

    pub fn write_variant(&mut self, offset: usize, value: &Variant) {
        let mut out = [0u8; TAGGED_VALUE_SIZE];
        out[0..2].copy_from_slice(&value.tag().code().to_le_bytes());
        let payload: [u8; 8] = match value {
            Variant::Empty | Variant::Null | Variant::Other(_) => [0; 8],
            Variant::I1(v) => (*v as i64).to_le_bytes(),
            Variant::I2(v) => (*v as i64).to_le_bytes(),
            Variant::I4(v) => (*v as i64).to_le_bytes(),
            Variant::I8(v) => v.to_le_bytes(),
            Variant::UI1(v) => (*v as u64).to_le_bytes(),
            Variant::UI2(v) => (*v as u64).to_le_bytes(),
            Variant::UI4(v) => (*v as u64).to_le_bytes(),
            Variant::UI8(v) => v.to_le_bytes(),
            Variant::R4(v) => {
                let mut raw = [0u8; 8];
                raw[0..4].copy_from_slice(&v.to_le_bytes());
                raw
            }
            Variant::R8(v) | Variant::Date(v) => v.to_le_bytes(),
            Variant::Cy(v) => v.to_le_bytes(),
            Variant::Decimal {
                scale,
                negative,
                mantissa,
            } => {
                out[2] = *scale;
                out[3] = if *negative { DECIMAL_NEGATIVE } else { 0 };
                out[4..8].copy_from_slice(&((*mantissa >> 64) as u32).to_le_bytes());
                (*mantissa as u64).to_le_bytes()
            }
            Variant::Bool(v) => {
                let raw: i64 = if *v { VARIANT_TRUE as i64 } else { 0 };
                raw.to_le_bytes()
            }
            Variant::Bstr(s) => {
                out[4..8].copy_from_slice(&(self.heap.len() as u32).to_le_bytes());
                self.heap.push(s.clone());
                [0; 8]
            }
        };
        out[8..16].copy_from_slice(&payload);
        self.write(offset, &out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn info(ordinal: usize, name: &str, db_type: DbType) -> ColumnInfo {
        ColumnInfo {
            ordinal,
            name: Some(name.to_string()),
            db_type,
        }
    }

    #[test]
    fn test_plan_tag_selection() {
        assert_eq!(PlanTag::for_native(DbType::UI1), PlanTag::Integer64);
        assert_eq!(PlanTag::for_native(DbType::Cy), PlanTag::Float64);
        assert_eq!(PlanTag::for_native(DbType::Numeric), PlanTag::Float64);
        assert_eq!(PlanTag::for_native(DbType::Bool), PlanTag::Boolean);
        assert_eq!(PlanTag::for_native(DbType::FileTime), PlanTag::PackedTimestamp);
        assert_eq!(PlanTag::for_native(DbType::Bstr), PlanTag::FixedWideString);
        assert_eq!(PlanTag::for_native(DbType::Str), PlanTag::TaggedUnion);
        assert_eq!(PlanTag::for_native(DbType::VarNumeric), PlanTag::TaggedUnion);
        assert_eq!(PlanTag::for_native(DbType::Other(4000)), PlanTag::TaggedUnion);
    }

    #[test]
    fn test_region_sizes() {
        assert_eq!(PlanTag::Integer64.region_size(), 24);
        assert_eq!(PlanTag::Boolean.region_size(), 24);
        assert_eq!(PlanTag::PackedTimestamp.region_size(), 32);
        assert_eq!(PlanTag::TaggedUnion.region_size(), 32);
        assert_eq!(PlanTag::FixedWideString.region_size(), 16 + 8192);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(Some("Customer[CustomerKey]"), 0), "CustomerKey");
        assert_eq!(normalize_name(Some("[Measures].[Total]"), 0), "Measures");
        assert_eq!(normalize_name(Some("Total Sales$"), 0), "Total_Sales_");
        assert_eq!(normalize_name(None, 3), "Column_3");
        assert_eq!(normalize_name(Some("T[]"), 2), "Column_2");
        assert_eq!(normalize_name(Some("a]b[c"), 0), "a_b_c");
    }

    #[test]
    fn test_plan_regions_disjoint() {
        let infos = vec![
            info(1, "A", DbType::I4),
            info(2, "B", DbType::WStr),
            info(5, "C", DbType::DbTimestamp),
            info(6, "D", DbType::Variant),
            info(7, "E", DbType::Bool),
        ];
        let plan = BindingPlan::new(&infos);
        let expected: usize = plan.columns().iter().map(|c| c.tag.region_size()).sum();
        assert_eq!(plan.row_size(), expected);

        let mut ranges: Vec<(usize, usize)> = plan
            .columns()
            .iter()
            .map(|c| (c.offset, c.offset + c.tag.region_size()))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0);
        }

        let bindings = plan.bindings();
        assert_eq!(bindings[2].ordinal, 5);
        assert_eq!(bindings[1].db_type, DbType::WStr);
        assert_eq!(bindings[1].max_len, WIDE_STRING_CAPACITY * 2);
    }

    #[test]
    fn test_wide_mixed_plan_regions_disjoint() {
        let natives = [
            DbType::I4,
            DbType::R8,
            DbType::Bool,
            DbType::WStr,
            DbType::DbTimestamp,
            DbType::Variant,
        ];
        let infos: Vec<ColumnInfo> = (0..1024)
            .map(|i| info(1 + i * 3, &format!("T[C{}]", i), natives[i % natives.len()]))
            .collect();
        let plan = BindingPlan::new(&infos);
        assert_eq!(plan.len(), 1024);

        let expected: usize = plan.columns().iter().map(|c| c.tag.region_size()).sum();
        assert_eq!(plan.row_size(), expected);
        for tag in [
            PlanTag::Integer64,
            PlanTag::Float64,
            PlanTag::Boolean,
            PlanTag::FixedWideString,
            PlanTag::PackedTimestamp,
            PlanTag::TaggedUnion,
        ] {
            assert!(plan.columns().iter().any(|c| c.tag == tag), "{:?}", tag);
        }

        let mut ranges: Vec<(usize, usize)> = plan
            .columns()
            .iter()
            .map(|c| {
                let end = c.offset + c.tag.region_size();
                assert!(c.status_offset() >= c.offset && c.status_offset() + 4 <= end);
                assert!(c.length_offset() + 8 <= c.value_offset());
                assert!(c.value_offset() + c.tag.payload_size() <= end);
                (c.offset, end)
            })
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
        assert_eq!(ranges.last().map(|r| r.1), Some(plan.row_size()));

        let ordinals: Vec<usize> = plan.bindings().iter().map(|b| b.ordinal).collect();
        assert_eq!(ordinals[..3].to_vec(), vec![1, 4, 7]);
        assert_eq!(ordinals[1023], 1 + 1023 * 3);
    }

    #[test]
    fn test_empty_plan() {
        let plan = BindingPlan::new(&[]);
        assert!(plan.is_empty());
        assert_eq!(plan.row_size(), 0);
        assert!(plan.bindings().is_empty());
    }

    #[test]
    fn test_wide_string_truncation() {
        let mut buf = RowBuffer::new(64);
        let (status, len) = buf.write_wide(0, 8, "abcdef");
        assert_eq!(status, ColumnStatus::Truncated);
        assert_eq!(len, 12);
        assert_eq!(buf.read_wide(0, 8), "abc");

        let (status, _) = buf.write_wide(16, 16, "héllo");
        assert_eq!(status, ColumnStatus::Ok);
        assert_eq!(buf.read_wide(16, 16), "héllo");
    }

    #[test]
    fn test_variant_layouts() {
        let mut buf = RowBuffer::new(TAGGED_VALUE_SIZE * 4);
        buf.write_variant(0, &Variant::Cy(123_456));
        buf.write_variant(16, &Variant::Bstr("hello".into()));
        buf.write_variant(
            32,
            &Variant::Decimal {
                scale: 2,
                negative: true,
                mantissa: 12_345,
            },
        );
        buf.write_variant(48, &Variant::Other(72));

        assert_eq!(buf.read_variant(0).to_tagged(), TaggedValue::Float(12.3456));
        assert_eq!(buf.read_variant(16).to_tagged(), TaggedValue::String("hello".into()));
        assert_eq!(buf.read_variant(32).to_tagged(), TaggedValue::Float(-123.45));
        assert_eq!(buf.read_variant(48).to_tagged(), TaggedValue::Unsupported(72));

        buf.clear();
        assert_eq!(buf.read_variant(16), Variant::Empty);
    }

    #[test]
    fn test_variant_date_malformed_is_epoch() {
        let mut buf = RowBuffer::new(TAGGED_VALUE_SIZE);
        buf.write_variant(0, &Variant::Date(f64::INFINITY));
        assert_eq!(
            buf.read_variant(0).to_tagged(),
            TaggedValue::Timestamp(temporal::epoch())
        );
    }

    #[test]
    fn test_out_of_bounds_reads_are_zero() {
        let buf = RowBuffer::new(4);
        assert_eq!(buf.read_i64(0), 0);
        assert_eq!(buf.status(100), ColumnStatus::Ok);
    }
}
