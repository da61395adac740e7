//! Packed calendar timestamps and OLE automation dates.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Size of a packed timestamp in the row buffer.
pub const PACKED_TIMESTAMP_SIZE: usize = 16;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Valid OLE automation date range (0100-01-01 ..= 9999-12-31 23:59:59).
const OLE_DATE_MIN: f64 = -657_434.0;
const OLE_DATE_MAX: f64 = 2_958_466.0;

/// Seven-field calendar timestamp as laid out by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbTimestamp {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    /// Billionths of a second.
    pub fraction: u32,
}

impl DbTimestamp {
    /// Decode from the 16-byte little-endian layout.
    pub fn from_bytes(bytes: &[u8; PACKED_TIMESTAMP_SIZE]) -> Self {
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        Self {
            year: i16::from_le_bytes([bytes[0], bytes[1]]),
            month: u16_at(2),
            day: u16_at(4),
            hour: u16_at(6),
            minute: u16_at(8),
            second: u16_at(10),
            fraction: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; PACKED_TIMESTAMP_SIZE] {
        let mut out = [0u8; PACKED_TIMESTAMP_SIZE];
        out[0..2].copy_from_slice(&self.year.to_le_bytes());
        out[2..4].copy_from_slice(&self.month.to_le_bytes());
        out[4..6].copy_from_slice(&self.day.to_le_bytes());
        out[6..8].copy_from_slice(&self.hour.to_le_bytes());
        out[8..10].copy_from_slice(&self.minute.to_le_bytes());
        out[10..12].copy_from_slice(&self.second.to_le_bytes());
        out[12..16].copy_from_slice(&self.fraction.to_le_bytes());
        out
    }

    /// Recombine into a timestamp at second granularity.
    /// Returns `None` if any component is out of range.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?;
        let time = NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)?;
        Some(NaiveDateTime::new(date, time))
    }

    pub fn from_naive(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year() as i16,
            month: ts.month() as u16,
            day: ts.day() as u16,
            hour: ts.hour() as u16,
            minute: ts.minute() as u16,
            second: ts.second() as u16,
            fraction: ts.nanosecond() % 1_000_000_000,
        }
    }
}

/// The zero-epoch timestamp used for malformed input.
pub fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

fn ole_base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_else(epoch)
}

/// Convert an OLE automation date (days since 1899-12-30) to a timestamp,
/// rounded to the nearest second.
///
/// The integer part is the signed day offset; the fractional part is always
/// the time of day, even for negative dates.
pub fn ole_date_to_naive(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() || !(OLE_DATE_MIN..OLE_DATE_MAX).contains(&value) {
        return None;
    }
    let days = value.trunc();
    let seconds = ((value - days).abs() * SECONDS_PER_DAY).round();
    ole_base()
        .checked_add_signed(Duration::days(days as i64))?
        .checked_add_signed(Duration::seconds(seconds as i64))
}

/// Inverse of [`ole_date_to_naive`].
pub fn naive_to_ole_date(ts: &NaiveDateTime) -> f64 {
    let base = ole_base();
    let days = (ts.date() - base.date()).num_days() as f64;
    let fraction = ts.time().num_seconds_from_midnight() as f64 / SECONDS_PER_DAY;
    if days >= 0.0 {
        days + fraction
    } else {
        days - fraction
    }
}
