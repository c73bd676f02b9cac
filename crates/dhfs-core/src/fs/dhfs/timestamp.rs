//! DHFS packed date-time codec
//!
//! Descriptors and superblocks store date-times as a 32-bit bit-field, packed
//! MSB-first:
//!
//! | field  | width | last bit |
//! |--------|-------|----------|
//! | year   | 6     | 31       |
//! | month  | 4     | 25       |
//! | day    | 5     | 21       |
//! | hour   | 5     | 16       |
//! | minute | 6     | 11       |
//! | second | 6     | 5        |
//!
//! The year is an offset from 2000. Nothing is validated: values that are not
//! calendar-valid decode as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

const YEAR: (u32, u32) = (31, 6);
const MONTH: (u32, u32) = (25, 4);
const DAY: (u32, u32) = (21, 5);
const HOUR: (u32, u32) = (16, 5);
const MINUTE: (u32, u32) = (11, 6);
const SECOND: (u32, u32) = (5, 6);

/// Extract the `width`-bit field whose most significant bit sits at `position`
pub fn extract_bits(raw: u32, position: u32, width: u32) -> u32 {
    (raw >> (position + 1 - width)) & ((1u32 << width) - 1)
}

fn insert_bits(value: u32, (position, width): (u32, u32)) -> u32 {
    (value & ((1u32 << width) - 1)) << (position + 1 - width)
}

fn field(raw: u32, (position, width): (u32, u32)) -> u8 {
    extract_bits(raw, position, width) as u8
}

/// A decoded DHFS timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DhfsTimestamp {
    /// Years since 2000
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DhfsTimestamp {
    pub fn decode(raw: u32) -> Self {
        Self {
            year: field(raw, YEAR),
            month: field(raw, MONTH),
            day: field(raw, DAY),
            hour: field(raw, HOUR),
            minute: field(raw, MINUTE),
            second: field(raw, SECOND),
        }
    }

    /// Pack the fields back into the on-disk word. Bits 0..=5 carry the
    /// seconds; every bit of the word belongs to exactly one field.
    pub fn encode(&self) -> u32 {
        insert_bits(self.year as u32, YEAR)
            | insert_bits(self.month as u32, MONTH)
            | insert_bits(self.day as u32, DAY)
            | insert_bits(self.hour as u32, HOUR)
            | insert_bits(self.minute as u32, MINUTE)
            | insert_bits(self.second as u32, SECOND)
    }

    pub fn full_year(&self) -> u16 {
        2000 + self.year as u16
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        format!("{}-{:02}-{:02}", self.full_year(), self.month, self.day)
    }

    /// `HH:MM:SS`
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    /// `YYYYMMDD`, as used in output file names
    pub fn compact_date(&self) -> String {
        format!("{}{:02}{:02}", self.full_year(), self.month, self.day)
    }

    /// `HHMMSS`, as used in output file names
    pub fn compact_time(&self) -> String {
        format!("{:02}{:02}{:02}", self.hour, self.minute, self.second)
    }
}

impl From<u32> for DhfsTimestamp {
    fn from(raw: u32) -> Self {
        Self::decode(raw)
    }
}

impl fmt::Display for DhfsTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date_string(), self.time_string())
    }
}
