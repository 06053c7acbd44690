//! CSV flight log.
//!
//! Each run writes to the first free `data{N}.csv` under the storage root.
//! The header names one column per channel field, prefixed by a `version`
//! column carrying the snapshot version. Values use the compact `%g` style:
//! six significant digits, no trailing zeros, exponent form only for very
//! large or very small magnitudes.

use crate::outcome::{Failure, Outcome};
use crate::sensors::MAX_READING_FIELDS;
use crate::storage::Storage;
use crate::telemetry::{ChannelLayout, TelemetrySnapshot, MAX_CHANNELS};
use alloc::string::String;
use arrayvec::ArrayString;
use core::fmt::{self, Write};
use tracing::{info, warn};

pub const DEFAULT_MAX_DATA_FILES: u32 = 1000;
pub const FALLBACK_FILE_NAME: &str = "data.csv";

const MAX_FILE_NAME: usize = 32;
const SIGNIFICANT_DIGITS: usize = 6;

// Longest value `write_general` produces, e.g. "-1.23457e-38".
const MAX_VALUE_LEN: usize = 12;
const MAX_VERSION_LEN: usize = 20;
pub const MAX_RECORD_LEN: usize = 1024;

static_assertions::const_assert!(
    MAX_RECORD_LEN >= MAX_VERSION_LEN + MAX_CHANNELS * MAX_READING_FIELDS * (MAX_VALUE_LEN + 1) + 1
);

pub type FileName = ArrayString<MAX_FILE_NAME>;
pub type Record = heapless::String<MAX_RECORD_LEN>;

/// First `data{N}.csv` with `N < limit` that does not exist yet, or
/// `fallback` when every candidate is taken.
pub fn select_file_name(storage: &impl Storage, limit: u32, fallback: &str) -> Outcome<FileName> {
    for index in 0..limit {
        let mut name = FileName::new();
        write!(name, "data{index}.csv").map_err(|_| name_too_long("data file index"))?;
        if !storage.exists(&name) {
            return Ok(name);
        }
    }

    warn!(limit, fallback, "no free data file name, overwriting fallback");
    FileName::from(fallback).map_err(|_| name_too_long(fallback))
}

fn name_too_long(name: &str) -> Failure {
    Failure::invalid_argument(alloc::format!(
        "file name {name:?} exceeds {MAX_FILE_NAME} bytes"
    ))
}

/// `version,<channel>_<field>,...` terminated by a newline.
pub fn header(layout: &[ChannelLayout]) -> String {
    let mut header = String::from("version");
    for channel in layout {
        for field in channel.fields {
            header.push(',');
            header.push_str(&channel.name);
            header.push('_');
            header.push_str(field);
        }
    }
    header.push('\n');
    header
}

/// One CSV line for `snapshot`. Channels without a reading leave their
/// columns empty so every line has the header's column count.
pub fn format_record(snapshot: &TelemetrySnapshot, layout: &[ChannelLayout]) -> Outcome<Record> {
    let overflow = |_| Failure::resource_exhausted("record exceeds the line buffer");

    let mut record = Record::new();
    write!(record, "{}", snapshot.version).map_err(overflow)?;
    for (index, channel) in layout.iter().enumerate() {
        let values = snapshot
            .reading(index)
            .map(crate::sensors::Reading::fields)
            .unwrap_or_default();
        for column in 0..channel.fields.len() {
            record.push(',').map_err(|()| fmt::Error).map_err(overflow)?;
            if let Some(value) = values.get(column) {
                write_general(&mut record, *value).map_err(overflow)?;
            }
        }
    }
    record.push('\n').map_err(|()| fmt::Error).map_err(overflow)?;
    Ok(record)
}

/// Write `value` like C's `%g`.
pub fn write_general<W: Write>(out: &mut W, value: f32) -> fmt::Result {
    let value = f64::from(value);
    if value.is_nan() {
        return out.write_str("nan");
    }
    if value.is_infinite() {
        return out.write_str(if value < 0.0 { "-inf" } else { "inf" });
    }
    if value == 0.0 {
        return out.write_str(if value.is_sign_negative() { "-0" } else { "0" });
    }

    // The exponent after rounding to the target precision picks the style.
    let mut scientific = ArrayString::<32>::new();
    write!(scientific, "{:.*e}", SIGNIFICANT_DIGITS - 1, value)?;
    let (mantissa, exponent) = scientific.split_once('e').ok_or(fmt::Error)?;
    let exponent: i32 = exponent.parse().map_err(|_| fmt::Error)?;

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS as i32 {
        out.write_str(strip_fraction_zeros(mantissa))?;
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(out, "e{sign}{:02}", exponent.unsigned_abs())
    } else {
        let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
        let mut fixed = ArrayString::<32>::new();
        write!(fixed, "{value:.decimals$}")?;
        out.write_str(strip_fraction_zeros(&fixed))
    }
}

fn strip_fraction_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// An open CSV data file on `S`.
#[derive(Debug)]
pub struct FlightLog<S> {
    storage: S,
    file_name: FileName,
    layout: alloc::vec::Vec<ChannelLayout>,
    records: u64,
}

impl<S: Storage> FlightLog<S> {
    pub fn create(storage: S, layout: &[ChannelLayout]) -> Outcome<Self> {
        Self::create_with(storage, layout, DEFAULT_MAX_DATA_FILES, FALLBACK_FILE_NAME)
    }

    /// Pick the file name, then create the file holding just the header.
    pub fn create_with(
        mut storage: S,
        layout: &[ChannelLayout],
        max_data_files: u32,
        fallback: &str,
    ) -> Outcome<Self> {
        if layout.len() > MAX_CHANNELS {
            return Err(Failure::invalid_argument(alloc::format!(
                "{} channels exceed the {MAX_CHANNELS} column groups a record holds",
                layout.len()
            )));
        }
        if let Some(channel) = layout.iter().find(|c| c.fields.len() > MAX_READING_FIELDS) {
            return Err(Failure::invalid_argument(alloc::format!(
                "channel {} has more than {MAX_READING_FIELDS} fields",
                channel.name
            )));
        }

        let file_name = select_file_name(&storage, max_data_files, fallback)?;
        storage.create_file(&file_name, header(layout).as_bytes())?;
        info!(file = %file_name, channels = layout.len(), "flight log created");

        Ok(Self {
            storage,
            file_name,
            layout: layout.to_vec(),
            records: 0,
        })
    }

    /// Append one record for `snapshot`.
    pub fn append(&mut self, snapshot: &TelemetrySnapshot) -> Outcome<()> {
        let record = format_record(snapshot, &self.layout)?;
        self.storage.append_file(&self.file_name, record.as_bytes())?;
        self.records += 1;
        Ok(())
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}
