//! Bulk export of filtered messages.
//!
//! Matching rows are read in fixed-size blocks so that an export never holds
//! the whole result set. The CSV encoder hands every block to the response as
//! soon as it is rendered; the XLSX encoder has to finish the workbook before
//! it can be serialized.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::{
    config::ExportConfig,
    database::MessageStore,
    errors::AcarsRecorderError,
    filter::{MessageFilter, Predicate},
    models::{AcarsMessage, StoredMessage},
};

mod csv;
mod xlsx;

pub use csv::{csv_header, stream_csv, write_csv_row};
pub use xlsx::build_xlsx;

pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

/// Displayed for a negative acknowledgement
pub const NACK: &str = "NACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub block_size: usize,
    pub local_offset: FixedOffset,
    pub local_zone_name: String,
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Result<Self, AcarsRecorderError> {
        config.validate()?;
        Ok(Self {
            block_size: config.block_size,
            local_offset: config.local_offset()?,
            local_zone_name: config.local_zone_name.clone(),
        })
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            local_offset: Utc.fix(),
            local_zone_name: "UTC".to_string(),
        }
    }
}

/// Download name, e.g. `acars_20240601_20240602.csv`
pub fn file_name(filter: &MessageFilter, format: ExportFormat, options: &ExportOptions) -> String {
    let day = |time_s: f64| {
        DateTime::from_timestamp(time_s.floor() as i64, 0)
            .map(|t| t.with_timezone(&options.local_offset).format("%Y%m%d").to_string())
            .unwrap_or_default()
    };
    format!(
        "acars_{}_{}.{}",
        day(filter.start_s),
        day(filter.end_s),
        format.extension()
    )
}

/// `yyyy/MM/dd HH:mm:ss` in the given zone
pub fn format_time<Tz>(time_s: f64, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    DateTime::from_timestamp(time_s.floor() as i64, 0)
        .map(|t| t.with_timezone(zone).format("%Y/%m/%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Sequential block reads over a fixed predicate.
///
/// The total is counted once at start. Reads never go past it, so rows
/// inserted while the export runs are not included.
pub struct BlockReader<'a, S> {
    store: &'a S,
    predicate: &'a Predicate,
    block_size: i64,
    total: i64,
    offset: i64,
}

impl<'a, S: MessageStore> BlockReader<'a, S> {
    pub async fn start(
        store: &'a S,
        predicate: &'a Predicate,
        block_size: usize,
    ) -> Result<Self, AcarsRecorderError> {
        let total = store.count_where(predicate).await?;
        debug!("Export of {} rows in blocks of {}", total, block_size);
        Ok(Self {
            store,
            predicate,
            block_size: block_size.max(1) as i64,
            total,
            offset: 0,
        })
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub async fn next_block(&mut self) -> Result<Option<Vec<StoredMessage>>, AcarsRecorderError> {
        if self.offset >= self.total {
            return Ok(None);
        }

        let limit = self.block_size.min(self.total - self.offset);
        let rows = self
            .store
            .fetch(self.predicate, None, self.offset, limit)
            .await?;
        self.offset += limit;

        if rows.is_empty() {
            self.offset = self.total;
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

/// Typed value of one exported cell
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Text(String),
    Number(f64),
    /// Fixed-precision decimal kept in its stored text form
    Decimal(String),
    Empty,
}

/// Columns holding text taken as-is from the decoder
pub(crate) const QUOTED: [bool; 16] = [
    false, false, false, false, false, false, false, true, false, true, true, true, true, false,
    true, true,
];

pub(crate) fn headers(options: &ExportOptions) -> [String; 16] {
    [
        "Time (UTC)".to_string(),
        format!("Time ({})", options.local_zone_name),
        "Frequency".to_string(),
        "Level".to_string(),
        "Error".to_string(),
        "Mode".to_string(),
        "Label".to_string(),
        "Sub Label".to_string(),
        "Block ID".to_string(),
        "ACK".to_string(),
        "Reg No".to_string(),
        "Flight No".to_string(),
        "Msg No".to_string(),
        "Reassembly Status".to_string(),
        "Text".to_string(),
        "Libacars".to_string(),
    ]
}

pub(crate) fn row_cells(message: &AcarsMessage, options: &ExportOptions) -> [Cell; 16] {
    let optional = |value: &Option<String>| value.clone().map_or(Cell::Empty, Cell::Text);
    [
        Cell::Text(format_time(message.time, &Utc)),
        Cell::Text(format_time(message.time, &options.local_offset)),
        Cell::Decimal(message.freq.clone()),
        Cell::Number(message.level),
        Cell::Number(message.error as f64),
        Cell::Text(message.mode.clone()),
        Cell::Text(message.label.clone()),
        optional(&message.sub_label),
        optional(&message.block_id),
        Cell::Text(message.ack.clone().unwrap_or_else(|| NACK.to_string())),
        optional(&message.reg_no),
        optional(&message.flight_no),
        optional(&message.msg_no),
        Cell::Text(message.reassembly_status.display_str().to_string()),
        optional(&message.text),
        optional(&message.libacars),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembly::ReassemblyStatus;

    fn sample_message() -> AcarsMessage {
        AcarsMessage {
            time: 1718000123.9,
            freq: "131.450".to_string(),
            level: -14.5,
            error: 1,
            mode: "2".to_string(),
            label: "H1".to_string(),
            sub_label: None,
            block_id: Some("5".to_string()),
            ack: None,
            reg_no: Some(".JA801A".to_string()),
            flight_no: None,
            msg_no: Some("D04A".to_string()),
            reassembly_status: ReassemblyStatus::InProgress,
            text: Some("say \"hi\", ok".to_string()),
            libacars: None,
        }
    }

    fn jst() -> ExportOptions {
        ExportOptions {
            block_size: 10,
            local_offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            local_zone_name: "JST".to_string(),
        }
    }

    #[test]
    fn time_in_both_zones() {
        // 2024-06-10 06:15:23 UTC
        assert_eq!(format_time(1718000123.9, &Utc), "2024/06/10 06:15:23");
        assert_eq!(
            format_time(1718000123.9, &jst().local_offset),
            "2024/06/10 15:15:23"
        );
    }

    #[test]
    fn file_name_embeds_range() {
        let filter = MessageFilter::time_range(1717945200.0, 1718031599.0);
        assert_eq!(
            file_name(&filter, ExportFormat::Csv, &jst()),
            "acars_20240610_20240610.csv"
        );
        assert_eq!(
            file_name(&filter, ExportFormat::Xlsx, &ExportOptions::default()),
            "acars_20240609_20240610.xlsx"
        );
    }

    #[test]
    fn null_display_policy() {
        let cells = row_cells(&sample_message(), &jst());
        assert_eq!(cells[9], Cell::Text("NACK".to_string()));
        assert_eq!(cells[7], Cell::Empty);
        assert_eq!(cells[11], Cell::Empty);
        assert_eq!(cells[15], Cell::Empty);
        assert_eq!(cells[13], Cell::Text("In Progress".to_string()));
        assert_eq!(cells[2], Cell::Decimal("131.450".to_string()));
        assert_eq!(headers(&jst())[1], "Time (JST)");
    }

    #[test]
    fn format_content_types() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert!(ExportFormat::Xlsx.content_type().contains("spreadsheetml"));
        let format: ExportFormat = serde_json::from_str("\"xlsx\"").unwrap();
        assert_eq!(format, ExportFormat::Xlsx);
    }
}
