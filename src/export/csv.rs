// src/export/csv.rs
use tokio::sync::mpsc;
use tracing::info;

use super::{headers, row_cells, BlockReader, Cell, ExportOptions, QUOTED};
use crate::{
    database::MessageStore, errors::AcarsRecorderError, filter::Predicate, models::AcarsMessage,
};

pub fn csv_header(options: &ExportOptions) -> String {
    let mut line = headers(options).join(",");
    line.push('\n');
    line
}

/// Append one record as a CSV line.
///
/// Columns with decoder-supplied text are always quoted with embedded
/// quotes doubled, the rest are written bare.
pub fn write_csv_row(out: &mut String, message: &AcarsMessage, options: &ExportOptions) {
    for (i, (cell, quoted)) in row_cells(message, options)
        .iter()
        .zip(QUOTED)
        .enumerate()
    {
        if i > 0 {
            out.push(',');
        }
        if quoted {
            out.push('"');
        }
        match cell {
            Cell::Text(value) | Cell::Decimal(value) if quoted => {
                out.push_str(&value.replace('"', "\"\""));
            }
            Cell::Text(value) | Cell::Decimal(value) => out.push_str(value),
            Cell::Number(value) => out.push_str(&value.to_string()),
            Cell::Empty => {}
        }
        if quoted {
            out.push('"');
        }
    }
    out.push('\n');
}

/// Stream matching rows as CSV text into `sink`, one chunk per block.
///
/// The bounded channel carries backpressure from the response. When the
/// receiving side is gone no further blocks are fetched and
/// `StreamInterrupted` is returned. On success returns the number of rows
/// written.
pub async fn stream_csv<S: MessageStore>(
    store: &S,
    predicate: &Predicate,
    options: &ExportOptions,
    sink: mpsc::Sender<String>,
) -> Result<u64, AcarsRecorderError> {
    let mut reader = BlockReader::start(store, predicate, options.block_size).await?;
    sink.send(csv_header(options))
        .await
        .map_err(|_| AcarsRecorderError::StreamInterrupted)?;

    let mut written = 0u64;
    loop {
        if sink.is_closed() {
            return Err(AcarsRecorderError::StreamInterrupted);
        }
        let Some(block) = reader.next_block().await? else {
            break;
        };

        let mut chunk = String::with_capacity(block.len() * 160);
        for row in &block {
            write_csv_row(&mut chunk, &row.message, options);
        }
        written += block.len() as u64;

        sink.send(chunk)
            .await
            .map_err(|_| AcarsRecorderError::StreamInterrupted)?;
    }

    info!("CSV export finished: {} of {} rows", written, reader.total());
    Ok(written)
}
