// src/export/xlsx.rs
use rust_xlsxwriter::{Format, Workbook};
use tokio::sync::mpsc;
use tracing::info;

use super::{headers, row_cells, BlockReader, Cell, ExportOptions};
use crate::{
    database::MessageStore, errors::AcarsRecorderError, filter::Predicate, models::StoredMessage,
};

/// Blocks queued between the reader and the workbook writer
const PENDING_BLOCKS: usize = 2;

/// Build an XLSX workbook of all matching rows.
///
/// Rows are still fetched block by block, but the workbook itself is
/// assembled in memory and serialized once complete. The writer runs on the
/// blocking pool while blocks are fetched.
pub async fn build_xlsx<S: MessageStore>(
    store: &S,
    predicate: &Predicate,
    options: &ExportOptions,
) -> Result<Vec<u8>, AcarsRecorderError> {
    let mut reader = BlockReader::start(store, predicate, options.block_size).await?;

    let (tx, rx) = mpsc::channel(PENDING_BLOCKS);
    let writer_options = options.clone();
    let writer = tokio::task::spawn_blocking(move || write_workbook(rx, &writer_options));

    while let Some(block) = reader.next_block().await? {
        if tx.send(block).await.is_err() {
            // writer failed, its error is reported below
            break;
        }
    }
    drop(tx);

    let buffer = writer.await.map_err(std::io::Error::other)??;
    info!(
        "XLSX export finished: {} rows, {} bytes",
        reader.total(),
        buffer.len()
    );
    Ok(buffer)
}

fn write_workbook(
    mut blocks: mpsc::Receiver<Vec<StoredMessage>>,
    options: &ExportOptions,
) -> Result<Vec<u8>, AcarsRecorderError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let freq_format = Format::new().set_num_format("0.000");

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("ACARS")?;
    for (col, header) in headers(options).iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    let mut row: u32 = 1;
    while let Some(block) = blocks.blocking_recv() {
        for stored in &block {
            for (col, cell) in row_cells(&stored.message, options).into_iter().enumerate() {
                let col = col as u16;
                match cell {
                    Cell::Text(value) => {
                        worksheet.write_string(row, col, value)?;
                    }
                    Cell::Number(value) => {
                        worksheet.write_number(row, col, value)?;
                    }
                    Cell::Decimal(value) => match value.parse::<f64>() {
                        Ok(number) => {
                            worksheet.write_number_with_format(row, col, number, &freq_format)?;
                        }
                        Err(_) => {
                            worksheet.write_string(row, col, value)?;
                        }
                    },
                    Cell::Empty => {}
                }
            }
            row += 1;
        }
    }

    Ok(workbook.save_to_buffer()?)
}
