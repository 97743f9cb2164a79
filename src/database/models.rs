// src/database/models.rs
use crate::{
    errors::AcarsRecorderError,
    models::{AcarsMessage, StoredMessage},
    reassembly::ReassemblyStatus,
};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct MessageRow {
    id: i64,
    time: f64,
    freq: String,
    level: f64,
    error: i64,
    mode: String,
    label: String,
    sub_label: Option<String>,
    block_id: Option<String>,
    ack: Option<String>,
    reg_no: Option<String>,
    flight_no: Option<String>,
    msg_no: Option<String>,
    reassembly_status: i64, // Store integer code
    text: Option<String>,
    libacars: Option<String>,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = AcarsRecorderError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(StoredMessage {
            id: row.id,
            message: AcarsMessage {
                time: row.time,
                freq: row.freq,
                level: row.level,
                error: row.error,
                mode: row.mode,
                label: row.label,
                sub_label: row.sub_label,
                block_id: row.block_id,
                ack: row.ack,
                reg_no: row.reg_no,
                flight_no: row.flight_no,
                msg_no: row.msg_no,
                reassembly_status: ReassemblyStatus::try_from(row.reassembly_status).map_err(
                    |e| AcarsRecorderError::StoreReadError(sqlx::Error::Decode(e.to_string().into())),
                )?,
                text: row.text,
                libacars: row.libacars,
            },
        })
    }
}
