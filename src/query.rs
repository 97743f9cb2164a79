//! Paginated message queries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    database::{MessageStore, OrderDirection, Ordering},
    dataset::DatasetLookup,
    errors::AcarsRecorderError,
    filter::{Column, MessageFilter},
    models::StoredMessage,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesRequest {
    #[serde(flatten)]
    pub filter: MessageFilter,
    #[serde(default)]
    pub page_index: u32,
    pub page_size: u32,
    /// Record field name, e.g. `regNo`
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub order_direction: Option<OrderDirection>,
}

impl GetMessagesRequest {
    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        if self.page_size == 0 {
            return Err(AcarsRecorderError::InvalidRequest(
                "page size must be greater than zero".to_string(),
            ));
        }
        self.filter.validate()
    }

    /// Rows skipped before the requested page
    pub fn offset(&self) -> Result<i64, AcarsRecorderError> {
        i64::from(self.page_index)
            .checked_mul(i64::from(self.page_size))
            .ok_or_else(|| {
                AcarsRecorderError::InvalidRequest("page index out of range".to_string())
            })
    }

    pub fn ordering(&self) -> Result<Option<Ordering>, AcarsRecorderError> {
        self.order_by
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| {
                Ok(Ordering {
                    column: Column::from_key(key)?,
                    direction: self.order_direction.unwrap_or_default(),
                })
            })
            .transpose()
    }
}

/// Stored message with its dataset descriptions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: StoredMessage,
    pub label_description: Option<String>,
    pub aircraft_description: Option<String>,
    pub airline_description: Option<String>,
}

impl MessageView {
    pub fn new<L: DatasetLookup + ?Sized>(message: StoredMessage, lookup: &L) -> Self {
        let record = &message.message;
        let label_description = lookup.label_description(&record.label).map(str::to_string);
        let aircraft_description = record
            .reg_no
            .as_deref()
            .and_then(|reg_no| lookup.aircraft_description(reg_no))
            .map(str::to_string);
        let airline_description = record
            .flight_no
            .as_deref()
            .and_then(|flight_no| lookup.airline_description(flight_no))
            .map(str::to_string);

        Self {
            message,
            label_description,
            aircraft_description,
            airline_description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub total_count: i64,
    pub current_page_messages: Vec<MessageView>,
}

/// One page of matching messages plus the total match count
pub async fn get_messages<S, L>(
    store: &S,
    lookup: &L,
    request: &GetMessagesRequest,
) -> Result<MessagePage, AcarsRecorderError>
where
    S: MessageStore,
    L: DatasetLookup + ?Sized,
{
    request.validate()?;
    let ordering = request.ordering()?;
    let predicate = request.filter.compile();

    let limit = i64::from(request.page_size);
    let offset = request.offset()?;
    let (total_count, rows) = tokio::try_join!(
        store.count_where(&predicate),
        store.fetch(&predicate, ordering, offset, limit)
    )?;
    debug!(
        "Page {} of {} matching messages: {} rows",
        request.page_index,
        total_count,
        rows.len()
    );

    Ok(MessagePage {
        total_count,
        current_page_messages: rows
            .into_iter()
            .map(|row| MessageView::new(row, lookup))
            .collect(),
    })
}
