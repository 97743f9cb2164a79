//! Value distributions used to populate filter options.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde::Serialize;
use tracing::debug;

use crate::{
    database::{MessageStore, ValueCount},
    errors::AcarsRecorderError,
    filter::{Column, Condition, FilterField, Predicate},
};

/// Per-field distributions over one time range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    #[serde(flatten)]
    pub fields: BTreeMap<FilterField, Vec<ValueCount>>,
    /// Counts of records with and without a libacars payload
    pub libacars: Vec<ValueCount<bool>>,
}

impl Statistics {
    /// Number of records in the range
    pub fn total(&self) -> i64 {
        self.fields
            .get(&FilterField::Freq)
            .map(|counts| counts.iter().map(|c| c.count).sum())
            .unwrap_or(0)
    }
}

/// Distinct values and counts of every filterable field within
/// `[start_s, end_s]`.
///
/// Only the time range applies. The grouped queries run concurrently.
pub async fn get_statistics<S: MessageStore>(
    store: &S,
    start_s: f64,
    end_s: f64,
) -> Result<Statistics, AcarsRecorderError> {
    let predicate = Predicate::time_range(start_s, end_s);
    let with_libacars = predicate.clone().and(Condition::IsNotNull(Column::Libacars));

    let grouped = FilterField::ALL
        .into_iter()
        .map(|field| store.count_grouped_by(&predicate, field));
    let (distributions, libacars_count) =
        tokio::try_join!(try_join_all(grouped), store.count_where(&with_libacars))?;

    let fields: BTreeMap<_, _> = FilterField::ALL.into_iter().zip(distributions).collect();
    let mut statistics = Statistics {
        fields,
        libacars: Vec::new(),
    };
    statistics.libacars = libacars_distribution(statistics.total(), libacars_count);

    debug!(
        "Statistics for [{}, {}]: {} records",
        start_s,
        end_s,
        statistics.total()
    );
    Ok(statistics)
}

/// Split `total` into with/without libacars, omitting zero counts
pub fn libacars_distribution(total: i64, with_libacars: i64) -> Vec<ValueCount<bool>> {
    [
        ValueCount {
            value: true,
            count: with_libacars,
        },
        ValueCount {
            value: false,
            count: total - with_libacars,
        },
    ]
    .into_iter()
    .filter(|entry| entry.count > 0)
    .collect()
}
