//! Message filters and the predicate they compile to.
//!
//! A [`MessageFilter`] is what a client sends: a time range, optional sets of
//! accepted values per field and a free-text search. [`MessageFilter::compile`]
//! turns it into a [`Predicate`], a flat list of typed conditions joined by
//! AND. The SQLite store renders predicates to SQL; [`Predicate::matches`]
//! evaluates the same conditions against a record in memory.

use serde::{Deserialize, Serialize};

use crate::errors::AcarsRecorderError;
use crate::models::AcarsMessage;

/// Scalar value of a filterable column.
///
/// Text columns carry strings, `reassemblyStatus` carries its integer code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// Columns of the `acars` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Time,
    Freq,
    Level,
    Error,
    Mode,
    Label,
    SubLabel,
    BlockId,
    Ack,
    RegNo,
    FlightNo,
    MsgNo,
    ReassemblyStatus,
    Text,
    Libacars,
}

impl Column {
    const ALL: [Column; 16] = [
        Column::Id,
        Column::Time,
        Column::Freq,
        Column::Level,
        Column::Error,
        Column::Mode,
        Column::Label,
        Column::SubLabel,
        Column::BlockId,
        Column::Ack,
        Column::RegNo,
        Column::FlightNo,
        Column::MsgNo,
        Column::ReassemblyStatus,
        Column::Text,
        Column::Libacars,
    ];

    /// SQL column name
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Time => "time",
            Column::Freq => "freq",
            Column::Level => "level",
            Column::Error => "error",
            Column::Mode => "mode",
            Column::Label => "label",
            Column::SubLabel => "sub_label",
            Column::BlockId => "block_id",
            Column::Ack => "ack",
            Column::RegNo => "reg_no",
            Column::FlightNo => "flight_no",
            Column::MsgNo => "msg_no",
            Column::ReassemblyStatus => "reassembly_status",
            Column::Text => "text",
            Column::Libacars => "libacars",
        }
    }

    /// Field name on the HTTP interface
    pub fn key(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Time => "time",
            Column::Freq => "freq",
            Column::Level => "level",
            Column::Error => "error",
            Column::Mode => "mode",
            Column::Label => "label",
            Column::SubLabel => "subLabel",
            Column::BlockId => "blockId",
            Column::Ack => "ack",
            Column::RegNo => "regNo",
            Column::FlightNo => "flightNo",
            Column::MsgNo => "msgNo",
            Column::ReassemblyStatus => "reassemblyStatus",
            Column::Text => "text",
            Column::Libacars => "libacars",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, AcarsRecorderError> {
        Self::ALL
            .into_iter()
            .find(|c| c.key() == key)
            .ok_or_else(|| AcarsRecorderError::InvalidRequest(format!("unknown field \"{key}\"")))
    }
}

/// Fields with a value-set filter and a value distribution in statistics.
///
/// This one table drives both features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    Freq,
    Mode,
    Label,
    SubLabel,
    BlockId,
    Ack,
    RegNo,
    FlightNo,
    MsgNo,
    ReassemblyStatus,
}

impl FilterField {
    pub const ALL: [FilterField; 10] = [
        FilterField::Freq,
        FilterField::Mode,
        FilterField::Label,
        FilterField::SubLabel,
        FilterField::BlockId,
        FilterField::Ack,
        FilterField::RegNo,
        FilterField::FlightNo,
        FilterField::MsgNo,
        FilterField::ReassemblyStatus,
    ];

    pub fn column(self) -> Column {
        match self {
            FilterField::Freq => Column::Freq,
            FilterField::Mode => Column::Mode,
            FilterField::Label => Column::Label,
            FilterField::SubLabel => Column::SubLabel,
            FilterField::BlockId => Column::BlockId,
            FilterField::Ack => Column::Ack,
            FilterField::RegNo => Column::RegNo,
            FilterField::FlightNo => Column::FlightNo,
            FilterField::MsgNo => Column::MsgNo,
            FilterField::ReassemblyStatus => Column::ReassemblyStatus,
        }
    }

    /// Whether grouped values come back as integers rather than text
    pub fn is_integer(self) -> bool {
        matches!(self, FilterField::ReassemblyStatus)
    }
}

/// Accepted values for one field; `None` members stand for SQL NULL
pub type ValueSet = Vec<Option<FieldValue>>;

/// Filter sent by clients for queries and exports
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    pub start_s: f64,
    pub end_s: f64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub freq: Option<ValueSet>,
    #[serde(default)]
    pub mode: Option<ValueSet>,
    #[serde(default)]
    pub label: Option<ValueSet>,
    #[serde(default)]
    pub sub_label: Option<ValueSet>,
    #[serde(default)]
    pub block_id: Option<ValueSet>,
    #[serde(default)]
    pub ack: Option<ValueSet>,
    #[serde(default)]
    pub reg_no: Option<ValueSet>,
    #[serde(default)]
    pub flight_no: Option<ValueSet>,
    #[serde(default)]
    pub msg_no: Option<ValueSet>,
    #[serde(default)]
    pub reassembly_status: Option<ValueSet>,
    /// Accepted "has libacars payload" states
    #[serde(default)]
    pub libacars: Option<Vec<bool>>,
}

impl MessageFilter {
    /// Filter on the time range only
    pub fn time_range(start_s: f64, end_s: f64) -> Self {
        Self {
            start_s,
            end_s,
            ..Default::default()
        }
    }

    pub fn values(&self, field: FilterField) -> Option<&[Option<FieldValue>]> {
        let values = match field {
            FilterField::Freq => &self.freq,
            FilterField::Mode => &self.mode,
            FilterField::Label => &self.label,
            FilterField::SubLabel => &self.sub_label,
            FilterField::BlockId => &self.block_id,
            FilterField::Ack => &self.ack,
            FilterField::RegNo => &self.reg_no,
            FilterField::FlightNo => &self.flight_no,
            FilterField::MsgNo => &self.msg_no,
            FilterField::ReassemblyStatus => &self.reassembly_status,
        };
        values.as_deref()
    }

    pub fn values_mut(&mut self, field: FilterField) -> &mut Option<ValueSet> {
        match field {
            FilterField::Freq => &mut self.freq,
            FilterField::Mode => &mut self.mode,
            FilterField::Label => &mut self.label,
            FilterField::SubLabel => &mut self.sub_label,
            FilterField::BlockId => &mut self.block_id,
            FilterField::Ack => &mut self.ack,
            FilterField::RegNo => &mut self.reg_no,
            FilterField::FlightNo => &mut self.flight_no,
            FilterField::MsgNo => &mut self.msg_no,
            FilterField::ReassemblyStatus => &mut self.reassembly_status,
        }
    }

    /// Reject bounds that cannot come from a client
    pub fn validate(&self) -> Result<(), AcarsRecorderError> {
        if !self.start_s.is_finite() || !self.end_s.is_finite() {
            return Err(AcarsRecorderError::InvalidRequest(
                "time range must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn compile(&self) -> Predicate {
        let mut predicate = Predicate::time_range(self.start_s, self.end_s);

        for field in FilterField::ALL {
            if let Some(values) = self.values(field) {
                predicate.push_value_set(field.column(), values);
            }
        }

        if let Some(states) = &self.libacars {
            let with = states.contains(&true);
            let without = states.contains(&false);
            match (with, without) {
                (true, false) => predicate.push(Condition::IsNotNull(Column::Libacars)),
                (false, true) => predicate.push(Condition::IsNull(Column::Libacars)),
                _ => {}
            }
        }

        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            predicate.push(Condition::TextContains(text.to_string()));
        }

        predicate
    }
}

/// Single condition of a [`Predicate`]
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    TimeAtLeast(f64),
    TimeAtMost(f64),
    /// `column IN (values)`, or `column IS NULL OR column IN (values)`
    OneOf {
        column: Column,
        values: Vec<FieldValue>,
        or_null: bool,
    },
    IsNull(Column),
    IsNotNull(Column),
    /// Case-insensitive substring of `text`
    TextContains(String),
}

/// Conditions combined with logical AND
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    conditions: Vec<Condition>,
}

impl Predicate {
    /// Inclusive time range. Infinite bounds add no condition.
    pub fn time_range(start_s: f64, end_s: f64) -> Self {
        let mut predicate = Predicate::default();
        if start_s.is_finite() {
            predicate.push(Condition::TimeAtLeast(start_s));
        }
        if end_s.is_finite() {
            predicate.push(Condition::TimeAtMost(end_s));
        }
        predicate
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.push(condition);
        self
    }

    /// Add the condition for a set of accepted values.
    ///
    /// An empty set leaves the column unconstrained.
    pub fn push_value_set(&mut self, column: Column, values: &[Option<FieldValue>]) {
        let or_null = values.iter().any(Option::is_none);
        let mut concrete: Vec<FieldValue> = values.iter().flatten().cloned().collect();
        concrete.sort();
        concrete.dedup();

        match (concrete.is_empty(), or_null) {
            (true, false) => {}
            (true, true) => self.push(Condition::IsNull(column)),
            (false, or_null) => self.push(Condition::OneOf {
                column,
                values: concrete,
                or_null,
            }),
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a record in memory
    pub fn matches(&self, message: &AcarsMessage) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::TimeAtLeast(start) => message.time >= *start,
            Condition::TimeAtMost(end) => message.time <= *end,
            Condition::OneOf {
                column,
                values,
                or_null,
            } => match column_value(message, *column) {
                None => *or_null,
                Some(value) => values.contains(&value),
            },
            Condition::IsNull(column) => column_value(message, *column).is_none(),
            Condition::IsNotNull(column) => column_value(message, *column).is_some(),
            Condition::TextContains(needle) => message
                .text
                .as_deref()
                .is_some_and(|text| contains_ignore_ascii_case(text, needle)),
        })
    }
}

/// Value of a column of a record, `None` for NULL
pub fn column_value(message: &AcarsMessage, column: Column) -> Option<FieldValue> {
    let text = |value: &Option<String>| value.clone().map(FieldValue::Text);
    match column {
        // numeric columns are range- or order-only
        Column::Id | Column::Time | Column::Level => None,
        Column::Error => Some(FieldValue::Integer(message.error)),
        Column::Freq => Some(FieldValue::Text(message.freq.clone())),
        Column::Mode => Some(FieldValue::Text(message.mode.clone())),
        Column::Label => Some(FieldValue::Text(message.label.clone())),
        Column::SubLabel => text(&message.sub_label),
        Column::BlockId => text(&message.block_id),
        Column::Ack => text(&message.ack),
        Column::RegNo => text(&message.reg_no),
        Column::FlightNo => text(&message.flight_no),
        Column::MsgNo => text(&message.msg_no),
        Column::ReassemblyStatus => Some(FieldValue::Integer(
            message.reassembly_status.code().into(),
        )),
        Column::Text => text(&message.text),
        Column::Libacars => text(&message.libacars),
    }
}

fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reassembly::ReassemblyStatus;

    fn message(reg_no: Option<&str>) -> AcarsMessage {
        AcarsMessage {
            time: 100.0,
            freq: "131.550".to_string(),
            level: -10.0,
            error: 0,
            mode: "2".to_string(),
            label: "H1".to_string(),
            sub_label: None,
            block_id: Some("2".to_string()),
            ack: None,
            reg_no: reg_no.map(str::to_string),
            flight_no: None,
            msg_no: None,
            reassembly_status: ReassemblyStatus::Complete,
            text: Some("POS N35 E139".to_string()),
            libacars: None,
        }
    }

    #[test]
    fn time_range_is_inclusive() {
        let predicate = MessageFilter::time_range(100.0, 100.0).compile();
        assert_eq!(
            predicate.conditions(),
            &[Condition::TimeAtLeast(100.0), Condition::TimeAtMost(100.0)]
        );
        assert!(predicate.matches(&message(None)));
        assert!(!MessageFilter::time_range(100.5, 200.0)
            .compile()
            .matches(&message(None)));
    }

    #[test]
    fn infinite_bounds_are_unconstrained() {
        let predicate = Predicate::time_range(f64::NEG_INFINITY, f64::INFINITY);
        assert!(predicate.is_empty());
    }

    #[test]
    fn value_set_with_null_sentinel() {
        let mut filter = MessageFilter::time_range(0.0, 1000.0);
        filter.reg_no = Some(vec![None, Some("N12345".into())]);
        let predicate = filter.compile();

        assert_eq!(
            predicate.conditions()[2],
            Condition::OneOf {
                column: Column::RegNo,
                values: vec![FieldValue::Text("N12345".to_string())],
                or_null: true,
            }
        );
        assert!(predicate.matches(&message(None)));
        assert!(predicate.matches(&message(Some("N12345"))));
        assert!(!predicate.matches(&message(Some("N54321"))));
    }

    #[test]
    fn value_set_only_null_or_only_values() {
        let mut filter = MessageFilter::time_range(0.0, 1000.0);
        filter.sub_label = Some(vec![None]);
        filter.label = Some(vec![Some("H1".into()), Some("H1".into())]);
        let predicate = filter.compile();

        assert!(predicate
            .conditions()
            .contains(&Condition::IsNull(Column::SubLabel)));
        assert!(predicate.conditions().contains(&Condition::OneOf {
            column: Column::Label,
            values: vec![FieldValue::Text("H1".to_string())],
            or_null: false,
        }));
    }

    #[test]
    fn empty_value_set_equals_omitted_field() {
        let mut with_empty = MessageFilter::time_range(0.0, 1000.0);
        with_empty.freq = Some(vec![]);
        with_empty.libacars = Some(vec![]);
        with_empty.text = Some(String::new());
        let omitted = MessageFilter::time_range(0.0, 1000.0);

        assert_eq!(with_empty.compile(), omitted.compile());
    }

    #[test]
    fn libacars_presence_filter() {
        let mut filter = MessageFilter::time_range(0.0, 1000.0);
        filter.libacars = Some(vec![true]);
        assert!(filter
            .compile()
            .conditions()
            .contains(&Condition::IsNotNull(Column::Libacars)));

        filter.libacars = Some(vec![false]);
        assert!(filter
            .compile()
            .conditions()
            .contains(&Condition::IsNull(Column::Libacars)));

        filter.libacars = Some(vec![true, false]);
        assert_eq!(filter.compile().conditions().len(), 2);
    }

    #[test]
    fn text_filter_ignores_case() {
        let mut filter = MessageFilter::time_range(0.0, 1000.0);
        filter.text = Some("n35 e".to_string());
        assert!(filter.compile().matches(&message(None)));

        filter.text = Some("N36".to_string());
        assert!(!filter.compile().matches(&message(None)));
    }

    #[test]
    fn deserialize_filter_from_client() {
        let json = r#"{
            "startS": 0,
            "endS": 1000,
            "text": "",
            "freq": ["131.550"],
            "regNo": [null, "N12345"],
            "reassemblyStatus": [1, 2],
            "libacars": [true]
        }"#;
        let filter: MessageFilter = serde_json::from_str(json).unwrap();

        assert_eq!(filter.freq, Some(vec![Some("131.550".into())]));
        assert_eq!(filter.reg_no, Some(vec![None, Some("N12345".into())]));
        assert_eq!(
            filter.reassembly_status,
            Some(vec![Some(FieldValue::Integer(1)), Some(FieldValue::Integer(2))])
        );
        assert_eq!(filter.label, None);
        assert!(!filter.compile().matches(&message(None)));
    }

    #[test]
    fn column_keys_round_trip() {
        assert_eq!(Column::from_key("flightNo").unwrap(), Column::FlightNo);
        assert_eq!(Column::from_key("time").unwrap().name(), "time");
        assert!(Column::from_key("flight_no").is_err());
    }
}
