//! Reassembly status of multi-fragment ACARS messages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::AcarsRecorderError;

/// Outcome of joining the fragments of a message, as reported by the decoder.
///
/// Stored as its integer code. Values are a pure classification of the
/// `assstat` string, there are no transitions between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ReassemblyStatus {
    #[default]
    Unknown = 0,
    Complete = 1,
    InProgress = 2,
    Skipped = 3,
    Duplicate = 4,
    FragOutOfSequence = 5,
    ArgsInvalid = 6,
}

impl ReassemblyStatus {
    pub const ALL: [ReassemblyStatus; 7] = [
        ReassemblyStatus::Unknown,
        ReassemblyStatus::Complete,
        ReassemblyStatus::InProgress,
        ReassemblyStatus::Skipped,
        ReassemblyStatus::Duplicate,
        ReassemblyStatus::FragOutOfSequence,
        ReassemblyStatus::ArgsInvalid,
    ];

    /// Classify the decoder's status text.
    ///
    /// Matching is exact and case-sensitive. Anything outside the known
    /// vocabulary, including a missing value, is `Unknown`.
    pub fn classify(status: Option<&str>) -> Self {
        match status {
            Some("complete") => ReassemblyStatus::Complete,
            Some("in progress") => ReassemblyStatus::InProgress,
            Some("skipped") => ReassemblyStatus::Skipped,
            Some("duplicate") => ReassemblyStatus::Duplicate,
            Some("out of sequence") => ReassemblyStatus::FragOutOfSequence,
            Some("invalid args") => ReassemblyStatus::ArgsInvalid,
            _ => ReassemblyStatus::Unknown,
        }
    }

    /// Integer code used in storage and on the HTTP interface
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn display_str(self) -> &'static str {
        match self {
            ReassemblyStatus::Unknown => "Unknown",
            ReassemblyStatus::Complete => "Complete",
            ReassemblyStatus::InProgress => "In Progress",
            ReassemblyStatus::Skipped => "Skipped",
            ReassemblyStatus::Duplicate => "Duplicate",
            ReassemblyStatus::FragOutOfSequence => "Out of Sequence",
            ReassemblyStatus::ArgsInvalid => "Invalid",
        }
    }

    pub fn display_char(self) -> char {
        match self {
            ReassemblyStatus::Unknown => 'U',
            ReassemblyStatus::Complete => 'C',
            ReassemblyStatus::InProgress => 'P',
            ReassemblyStatus::Skipped => 'S',
            ReassemblyStatus::Duplicate => 'D',
            ReassemblyStatus::FragOutOfSequence => 'O',
            ReassemblyStatus::ArgsInvalid => 'I',
        }
    }
}

impl TryFrom<i64> for ReassemblyStatus {
    type Error = AcarsRecorderError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| i64::from(status.code()) == value)
            .ok_or_else(|| {
                AcarsRecorderError::InvalidRequest(format!("unknown reassembly status {value}"))
            })
    }
}

impl Serialize for ReassemblyStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for ReassemblyStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        ReassemblyStatus::try_from(value).map_err(serde::de::Error::custom)
    }
}

/// Downlink blocks (aircraft to ground) carry a digit block id.
pub fn is_downlink(block_id: char) -> bool {
    block_id.is_ascii_digit()
}

/// Sequence character shown next to a message.
///
/// Downlinks use the fourth character of the message number, uplinks the
/// block id itself.
pub fn sequence_char(block_id: char, msg_no: Option<&str>) -> Option<char> {
    if is_downlink(block_id) {
        msg_no.and_then(|msg_no| msg_no.chars().nth(3))
    } else {
        Some(block_id)
    }
}
