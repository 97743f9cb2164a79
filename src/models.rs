//! Data models.

use serde::{Deserialize, Serialize};

use crate::errors::AcarsRecorderError;
use crate::reassembly::{self, ReassemblyStatus};
use serde_helpers::*;

/// Decoder application block present in every acarsdec datagram
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecoderApp {
    pub name: String,
    pub ver: Option<String>,
}

/// ACARS message as sent by the decoder, one JSON object per datagram.
///
/// Unrecognized fields are ignored. Optional string fields that are empty
/// on the wire are read as `None`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawAcarsMessage {
    /// Reception time, seconds from Unix epoch with sub-second precision
    pub timestamp: f64,
    #[serde(default)]
    pub station_id: Option<String>,
    #[serde(default)]
    pub channel: Option<u32>,
    /// Frequency in MHz
    pub freq: f64,
    /// Signal level in dB
    pub level: f64,
    /// Number of corrected bit errors
    pub error: i64,
    pub mode: String,
    pub label: String,
    #[serde(default, alias = "subLabel", deserialize_with = "deserialize_optional_string")]
    pub sublabel: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub mfi: Option<String>,
    #[serde(default, alias = "blockId", deserialize_with = "deserialize_optional_string")]
    pub block_id: Option<String>,
    /// Acknowledgement; `false` on the wire is a negative acknowledgement
    #[serde(default, deserialize_with = "deserialize_ack")]
    pub ack: Option<String>,
    /// Aircraft registration
    #[serde(default, alias = "regNo", deserialize_with = "deserialize_optional_string")]
    pub tail: Option<String>,
    #[serde(default, alias = "flightNo", deserialize_with = "deserialize_optional_string")]
    pub flight: Option<String>,
    #[serde(default, alias = "msgNo", deserialize_with = "deserialize_optional_string")]
    pub msgno: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub text: Option<String>,
    /// Last block of a multi-block message
    #[serde(default)]
    pub end: Option<bool>,
    #[serde(default)]
    pub depa: Option<String>,
    #[serde(default)]
    pub dsta: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub gtout: Option<String>,
    #[serde(default)]
    pub gtin: Option<String>,
    #[serde(default)]
    pub wloff: Option<String>,
    #[serde(default)]
    pub wlin: Option<String>,
    /// Reassembly status text, see [`ReassemblyStatus::classify`]
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub assstat: Option<String>,
    /// Decoded sub-structure from libacars, kept opaque
    #[serde(default)]
    pub libacars: Option<serde_json::Value>,
    #[serde(default)]
    pub app: Option<DecoderApp>,
}

impl RawAcarsMessage {
    /// Decode one datagram payload
    pub fn from_datagram(payload: &[u8]) -> Result<Self, AcarsRecorderError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| AcarsRecorderError::NormalizationError(format!("not UTF-8: {e}")))?;
        serde_json::from_str(text)
            .map_err(|e| AcarsRecorderError::NormalizationError(e.to_string()))
    }

    /// Convert to the canonical record shape stored in the database
    pub fn normalize(&self) -> Result<AcarsMessage, AcarsRecorderError> {
        self.validate()?;

        let libacars = match &self.libacars {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(
                serde_json::to_string(value)
                    .map_err(|e| AcarsRecorderError::NormalizationError(e.to_string()))?,
            ),
        };

        Ok(AcarsMessage {
            time: self.timestamp,
            freq: format_freq(self.freq),
            level: self.level,
            error: self.error,
            mode: self.mode.clone(),
            label: self.label.clone(),
            sub_label: self.sublabel.clone(),
            block_id: self.block_id.clone(),
            ack: self.ack.clone(),
            reg_no: self.tail.clone(),
            flight_no: self.flight.clone(),
            msg_no: self.msgno.clone(),
            reassembly_status: ReassemblyStatus::classify(self.assstat.as_deref()),
            text: self.text.clone(),
            libacars,
        })
    }

    fn validate(&self) -> Result<(), AcarsRecorderError> {
        let invalid = |field: &str| {
            Err(AcarsRecorderError::NormalizationError(format!(
                "invalid field \"{field}\""
            )))
        };

        if !self.timestamp.is_finite() {
            return invalid("timestamp");
        }
        if !self.freq.is_finite() {
            return invalid("freq");
        }
        if !self.level.is_finite() {
            return invalid("level");
        }
        if self.mode.is_empty() {
            return invalid("mode");
        }
        if self.label.is_empty() {
            return invalid("label");
        }
        Ok(())
    }
}

/// Frequency as a fixed three-decimal string, e.g. `131.550`
pub fn format_freq(freq: f64) -> String {
    format!("{:.3}", freq)
}

/// Canonical ACARS record, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcarsMessage {
    /// Seconds from Unix epoch
    pub time: f64,
    pub freq: String,
    pub level: f64,
    pub error: i64,
    pub mode: String,
    pub label: String,
    pub sub_label: Option<String>,
    pub block_id: Option<String>,
    /// `None` is a negative acknowledgement (NACK)
    pub ack: Option<String>,
    pub reg_no: Option<String>,
    pub flight_no: Option<String>,
    pub msg_no: Option<String>,
    pub reassembly_status: ReassemblyStatus,
    pub text: Option<String>,
    /// Serialized libacars payload
    pub libacars: Option<String>,
}

impl AcarsMessage {
    /// Direction from the block id, `None` without a block id
    pub fn is_downlink(&self) -> Option<bool> {
        self.block_id
            .as_deref()
            .and_then(|b| b.chars().next())
            .map(reassembly::is_downlink)
    }

    pub fn sequence_char(&self) -> Option<char> {
        let block_id = self.block_id.as_deref()?.chars().next()?;
        reassembly::sequence_char(block_id, self.msg_no.as_deref())
    }
}

/// Record together with its store-assigned identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    #[serde(flatten)]
    pub message: AcarsMessage,
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, de, Deserialize, Deserializer};

    pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value.filter(|s| !s.is_empty()))
    }

    pub fn deserialize_ack<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null | serde_json::Value::Bool(false) => Ok(None),
            serde_json::Value::String(s) if s.is_empty() => Ok(None),
            serde_json::Value::String(s) => Ok(Some(s)),
            other => Err(de::Error::custom(format!("invalid ack value {other}"))),
        }
    }
}
