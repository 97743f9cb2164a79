//! Descriptions for labels, aircraft and airlines.
//!
//! Loaded once at startup from comma-separated text tables and shared
//! read-only by all request handlers.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::errors::AcarsRecorderError;

pub trait DatasetLookup: Send + Sync {
    fn label_description(&self, label: &str) -> Option<&str>;

    fn aircraft_description(&self, reg_no: &str) -> Option<&str>;

    /// Airline operating a flight, from the airline code prefix of the flight number
    fn airline_description(&self, flight_no: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    labels: HashMap<String, String>,
    aircraft: HashMap<String, String>,
    airlines: HashMap<String, String>,
}

impl Dataset {
    /// Dataset without entries, every lookup misses
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the tables found in `dir`.
    ///
    /// A missing table is logged and left empty.
    pub fn load(dir: &Path) -> Result<Self, AcarsRecorderError> {
        let mut dataset = Self::default();

        for fields in read_table(dir, "acars_mls.txt")? {
            if let [label, description, ..] = fields.as_slice() {
                dataset.labels.insert(label.clone(), description.clone());
            }
        }

        for fields in read_table(dir, "airlines.txt")? {
            if let [code, name, ..] = fields.as_slice() {
                dataset.airlines.insert(code.clone(), name.clone());
            }
        }

        for fields in read_table(dir, "aircrafts_s.txt")? {
            if let [reg_no, airline, description, ..] = fields.as_slice() {
                let entry = dataset.describe_aircraft(description, airline);
                dataset.aircraft.insert(reg_no.clone(), entry);
            }
        }

        for fields in read_table(dir, "aircrafts_p.txt")? {
            if fields.len() < 7 || dataset.aircraft.contains_key(&fields[0]) {
                continue;
            }
            let entry = dataset.describe_aircraft(&fields[3], &fields[6]);
            dataset.aircraft.insert(fields[0].clone(), entry);
        }

        info!(
            "Dataset loaded from {}: {} labels, {} airlines, {} aircraft",
            dir.display(),
            dataset.labels.len(),
            dataset.airlines.len(),
            dataset.aircraft.len()
        );
        Ok(dataset)
    }

    fn describe_aircraft(&self, description: &str, airline: &str) -> String {
        match self.airlines.get(airline) {
            Some(name) => format!("{}, {}", description, name),
            None => description.to_string(),
        }
    }
}

impl DatasetLookup for Dataset {
    fn label_description(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    fn aircraft_description(&self, reg_no: &str) -> Option<&str> {
        self.aircraft.get(reg_no).map(String::as_str)
    }

    fn airline_description(&self, flight_no: &str) -> Option<&str> {
        airline_code(flight_no)
            .and_then(|code| self.airlines.get(code))
            .map(String::as_str)
    }
}

/// Airline code prefix of a flight number.
///
/// Three uppercase letters give an ICAO code; otherwise two characters of
/// which at most one is a digit give an IATA code.
pub fn airline_code(flight_no: &str) -> Option<&str> {
    let bytes = flight_no.as_bytes();
    let upper = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_uppercase);
    let digit = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    if upper(0) && upper(1) && upper(2) {
        Some(&flight_no[..3])
    } else if (upper(0) || digit(0)) && (upper(1) || digit(1)) && !(digit(0) && digit(1)) {
        Some(&flight_no[..2])
    } else {
        None
    }
}

/// Non-blank lines of a table split into trimmed fields
fn read_table(dir: &Path, name: &str) -> Result<Vec<Vec<String>>, AcarsRecorderError> {
    let path = dir.join(name);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Dataset table {} not found", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split(',').map(|f| f.trim().to_string()).collect())
        .collect())
}
