use std::fmt;

use serde::{Deserialize, Serialize};

/// Rutting severity predicted by the classifier.
///
/// The service only ever answers `Normal`, `Moderate` or `Severe`; anything
/// else is kept verbatim so the chart can fall back to its default color
/// instead of rejecting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SeverityClass {
    Normal,
    Moderate,
    Severe,
    Unrecognized(String),
}

impl SeverityClass {
    pub fn as_str(&self) -> &str {
        match self {
            SeverityClass::Normal => "Normal",
            SeverityClass::Moderate => "Moderate",
            SeverityClass::Severe => "Severe",
            SeverityClass::Unrecognized(label) => label,
        }
    }
}

impl From<String> for SeverityClass {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Normal" => SeverityClass::Normal,
            "Moderate" => SeverityClass::Moderate,
            "Severe" => SeverityClass::Severe,
            _ => SeverityClass::Unrecognized(label),
        }
    }
}

impl From<&str> for SeverityClass {
    fn from(label: &str) -> Self {
        SeverityClass::from(label.to_string())
    }
}

impl From<SeverityClass> for String {
    fn from(class: SeverityClass) -> Self {
        match class {
            SeverityClass::Unrecognized(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SeverityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// How many images landed in each class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub normal: usize,
    pub moderate: usize,
    pub severe: usize,
    pub unrecognized: usize,
}

impl SeverityCounts {
    pub fn tally<'a>(classes: impl IntoIterator<Item = &'a SeverityClass>) -> Self {
        let mut counts = Self::default();
        for class in classes {
            match class {
                SeverityClass::Normal => counts.normal += 1,
                SeverityClass::Moderate => counts.moderate += 1,
                SeverityClass::Severe => counts.severe += 1,
                SeverityClass::Unrecognized(_) => counts.unrecognized += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.normal + self.moderate + self.severe + self.unrecognized
    }
}
