use serde::Serialize;
use std::fmt;

/// Classification of a partition's mean delay magnitude, in minutes.
///
/// | Mean delay      | Severity |
/// |-----------------|----------|
/// | < 10            | MINOR    |
/// | 10 ..= 20       | MODERATE |
/// | > 20            | SEVERE   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn classify(mean_delay: f64) -> Self {
        match mean_delay {
            m if m < 10.0 => Severity::Minor,
            m if m <= 20.0 => Severity::Moderate,
            _ => Severity::Severe,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "MINOR",
            Severity::Moderate => "MODERATE",
            Severity::Severe => "SEVERE",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
