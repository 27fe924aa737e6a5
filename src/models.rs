use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Incident {
    pub number: String,
    pub priority: Option<String>,
    pub priority_number: u32,
    pub state: Option<String>,
    pub opened_at: Option<NaiveDateTime>,
    pub resolved_at: Option<NaiveDateTime>,
    pub reassignment_count: u32,
    pub contact_type: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub number: String,
    pub state: Option<String>,
    pub opened_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub location: Option<String>,
    pub country: Option<String>,
}

/// An incident plus its derived compliance flags. The underlying record
/// is never mutated; derivation produces a fresh annotated set.
#[derive(Debug, Clone)]
pub struct FlaggedIncident {
    pub record: Incident,
    pub days_open: f64,
    pub days_to_resolve: Option<f64>,
    pub is_p1: bool,
    pub is_p2: bool,
    pub is_major_incident: bool,
    pub is_resolved: bool,
    pub is_backlog: bool,
    pub is_first_time_fix: bool,
    pub is_first_call_resolution: bool,
}

#[derive(Debug, Clone)]
pub struct FlaggedRequest {
    pub record: Request,
    pub days_open: f64,
    pub days_to_close: Option<f64>,
    pub is_aged: bool,
    pub is_closed: bool,
}

/// Stable KPI identifiers. KR linkage and weight tables key on these
/// instead of free-form strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum KpiId {
    #[serde(rename = "SM001")]
    Sm001,
    #[serde(rename = "SM002")]
    Sm002,
    #[serde(rename = "SM003")]
    Sm003,
    #[serde(rename = "SM004")]
    Sm004,
}

impl fmt::Display for KpiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            KpiId::Sm001 => "SM001",
            KpiId::Sm002 => "SM002",
            KpiId::Sm003 => "SM003",
            KpiId::Sm004 => "SM004",
        };
        write!(f, "{code}")
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum KrId {
    #[serde(rename = "KR3")]
    Kr3,
    #[serde(rename = "KR4")]
    Kr4,
    #[serde(rename = "KR5")]
    Kr5,
    #[serde(rename = "KR6")]
    Kr6,
}

impl KrId {
    pub const ALL: [KrId; 4] = [KrId::Kr3, KrId::Kr4, KrId::Kr5, KrId::Kr6];
}

impl fmt::Display for KrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            KrId::Kr3 => "KR3",
            KrId::Kr4 => "KR4",
            KrId::Kr5 => "KR5",
            KrId::Kr6 => "KR6",
        };
        write!(f, "{id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KpiStatus {
    Met,
    Warning,
    Critical,
}

impl fmt::Display for KpiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KpiStatus::Met => "Met",
            KpiStatus::Warning => "Warning",
            KpiStatus::Critical => "Critical",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OverallStatus {
    Excellent,
    Good,
    NeedsImprovement,
    Poor,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverallStatus::Excellent => "Excellent",
            OverallStatus::Good => "Good",
            OverallStatus::NeedsImprovement => "Needs Improvement",
            OverallStatus::Poor => "Poor",
        };
        write!(f, "{label}")
    }
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fractional days between two timestamps.
pub fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn rounding_keeps_one_and_two_decimals() {
        assert_eq!(round1(74.979), 75.0);
        assert_eq!(round1(25.02), 25.0);
        assert_eq!(round2(33.333), 33.33);
    }

    #[test]
    fn days_between_handles_partial_days() {
        let open = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let close = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert!((days_between(open, close) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn ids_render_as_config_codes() {
        assert_eq!(KpiId::Sm002.to_string(), "SM002");
        assert_eq!(KrId::Kr6.to_string(), "KR6");
    }
}
