use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Deserialize;

use crate::config::KpiConfig;
use crate::models::{Incident, Request};

#[derive(Debug, Deserialize)]
struct IncidentRow {
    number: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "incident_state")]
    state: Option<String>,
    #[serde(default)]
    opened_at: Option<String>,
    #[serde(default, alias = "u_resolved")]
    resolved_at: Option<String>,
    #[serde(default)]
    reassignment_count: Option<u32>,
    #[serde(default)]
    contact_type: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, alias = "location_country")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestRow {
    number: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    opened_at: Option<String>,
    #[serde(default)]
    closed_at: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(
        default,
        alias = "location_country",
        alias = "request_item_u_opened_on_behalf_of_location_country"
    )]
    country: Option<String>,
}

/// Extract the first integer from a free-text priority ("2 - High" -> 2).
/// Unparseable values fall back to the configured sentinel.
pub fn extract_priority_number(raw: Option<&str>, fallback: u32) -> u32 {
    let Some(raw) = raw else {
        return fallback;
    };
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(fallback)
}

/// Parse an export timestamp, degrading to None on anything unparseable
/// (mirrors coercing bad dates to missing rather than failing the run).
pub fn parse_datetime(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

/// Rewrite extract headers to internal field names using the configured
/// column mappings, so the row structs see a stable schema.
fn remap_headers(reader: &mut csv::Reader<std::fs::File>, config: &KpiConfig) -> anyhow::Result<()> {
    let headers = reader.headers()?.clone();
    let renamed: StringRecord = headers
        .iter()
        .map(|header| config.internal_field(header))
        .collect();
    reader.set_headers(renamed);
    Ok(())
}

pub fn load_incidents(path: &Path, config: &KpiConfig) -> anyhow::Result<Vec<Incident>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("incidents file not found: {}", path.display()))?;
    remap_headers(&mut reader, config)?;

    let fallback = config.processing.priority_extraction.fallback_value;
    let mut incidents = Vec::new();

    for result in reader.deserialize::<IncidentRow>() {
        let row = result.with_context(|| format!("malformed incident row in {}", path.display()))?;
        let priority = normalize(row.priority);
        incidents.push(Incident {
            priority_number: extract_priority_number(priority.as_deref(), fallback),
            priority,
            number: row.number,
            state: normalize(row.state),
            opened_at: parse_datetime(row.opened_at.as_deref()),
            resolved_at: parse_datetime(row.resolved_at.as_deref()),
            reassignment_count: row.reassignment_count.unwrap_or(0),
            contact_type: normalize(row.contact_type),
            location: normalize(row.location),
            country: normalize(row.country),
        });
    }

    tracing::info!(count = incidents.len(), path = %path.display(), "loaded incidents");
    Ok(incidents)
}

pub fn load_requests(path: &Path, config: &KpiConfig) -> anyhow::Result<Vec<Request>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("requests file not found: {}", path.display()))?;
    remap_headers(&mut reader, config)?;

    let mut requests = Vec::new();

    for result in reader.deserialize::<RequestRow>() {
        let row = result.with_context(|| format!("malformed request row in {}", path.display()))?;
        requests.push(Request {
            number: row.number,
            state: normalize(row.state),
            opened_at: parse_datetime(row.opened_at.as_deref()),
            closed_at: parse_datetime(row.closed_at.as_deref()),
            location: normalize(row.location),
            country: normalize(row.country),
        });
    }

    tracing::info!(count = requests.len(), path = %path.display(), "loaded requests");
    Ok(requests)
}
