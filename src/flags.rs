use chrono::NaiveDateTime;

use crate::config::KpiConfig;
use crate::models::{days_between, FlaggedIncident, FlaggedRequest, Incident, Request};

/// Annotate incidents with derived compliance flags. Pure: the input
/// records are cloned into the result untouched. `as_of` anchors every
/// age calculation so a re-run over the same extract is reproducible.
pub fn derive_incident_flags(
    incidents: &[Incident],
    config: &KpiConfig,
    as_of: NaiveDateTime,
) -> Vec<FlaggedIncident> {
    let major_levels = &config.thresholds.priority.major_incident_levels;
    let backlog_days = config.thresholds.aging.backlog_days;
    let excluded_contacts = &config.kpis.sm004.exclusions.contact_types;

    incidents
        .iter()
        .map(|incident| {
            let days_open = incident
                .opened_at
                .map(|opened| days_between(opened, as_of))
                .unwrap_or(0.0);
            let days_to_resolve = match (incident.opened_at, incident.resolved_at) {
                (Some(opened), Some(resolved)) => Some(days_between(opened, resolved)),
                _ => None,
            };

            let is_resolved = incident.resolved_at.is_some();
            // Resolved incidents age by resolution latency, open ones by
            // elapsed time against as_of. Same threshold, one branch each.
            let is_backlog = if is_resolved {
                days_to_resolve.map(|days| days > backlog_days).unwrap_or(false)
            } else {
                days_open > backlog_days
            };

            let is_first_time_fix = incident.reassignment_count == 0;
            // A record without a contact type degrades FCR to the FTF flag.
            let is_first_call_resolution = is_first_time_fix
                && incident
                    .contact_type
                    .as_deref()
                    .map(|contact| !excluded_contacts.iter().any(|ex| ex == contact))
                    .unwrap_or(true);

            FlaggedIncident {
                is_p1: incident.priority_number == 1,
                is_p2: incident.priority_number == 2,
                is_major_incident: major_levels.contains(&incident.priority_number),
                is_resolved,
                is_backlog,
                is_first_time_fix,
                is_first_call_resolution,
                days_open,
                days_to_resolve,
                record: incident.clone(),
            }
        })
        .collect()
}

/// Annotate requests with aging and closure flags.
pub fn derive_request_flags(
    requests: &[Request],
    config: &KpiConfig,
    as_of: NaiveDateTime,
) -> Vec<FlaggedRequest> {
    let aging_days = config.thresholds.aging.request_aging_days;

    requests
        .iter()
        .map(|request| {
            let days_open = request
                .opened_at
                .map(|opened| days_between(opened, as_of))
                .unwrap_or(0.0);
            let days_to_close = match (request.opened_at, request.closed_at) {
                (Some(opened), Some(closed)) => Some(days_between(opened, closed)),
                _ => None,
            };

            FlaggedRequest {
                is_aged: days_open > aging_days,
                is_closed: request.closed_at.is_some(),
                days_open,
                days_to_close,
                record: request.clone(),
            }
        })
        .collect()
}
