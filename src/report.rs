use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::geo::GeoAnalysis;
use crate::kpi::{KpiDetail, KpiResult, KpiSet};
use crate::okr::{ActionTriggers, OkrResult};

/// One-line measure summary for a KPI's kind-specific payload.
pub fn describe_detail(result: &KpiResult) -> String {
    match &result.detail {
        KpiDetail::MajorIncidents {
            p1_count,
            p2_count,
            total_major,
            p1_target,
            p2_target,
        } => format!(
            "P1 {p1_count} (max {p1_target}), P2 {p2_count} (max {p2_target}), total major {total_major}"
        ),
        KpiDetail::Backlog {
            total_incidents,
            backlog_count,
            backlog_percentage,
            ..
        } => format!("{backlog_count} of {total_incidents} incidents aged ({backlog_percentage}%)"),
        KpiDetail::RequestAging {
            total_requests,
            aged_count,
            aged_percentage,
            ..
        } => format!("{aged_count} of {total_requests} requests aged ({aged_percentage}%)"),
        KpiDetail::FirstCallResolution {
            total_resolved,
            fcr_count,
            fcr_percentage,
            ..
        } => format!("{fcr_count} of {total_resolved} resolved first call ({fcr_percentage}%)"),
    }
}

pub fn build_report(
    kpis: &KpiSet,
    okr: &OkrResult,
    triggers: &ActionTriggers,
    geo: &GeoAnalysis,
    as_of: NaiveDateTime,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Service Desk KPI Scorecard");
    let _ = writeln!(output, "Generated as of {}", as_of.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(output);

    if let Some(overall) = &kpis.overall {
        let _ = writeln!(output, "## Executive Summary");
        let _ = writeln!(
            output,
            "Overall KPI score **{:.1}%** ({})",
            overall.overall_score, overall.overall_status
        );
        let _ = writeln!(
            output,
            "Overall OKR {} score **{:.1}%** ({})",
            okr.okr_id, okr.overall_score, okr.overall_status
        );
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## KPI Scorecard");
    let _ = writeln!(output, "| KPI | Name | Status | Adherence | Detail |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for result in kpis.results.values() {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.1}% | {} |",
            result.id,
            result.name,
            result.status,
            result.adherence_rate,
            describe_detail(result)
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## OKR {}: {}", okr.okr_id, okr.okr_name);
    if !okr.objective.is_empty() {
        let _ = writeln!(output, "Objective: {}", okr.objective);
    }
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "| KR | Name | Score | Status | Current | Target | Gap | Deadline | Owner |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
    for kr in okr.key_results.values() {
        let _ = writeln!(
            output,
            "| {} | {} | {:.1} | {} | {} | {} {} | {} | {} ({} days) | {} |",
            kr.kr_id,
            kr.name,
            kr.score,
            kr.status,
            kr.current_value,
            kr.target_operator,
            kr.target_value,
            kr.gap_to_target,
            kr.deadline,
            kr.days_remaining,
            kr.owner
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Action Triggers");
    if triggers.critical.is_empty() && triggers.warning.is_empty() {
        let _ = writeln!(output, "No action triggers fired.");
    } else {
        for trigger in &triggers.critical {
            let _ = writeln!(
                output,
                "- CRITICAL {}: {} (escalate to {})",
                trigger.kr_id, trigger.action, trigger.escalation
            );
        }
        for trigger in &triggers.warning {
            let _ = writeln!(
                output,
                "- WARNING {}: {} (escalate to {})",
                trigger.kr_id, trigger.action, trigger.escalation
            );
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Geography");
    let _ = writeln!(output, "### Countries by Volume");
    for country in &geo.country_summary {
        let _ = writeln!(
            output,
            "- {}: {} records, backlog {:.2}%, FCR {:.2}%, {} ({})",
            country.country,
            country.total_volume,
            country.backlog_pct,
            country.fcr_rate,
            country.tier_name,
            country.intervention_priority
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "### Top Performing Locations");
    if geo.top_performers.is_empty() {
        let _ = writeln!(output, "No locations in this extract.");
    }
    for site in &geo.top_performers {
        let _ = writeln!(
            output,
            "- {} ({}): FCR {:.2}%, backlog {:.2}%",
            site.location.as_deref().unwrap_or("-"),
            site.country,
            site.fcr_rate,
            site.backlog_pct
        );
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "### Locations Needing Intervention");
    let summary = &geo.intervention_summary;
    let _ = writeln!(
        output,
        "{} locations: {} critical, {} high, {} monitor, {} standard",
        summary.total_locations,
        summary.critical_count,
        summary.high_count,
        summary.monitor_count,
        summary.standard_count
    );
    for site in summary
        .critical_locations
        .iter()
        .chain(&summary.high_priority_locations)
    {
        let _ = writeln!(
            output,
            "- {} ({}) [{}]: {} records, backlog {:.2}%, FCR {:.2}%",
            site.location.as_deref().unwrap_or("-"),
            site.country,
            site.intervention_priority,
            site.total_volume,
            site.backlog_pct,
            site.fcr_rate
        );
    }

    output
}
