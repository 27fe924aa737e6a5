use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::geo::{AreaMetrics, GeoAnalysis};
use crate::kpi::KpiSet;
use crate::okr::{ActionTriggers, OkrResult};
use crate::report::describe_detail;

fn sheet_writer(dir: &Path, name: &str) -> anyhow::Result<(csv::Writer<std::fs::File>, PathBuf)> {
    let path = dir.join(name);
    let writer = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create export sheet {}", path.display()))?;
    Ok((writer, path))
}

fn write_area_rows(
    writer: &mut csv::Writer<std::fs::File>,
    rows: &[AreaMetrics],
    with_location: bool,
) -> anyhow::Result<()> {
    let mut header = vec![
        "country",
        "total_volume",
        "backlog_count",
        "backlog_pct",
        "major_incident_count",
        "major_incident_rate",
        "fcr_count",
        "eligible_fcr_count",
        "fcr_rate",
        "volume_tier",
        "tier_name",
        "intervention_priority",
    ];
    if with_location {
        header.insert(0, "location");
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.country.clone(),
            row.total_volume.to_string(),
            row.backlog_count.to_string(),
            format!("{:.2}", row.backlog_pct),
            row.major_incident_count.to_string(),
            format!("{:.2}", row.major_incident_rate),
            row.fcr_count.to_string(),
            row.eligible_fcr_count.to_string(),
            format!("{:.2}", row.fcr_rate),
            row.volume_tier.to_string(),
            row.tier_name.clone(),
            row.intervention_priority.to_string(),
        ];
        if with_location {
            record.insert(0, row.location.clone().unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the scorecard as a directory of CSV sheets, one file per
/// workbook sheet. Returns the files written.
pub fn export_workbook(
    dir: &Path,
    kpis: &KpiSet,
    okr: &OkrResult,
    triggers: &ActionTriggers,
    geo: &GeoAnalysis,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let mut written = Vec::new();

    let (mut writer, path) = sheet_writer(dir, "kpi_scorecard.csv")?;
    writer.write_record([
        "kpi",
        "name",
        "status",
        "adherence_rate",
        "detail",
        "business_impact",
    ])?;
    for result in kpis.results.values() {
        writer.write_record([
            result.id.to_string(),
            result.name.clone(),
            result.status.to_string(),
            format!("{:.1}", result.adherence_rate),
            describe_detail(result),
            result.business_impact.clone(),
        ])?;
    }
    if let Some(overall) = &kpis.overall {
        writer.write_record([
            "OVERALL".to_string(),
            "Weighted scorecard".to_string(),
            overall.overall_status.to_string(),
            format!("{:.1}", overall.overall_score),
            format!("total weight {:.0}", overall.total_weight),
            String::new(),
        ])?;
    }
    writer.flush()?;
    written.push(path);

    let (mut writer, path) = sheet_writer(dir, "key_results.csv")?;
    writer.write_record([
        "kr",
        "name",
        "linked_kpi",
        "score",
        "status",
        "current_value",
        "target_operator",
        "target_value",
        "gap_to_target",
        "deadline",
        "days_remaining",
        "criticality",
        "owner",
    ])?;
    for kr in okr.key_results.values() {
        writer.write_record([
            kr.kr_id.to_string(),
            kr.name.clone(),
            kr.linked_kpi.to_string(),
            format!("{:.1}", kr.score),
            kr.status.to_string(),
            format!("{:.1}", kr.current_value),
            kr.target_operator.clone(),
            format!("{}", kr.target_value),
            format!("{:.1}", kr.gap_to_target),
            kr.deadline.to_string(),
            kr.days_remaining.to_string(),
            kr.criticality.clone(),
            kr.owner.clone(),
        ])?;
    }
    writer.flush()?;
    written.push(path);

    let (mut writer, path) = sheet_writer(dir, "action_triggers.csv")?;
    writer.write_record(["severity", "kr", "action", "escalation"])?;
    for trigger in &triggers.critical {
        writer.write_record([
            "critical".to_string(),
            trigger.kr_id.to_string(),
            trigger.action.clone(),
            trigger.escalation.clone(),
        ])?;
    }
    for trigger in &triggers.warning {
        writer.write_record([
            "warning".to_string(),
            trigger.kr_id.to_string(),
            trigger.action.clone(),
            trigger.escalation.clone(),
        ])?;
    }
    writer.flush()?;
    written.push(path);

    let (mut writer, path) = sheet_writer(dir, "country_summary.csv")?;
    write_area_rows(&mut writer, &geo.country_summary, false)?;
    written.push(path);

    let (mut writer, path) = sheet_writer(dir, "location_summary.csv")?;
    write_area_rows(&mut writer, &geo.location_summary, true)?;
    written.push(path);

    let (mut writer, path) = sheet_writer(dir, "interventions.csv")?;
    let summary = &geo.intervention_summary;
    let hotspots: Vec<AreaMetrics> = summary
        .critical_locations
        .iter()
        .chain(&summary.high_priority_locations)
        .cloned()
        .collect();
    write_area_rows(&mut writer, &hotspots, true)?;
    written.push(path);

    tracing::info!(sheets = written.len(), dir = %dir.display(), "exported scorecard sheets");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags;
    use crate::geo;
    use crate::kpi;
    use crate::okr::OkrScorer;
    use chrono::NaiveDate;

    #[test]
    fn workbook_writes_every_sheet() {
        let kpi_config = crate::config::test_kpi_config();
        let okr_config = crate::config::test_okr_config();
        let as_of = NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let incidents = flags::derive_incident_flags(&[], &kpi_config, as_of);
        let kpis = kpi::score_all(&incidents, None, &kpi_config);
        let scorer = OkrScorer::new(&okr_config, &kpis);
        let okr = scorer.overall(as_of);
        let triggers = scorer.action_triggers(as_of);
        let analysis = geo::analyze(
            &incidents,
            &[],
            &kpi_config,
            &okr_config.geographic_analysis,
            10,
        );

        let dir = tempfile::tempdir().unwrap();
        let written =
            export_workbook(dir.path(), &kpis, &okr, &triggers, &analysis).unwrap();

        assert_eq!(written.len(), 6);
        for path in &written {
            assert!(path.exists(), "missing sheet {}", path.display());
        }
        let scorecard = std::fs::read_to_string(dir.path().join("kpi_scorecard.csv")).unwrap();
        assert!(scorecard.contains("SM001"));
        assert!(scorecard.contains("OVERALL"));
    }
}
