use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::KpiConfig;
use crate::models::{
    round1, FlaggedIncident, FlaggedRequest, KpiId, KpiStatus, OverallStatus,
};

/// One scored KPI: the common header plus a kind-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct KpiResult {
    pub id: KpiId,
    pub name: String,
    pub status: KpiStatus,
    pub adherence_rate: f64,
    pub business_impact: String,
    pub detail: KpiDetail,
}

#[derive(Debug, Clone, Serialize)]
pub enum KpiDetail {
    MajorIncidents {
        p1_count: usize,
        p2_count: usize,
        total_major: usize,
        p1_target: u32,
        p2_target: u32,
    },
    Backlog {
        total_incidents: usize,
        backlog_count: usize,
        backlog_percentage: f64,
        target_adherence: f64,
    },
    RequestAging {
        total_requests: usize,
        aged_count: usize,
        aged_percentage: f64,
        target_adherence: f64,
    },
    FirstCallResolution {
        total_resolved: usize,
        fcr_count: usize,
        fcr_percentage: f64,
        target_rate: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallKpiScore {
    pub overall_score: f64,
    pub overall_status: OverallStatus,
    pub weights_used: BTreeMap<KpiId, f64>,
    pub kpi_scores: BTreeMap<KpiId, f64>,
    pub total_weight: f64,
}

/// The scored KPI set for one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KpiSet {
    pub results: BTreeMap<KpiId, KpiResult>,
    pub overall: Option<OverallKpiScore>,
}

impl KpiSet {
    pub fn get(&self, id: KpiId) -> Option<&KpiResult> {
        self.results.get(&id)
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

pub fn score_major_incidents(incidents: &[FlaggedIncident], config: &KpiConfig) -> KpiResult {
    let def = &config.kpis.sm001;
    let p1_count = incidents.iter().filter(|i| i.is_p1).count();
    let p2_count = incidents.iter().filter(|i| i.is_p2).count();
    let total_major = incidents.iter().filter(|i| i.is_major_incident).count();

    let p1_max = def.targets.p1_max.unwrap_or(0);
    let p2_max = def.targets.p2_max.unwrap_or(5);

    let (status, adherence_rate) = if p1_count > p1_max as usize {
        (KpiStatus::Critical, 0.0)
    } else if p2_count > p2_max as usize {
        (KpiStatus::Warning, 50.0)
    } else {
        (KpiStatus::Met, 100.0)
    };

    KpiResult {
        id: KpiId::Sm001,
        name: def.name.clone(),
        status,
        adherence_rate,
        business_impact: def.business_impact.clone(),
        detail: KpiDetail::MajorIncidents {
            p1_count,
            p2_count,
            total_major,
            p1_target: p1_max,
            p2_target: p2_max,
        },
    }
}

pub fn score_backlog(incidents: &[FlaggedIncident], config: &KpiConfig) -> KpiResult {
    let def = &config.kpis.sm002;
    let total_incidents = incidents.len();
    let backlog_count = incidents.iter().filter(|i| i.is_backlog).count();
    let backlog_percentage = percentage(backlog_count, total_incidents);
    let adherence_rate = 100.0 - backlog_percentage;
    let target_adherence = def.targets.adherence_min.unwrap_or(95.0);

    let status = if adherence_rate >= target_adherence {
        KpiStatus::Met
    } else if adherence_rate >= 80.0 {
        KpiStatus::Warning
    } else {
        KpiStatus::Critical
    };

    KpiResult {
        id: KpiId::Sm002,
        name: def.name.clone(),
        status,
        adherence_rate: round1(adherence_rate),
        business_impact: def.business_impact.clone(),
        detail: KpiDetail::Backlog {
            total_incidents,
            backlog_count,
            backlog_percentage: round1(backlog_percentage),
            target_adherence,
        },
    }
}

pub fn score_request_aging(requests: &[FlaggedRequest], config: &KpiConfig) -> KpiResult {
    let def = &config.kpis.sm003;
    let total_requests = requests.len();
    let aged_count = requests.iter().filter(|r| r.is_aged).count();
    let aged_percentage = percentage(aged_count, total_requests);
    let adherence_rate = 100.0 - aged_percentage;
    let target_adherence = def.targets.adherence_min.unwrap_or(95.0);

    let status = if adherence_rate >= target_adherence {
        KpiStatus::Met
    } else if adherence_rate >= 80.0 {
        KpiStatus::Warning
    } else {
        KpiStatus::Critical
    };

    KpiResult {
        id: KpiId::Sm003,
        name: def.name.clone(),
        status,
        adherence_rate: round1(adherence_rate),
        business_impact: def.business_impact.clone(),
        detail: KpiDetail::RequestAging {
            total_requests,
            aged_count,
            aged_percentage: round1(aged_percentage),
            target_adherence,
        },
    }
}

/// First call resolution over resolved incidents only.
pub fn score_first_call_resolution(
    incidents: &[FlaggedIncident],
    config: &KpiConfig,
) -> KpiResult {
    let def = &config.kpis.sm004;
    let total_resolved = incidents.iter().filter(|i| i.is_resolved).count();
    let fcr_count = incidents
        .iter()
        .filter(|i| i.is_resolved && i.is_first_call_resolution)
        .count();
    let fcr_percentage = percentage(fcr_count, total_resolved);
    let target_rate = def.targets.ftf_rate_min.unwrap_or(80.0);

    let status = if fcr_percentage >= target_rate {
        KpiStatus::Met
    } else if fcr_percentage >= target_rate - 10.0 {
        KpiStatus::Warning
    } else {
        KpiStatus::Critical
    };

    KpiResult {
        id: KpiId::Sm004,
        name: def.name.clone(),
        status,
        adherence_rate: round1(fcr_percentage),
        business_impact: def.business_impact.clone(),
        detail: KpiDetail::FirstCallResolution {
            total_resolved,
            fcr_count,
            fcr_percentage: round1(fcr_percentage),
            target_rate,
        },
    }
}

/// Weight table for the run. The standard four-KPI table applies while
/// SM003 is enabled; otherwise the configured three-KPI alternate.
pub fn kpi_weights(config: &KpiConfig) -> BTreeMap<KpiId, f64> {
    let scoring = &config.global_status_rules.scorecard_scoring;
    let mut weights = BTreeMap::new();

    if config.kpis.sm003.enabled {
        weights.insert(KpiId::Sm001, scoring.weight_sm001);
        weights.insert(KpiId::Sm002, scoring.weight_sm002);
        weights.insert(KpiId::Sm003, scoring.weight_sm003);
        weights.insert(KpiId::Sm004, scoring.weight_sm004);
    } else {
        let (sm001, sm002, sm004) = scoring
            .sm003_disabled_weights
            .clone()
            .unwrap_or_default()
            .resolved();
        weights.insert(KpiId::Sm001, sm001);
        weights.insert(KpiId::Sm002, sm002);
        weights.insert(KpiId::Sm004, sm004);
    }

    weights
}

/// Weighted average over whichever KPIs are actually present; the
/// denominator is the sum of weights applied, never a fixed constant.
pub fn overall_score(
    results: &BTreeMap<KpiId, KpiResult>,
    config: &KpiConfig,
) -> OverallKpiScore {
    let weights = kpi_weights(config);

    let mut total_score = 0.0;
    let mut total_weight = 0.0;
    let mut kpi_scores = BTreeMap::new();

    for (&id, &weight) in &weights {
        let Some(result) = results.get(&id) else {
            continue;
        };
        kpi_scores.insert(id, result.adherence_rate);
        total_score += result.adherence_rate * weight / 100.0;
        total_weight += weight;
    }

    let score = if total_weight > 0.0 {
        total_score / total_weight * 100.0
    } else {
        0.0
    };

    let bands = &config.global_status_rules.performance_bands;
    let overall_status = if score >= bands.excellent {
        OverallStatus::Excellent
    } else if score >= bands.good {
        OverallStatus::Good
    } else if score >= bands.needs_improvement {
        OverallStatus::NeedsImprovement
    } else {
        OverallStatus::Poor
    };

    OverallKpiScore {
        overall_score: round1(score),
        overall_status,
        weights_used: weights,
        kpi_scores,
        total_weight,
    }
}

/// Score every enabled KPI and the weighted overall.
pub fn score_all(
    incidents: &[FlaggedIncident],
    requests: Option<&[FlaggedRequest]>,
    config: &KpiConfig,
) -> KpiSet {
    let mut results = BTreeMap::new();

    if config.kpis.sm001.enabled {
        results.insert(KpiId::Sm001, score_major_incidents(incidents, config));
    }
    if config.kpis.sm002.enabled {
        results.insert(KpiId::Sm002, score_backlog(incidents, config));
    }
    if config.kpis.sm003.enabled {
        if let Some(requests) = requests {
            results.insert(KpiId::Sm003, score_request_aging(requests, config));
        }
    }
    if config.kpis.sm004.enabled {
        results.insert(
            KpiId::Sm004,
            score_first_call_resolution(incidents, config),
        );
    }

    let overall = overall_score(&results, config);
    KpiSet {
        results,
        overall: Some(overall),
    }
}
