use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::config::{OkrConfig, ScoringMethod, TriggerDef};
use crate::kpi::{KpiDetail, KpiResult, KpiSet};
use crate::models::{round1, KpiId, KrId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KrStatus {
    Excellent,
    Good,
    AtRisk,
    Critical,
    /// The KR's linked KPI produced no result this run.
    Error,
}

impl fmt::Display for KrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            KrStatus::Excellent => "Excellent",
            KrStatus::Good => "Good",
            KrStatus::AtRisk => "At Risk",
            KrStatus::Critical => "Critical",
            KrStatus::Error => "Error",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KrScore {
    pub kr_id: KrId,
    pub name: String,
    pub description: String,
    pub linked_kpi: KpiId,
    pub current_value: f64,
    pub target_value: f64,
    pub target_operator: String,
    pub score: f64,
    pub status: KrStatus,
    pub gap_to_target: f64,
    pub deadline: NaiveDate,
    pub days_remaining: i64,
    pub criticality: String,
    pub owner: String,
    pub business_impact: String,
    /// Set only on missing-KPI stubs.
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkrResult {
    pub okr_id: String,
    pub okr_name: String,
    pub objective: String,
    pub overall_score: f64,
    pub overall_status: String,
    pub key_results: BTreeMap<KrId, KrScore>,
    pub weights: BTreeMap<KrId, f64>,
    pub as_of: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionTrigger {
    pub kr_id: KrId,
    pub action: String,
    pub escalation: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionTriggers {
    pub critical: Vec<ActionTrigger>,
    pub warning: Vec<ActionTrigger>,
}

/// Maps the KPI scorecard onto weighted key results. Holds only borrowed
/// inputs; every call recomputes from them, so repeated calls with the
/// same inputs agree.
pub struct OkrScorer<'a> {
    config: &'a OkrConfig,
    kpis: &'a KpiSet,
}

impl<'a> OkrScorer<'a> {
    pub fn new(config: &'a OkrConfig, kpis: &'a KpiSet) -> Self {
        Self { config, kpis }
    }

    /// The metric a KR scores against, extracted from its linked KPI.
    fn current_value(kpi: &KpiResult) -> f64 {
        match &kpi.detail {
            KpiDetail::MajorIncidents { total_major, .. } => *total_major as f64,
            KpiDetail::Backlog { backlog_percentage, .. } => *backlog_percentage,
            KpiDetail::RequestAging { aged_percentage, .. } => *aged_percentage,
            KpiDetail::FirstCallResolution { fcr_percentage, .. } => *fcr_percentage,
        }
    }

    pub fn kr_score(&self, kr_id: KrId, as_of: NaiveDateTime) -> KrScore {
        let def = self.config.key_result(kr_id);
        let deadline = def.deadline.date;
        let days_remaining = days_until(deadline, as_of);
        let target_value = def.target.value;

        let Some(kpi) = self.kpis.get(def.calculation_source.kpi_id) else {
            tracing::warn!(
                kr = %kr_id,
                kpi = %def.calculation_source.kpi_id,
                "linked KPI missing from results, emitting stub"
            );
            return KrScore {
                kr_id,
                name: def.name.clone(),
                description: def.description.clone(),
                linked_kpi: def.calculation_source.kpi_id,
                current_value: 0.0,
                target_value,
                target_operator: def.target.operator.clone(),
                score: 0.0,
                status: KrStatus::Error,
                gap_to_target: 0.0,
                deadline,
                days_remaining,
                criticality: def.deadline.criticality.clone(),
                owner: def.owner.clone(),
                business_impact: def.business_impact.clone(),
                note: Some(format!(
                    "KPI {} not found in results",
                    def.calculation_source.kpi_id
                )),
            };
        };

        let current_value = Self::current_value(kpi);
        let raw_score = match def.scoring.method {
            // Lower is better, measured against the target itself.
            ScoringMethod::InversePercentage => 100.0 - current_value / target_value * 100.0,
            // Higher is better.
            ScoringMethod::DirectPercentage => current_value / target_value * 100.0,
            // Lower count is better, measured against a tolerated ceiling.
            ScoringMethod::InverseCount => {
                let max_acceptable =
                    def.scoring.max_acceptable.unwrap_or(target_value * 4.0);
                100.0 - current_value / max_acceptable * 100.0
            }
        };
        let score = raw_score.clamp(def.scoring.clamp_min, def.scoring.clamp_max);

        let bands = &def.scoring.performance_bands;
        let status = if score >= bands.excellent.min_score {
            KrStatus::Excellent
        } else if score >= bands.good.min_score {
            KrStatus::Good
        } else if score >= bands.at_risk.min_score {
            KrStatus::AtRisk
        } else {
            KrStatus::Critical
        };

        KrScore {
            kr_id,
            name: def.name.clone(),
            description: def.description.clone(),
            linked_kpi: def.calculation_source.kpi_id,
            current_value: round1(current_value),
            target_value,
            target_operator: def.target.operator.clone(),
            score: round1(score),
            status,
            gap_to_target: round1(current_value - target_value),
            deadline,
            days_remaining,
            criticality: def.deadline.criticality.clone(),
            owner: def.owner.clone(),
            business_impact: def.business_impact.clone(),
            note: None,
        }
    }

    /// Weighted overall OKR score. Recomputes all four KRs each call.
    pub fn overall(&self, as_of: NaiveDateTime) -> OkrResult {
        let mut key_results = BTreeMap::new();
        for kr_id in KrId::ALL {
            key_results.insert(kr_id, self.kr_score(kr_id, as_of));
        }

        let mut weights = self.config.weighting.weights.clone();
        let weight_sum: f64 = weights.values().sum();
        if (weight_sum - 100.0).abs() > 1e-9 && weight_sum > 0.0 {
            tracing::warn!(weight_sum, "KR weights do not sum to 100, normalizing");
            for weight in weights.values_mut() {
                *weight = *weight / weight_sum * 100.0;
            }
        }

        let overall_score: f64 = KrId::ALL
            .iter()
            .map(|kr_id| key_results[kr_id].score * weights[kr_id] / 100.0)
            .sum();

        let bands = self.config.weighting.overall_score.performance_bands.descending();
        let overall_status = bands
            .iter()
            .find(|band| overall_score >= band.min_score)
            .map(|band| band.status.clone())
            .unwrap_or_else(|| {
                self.config
                    .weighting
                    .overall_score
                    .performance_bands
                    .critical
                    .status
                    .clone()
            });

        OkrResult {
            okr_id: self.config.metadata.okr_id.clone(),
            okr_name: self.config.metadata.okr_name.clone(),
            objective: self.config.objective.description.clone(),
            overall_score: round1(overall_score),
            overall_status,
            key_results,
            weights,
            as_of,
        }
    }

    /// Threshold conditions are fixed here; configuration only decides
    /// whether a trigger of that severity exists for the KR at all.
    pub fn action_triggers(&self, as_of: NaiveDateTime) -> ActionTriggers {
        let okr = self.overall(as_of);
        let mut triggers = ActionTriggers::default();

        let push = |bucket: &mut Vec<ActionTrigger>, kr_id: KrId, def: &TriggerDef| {
            bucket.push(ActionTrigger {
                kr_id,
                action: def.action.clone(),
                escalation: def.escalation.clone(),
            });
        };

        let kr3 = &okr.key_results[&KrId::Kr3];
        if let Some(config) = self.config.action_triggers.get(&KrId::Kr3) {
            if let Some(def) = &config.critical {
                if kr3.current_value > 15.0 {
                    push(&mut triggers.critical, KrId::Kr3, def);
                }
            }
            if let Some(def) = &config.warning {
                if kr3.current_value > 5.0 {
                    push(&mut triggers.warning, KrId::Kr3, def);
                }
            }
        }

        let kr4 = &okr.key_results[&KrId::Kr4];
        if let Some(config) = self.config.action_triggers.get(&KrId::Kr4) {
            if let Some(def) = &config.critical {
                if kr4.days_remaining < 7 && kr4.current_value > 15.0 {
                    push(&mut triggers.critical, KrId::Kr4, def);
                }
            }
            if let Some(def) = &config.warning {
                if kr4.current_value > 10.0 {
                    push(&mut triggers.warning, KrId::Kr4, def);
                }
            }
        }

        let kr5 = &okr.key_results[&KrId::Kr5];
        if let Some(config) = self.config.action_triggers.get(&KrId::Kr5) {
            if let Some(def) = &config.warning {
                if kr5.current_value > 10.0 {
                    push(&mut triggers.warning, KrId::Kr5, def);
                }
            }
        }

        let kr6 = &okr.key_results[&KrId::Kr6];
        if let Some(config) = self.config.action_triggers.get(&KrId::Kr6) {
            if let Some(def) = &config.critical {
                if kr6.current_value < 50.0 {
                    push(&mut triggers.critical, KrId::Kr6, def);
                }
            }
            if let Some(def) = &config.warning {
                if kr6.current_value < 70.0 {
                    push(&mut triggers.warning, KrId::Kr6, def);
                }
            }
        }

        tracing::info!(
            critical = triggers.critical.len(),
            warning = triggers.warning.len(),
            "evaluated action triggers"
        );
        triggers
    }
}

fn days_until(deadline: NaiveDate, as_of: NaiveDateTime) -> i64 {
    (deadline.and_time(NaiveTime::MIN) - as_of).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KpiStatus;

    fn as_of() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn kpi_set(
        total_major: usize,
        backlog_pct: f64,
        aged_pct: f64,
        fcr_pct: f64,
    ) -> KpiSet {
        let mut set = KpiSet::default();
        set.results.insert(
            KpiId::Sm001,
            KpiResult {
                id: KpiId::Sm001,
                name: "Major Incidents".into(),
                status: KpiStatus::Met,
                adherence_rate: 100.0,
                business_impact: String::new(),
                detail: KpiDetail::MajorIncidents {
                    p1_count: 0,
                    p2_count: total_major,
                    total_major,
                    p1_target: 0,
                    p2_target: 5,
                },
            },
        );
        set.results.insert(
            KpiId::Sm002,
            KpiResult {
                id: KpiId::Sm002,
                name: "Backlog".into(),
                status: KpiStatus::Warning,
                adherence_rate: 100.0 - backlog_pct,
                business_impact: String::new(),
                detail: KpiDetail::Backlog {
                    total_incidents: 100,
                    backlog_count: backlog_pct as usize,
                    backlog_percentage: backlog_pct,
                    target_adherence: 95.0,
                },
            },
        );
        set.results.insert(
            KpiId::Sm003,
            KpiResult {
                id: KpiId::Sm003,
                name: "Request Aging".into(),
                status: KpiStatus::Met,
                adherence_rate: 100.0 - aged_pct,
                business_impact: String::new(),
                detail: KpiDetail::RequestAging {
                    total_requests: 100,
                    aged_count: aged_pct as usize,
                    aged_percentage: aged_pct,
                    target_adherence: 95.0,
                },
            },
        );
        set.results.insert(
            KpiId::Sm004,
            KpiResult {
                id: KpiId::Sm004,
                name: "First Call Resolution".into(),
                status: KpiStatus::Warning,
                adherence_rate: fcr_pct,
                business_impact: String::new(),
                detail: KpiDetail::FirstCallResolution {
                    total_resolved: 100,
                    fcr_count: fcr_pct as usize,
                    fcr_percentage: fcr_pct,
                    target_rate: 80.0,
                },
            },
        );
        set
    }

    #[test]
    fn kr4_inverse_percentage_clamps_at_zero() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(3, 25.0, 4.5, 31.8);
        let scorer = OkrScorer::new(&config, &kpis);

        let kr4 = scorer.kr_score(KrId::Kr4, as_of());
        // 100 - 25/10*100 = -150, clamped to the configured floor.
        assert_eq!(kr4.score, 0.0);
        assert_eq!(kr4.status, KrStatus::Critical);
        assert_eq!(kr4.current_value, 25.0);
        assert_eq!(kr4.gap_to_target, 15.0);
    }

    #[test]
    fn kr6_direct_percentage_scores_proportionally() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(3, 25.0, 4.5, 31.8);
        let scorer = OkrScorer::new(&config, &kpis);

        let kr6 = scorer.kr_score(KrId::Kr6, as_of());
        // (31.8 / 80) * 100
        assert_eq!(kr6.score, 39.8);
        assert_eq!(kr6.status, KrStatus::Critical);
    }

    #[test]
    fn kr3_inverse_count_uses_max_acceptable() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(18, 5.0, 2.0, 90.0);
        let scorer = OkrScorer::new(&config, &kpis);

        let kr3 = scorer.kr_score(KrId::Kr3, as_of());
        // 100 - 18/20*100
        assert_eq!(kr3.score, 10.0);
        assert_eq!(kr3.status, KrStatus::Critical);
    }

    #[test]
    fn kr_score_is_idempotent() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(3, 25.0, 4.5, 31.8);
        let scorer = OkrScorer::new(&config, &kpis);

        let first = scorer.kr_score(KrId::Kr5, as_of());
        let second = scorer.kr_score(KrId::Kr5, as_of());
        assert_eq!(first.score, second.score);
        assert_eq!(first.status, second.status);
        assert_eq!(first.days_remaining, second.days_remaining);
    }

    #[test]
    fn missing_kpi_yields_error_stub_not_failure() {
        let config = crate::config::test_okr_config();
        let mut kpis = kpi_set(3, 25.0, 4.5, 31.8);
        kpis.results.remove(&KpiId::Sm003);
        let scorer = OkrScorer::new(&config, &kpis);

        let kr5 = scorer.kr_score(KrId::Kr5, as_of());
        assert_eq!(kr5.status, KrStatus::Error);
        assert_eq!(kr5.score, 0.0);
        assert!(kr5.note.as_deref().unwrap_or("").contains("SM003"));

        // The overall computation still proceeds with the stub.
        let okr = scorer.overall(as_of());
        assert_eq!(okr.key_results.len(), 4);
    }

    #[test]
    fn overall_weights_renormalize_when_config_drifts() {
        let mut config = crate::config::test_okr_config();
        for weight in config.weighting.weights.values_mut() {
            *weight *= 2.0; // sums to 200
        }
        let kpis = kpi_set(3, 25.0, 4.5, 31.8);
        let scorer = OkrScorer::new(&config, &kpis);

        let okr = scorer.overall(as_of());
        let weight_sum: f64 = okr.weights.values().sum();
        assert!((weight_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn overall_status_comes_from_first_matching_band() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(0, 0.0, 0.0, 95.0);
        let scorer = OkrScorer::new(&config, &kpis);

        let okr = scorer.overall(as_of());
        assert!(okr.overall_score >= 90.0);
        assert!(okr.overall_status.starts_with("Excellent"));
    }

    #[test]
    fn triggers_fire_on_fixed_thresholds() {
        let config = crate::config::test_okr_config();
        // 18 majors, 25% backlog, 12% aged, 45% FCR: everything fires.
        let kpis = kpi_set(18, 25.0, 12.0, 45.0);
        let scorer = OkrScorer::new(&config, &kpis);

        let triggers = scorer.action_triggers(as_of());
        let critical: Vec<KrId> = triggers.critical.iter().map(|t| t.kr_id).collect();
        let warning: Vec<KrId> = triggers.warning.iter().map(|t| t.kr_id).collect();

        assert!(critical.contains(&KrId::Kr3));
        assert!(critical.contains(&KrId::Kr6));
        assert!(warning.contains(&KrId::Kr3));
        assert!(warning.contains(&KrId::Kr4));
        assert!(warning.contains(&KrId::Kr5));
        assert!(warning.contains(&KrId::Kr6));
        // KR4 critical also needs the deadline within a week.
        assert!(!critical.contains(&KrId::Kr4));
    }

    #[test]
    fn kr4_critical_trigger_needs_imminent_deadline() {
        let config = crate::config::test_okr_config();
        let kpis = kpi_set(0, 25.0, 0.0, 90.0);
        let scorer = OkrScorer::new(&config, &kpis);

        let near_deadline = NaiveDate::from_ymd_opt(2026, 12, 28)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let triggers = scorer.action_triggers(near_deadline);
        assert!(triggers.critical.iter().any(|t| t.kr_id == KrId::Kr4));
    }

    #[test]
    fn triggers_absent_from_config_never_fire() {
        let mut config = crate::config::test_okr_config();
        config.action_triggers.remove(&KrId::Kr3);
        let kpis = kpi_set(18, 0.0, 0.0, 90.0);
        let scorer = OkrScorer::new(&config, &kpis);

        let triggers = scorer.action_triggers(as_of());
        assert!(!triggers.critical.iter().any(|t| t.kr_id == KrId::Kr3));
        assert!(!triggers.warning.iter().any(|t| t.kr_id == KrId::Kr3));
    }
}
