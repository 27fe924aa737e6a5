use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::config::{GeoConfig, KpiConfig, TierDef};
use crate::models::{round2, FlaggedIncident, FlaggedRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VolumeTier {
    #[serde(rename = "tier_1")]
    Tier1,
    #[serde(rename = "tier_2")]
    Tier2,
    #[serde(rename = "tier_3")]
    Tier3,
    #[serde(rename = "tier_4")]
    Tier4,
}

impl fmt::Display for VolumeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VolumeTier::Tier1 => "tier_1",
            VolumeTier::Tier2 => "tier_2",
            VolumeTier::Tier3 => "tier_3",
            VolumeTier::Tier4 => "tier_4",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterventionPriority {
    Critical,
    High,
    Monitor,
    Standard,
}

impl fmt::Display for InterventionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterventionPriority::Critical => "Critical",
            InterventionPriority::High => "High",
            InterventionPriority::Monitor => "Monitor",
            InterventionPriority::Standard => "Standard",
        };
        write!(f, "{label}")
    }
}

/// Aggregated metrics for one geographic area; `location` is None for
/// country-level rows.
#[derive(Debug, Clone, Serialize)]
pub struct AreaMetrics {
    pub location: Option<String>,
    pub country: String,
    pub total_volume: usize,
    pub backlog_count: usize,
    pub major_incident_count: usize,
    pub fcr_count: usize,
    pub eligible_fcr_count: usize,
    pub backlog_pct: f64,
    pub fcr_rate: f64,
    pub major_incident_rate: f64,
    pub volume_tier: VolumeTier,
    pub tier_name: String,
    pub intervention_priority: InterventionPriority,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterventionSummary {
    pub total_locations: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub monitor_count: usize,
    pub standard_count: usize,
    pub critical_locations: Vec<AreaMetrics>,
    pub high_priority_locations: Vec<AreaMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoAnalysis {
    pub country_summary: Vec<AreaMetrics>,
    pub location_summary: Vec<AreaMetrics>,
    pub top_performers: Vec<AreaMetrics>,
    pub bottom_performers: Vec<AreaMetrics>,
    pub intervention_summary: InterventionSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceSort {
    FcrRate,
    BacklogPct,
}

/// One record's contribution to the geographic population.
struct GeoRecord {
    location: Option<String>,
    country: Option<String>,
    is_backlog: bool,
    is_major: bool,
    is_fcr: bool,
    is_ftf: bool,
}

impl GeoRecord {
    fn from_incident(incident: &FlaggedIncident) -> Self {
        Self {
            location: incident.record.location.clone(),
            country: incident.record.country.clone(),
            is_backlog: incident.is_backlog,
            is_major: incident.is_major_incident,
            is_fcr: incident.is_first_call_resolution,
            is_ftf: incident.is_first_time_fix,
        }
    }

    /// Requests carry no incident performance flags; they contribute
    /// volume only, and only when fully located.
    fn from_request(request: &FlaggedRequest) -> Option<Self> {
        let location = request.record.location.clone()?;
        let country = request.record.country.clone()?;
        Some(Self {
            location: Some(location),
            country: Some(country),
            is_backlog: false,
            is_major: false,
            is_fcr: false,
            is_ftf: false,
        })
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    backlog: usize,
    major: usize,
    fcr: usize,
    ftf: usize,
}

impl Tally {
    fn add(&mut self, record: &GeoRecord) {
        self.total += 1;
        self.backlog += record.is_backlog as usize;
        self.major += record.is_major as usize;
        self.fcr += record.is_fcr as usize;
        self.ftf += record.is_ftf as usize;
    }
}

pub fn classify_volume_tier(volume: usize, config: &GeoConfig) -> (VolumeTier, &TierDef) {
    let tiers = &config.volume_tiers;
    if volume >= tiers.tier_1.threshold {
        (VolumeTier::Tier1, &tiers.tier_1)
    } else if volume >= tiers.tier_2.threshold {
        (VolumeTier::Tier2, &tiers.tier_2)
    } else if volume >= tiers.tier_3.threshold {
        (VolumeTier::Tier3, &tiers.tier_3)
    } else {
        (VolumeTier::Tier4, &tiers.tier_4)
    }
}

/// Precedence matters: high volume with poor performance outranks
/// everything, and only tier 4 qualifies as low volume for Monitor.
pub fn identify_intervention_priority(
    tier: VolumeTier,
    backlog_pct: f64,
    fcr_rate: f64,
    config: &KpiConfig,
) -> InterventionPriority {
    let backlog_threshold = config.kpis.sm002.targets.backlog_max.unwrap_or(0.10) * 100.0;
    let fcr_threshold = config.kpis.sm004.targets.ftf_rate_min.unwrap_or(80.0);

    let poor_performance = backlog_pct > backlog_threshold || fcr_rate < fcr_threshold;
    let is_high_volume = matches!(tier, VolumeTier::Tier1 | VolumeTier::Tier2);
    let is_low_volume = tier == VolumeTier::Tier4;

    if is_high_volume && poor_performance {
        InterventionPriority::Critical
    } else if is_low_volume && poor_performance {
        InterventionPriority::Monitor
    } else if is_high_volume || poor_performance {
        InterventionPriority::High
    } else {
        InterventionPriority::Standard
    }
}

fn build_metrics(
    location: Option<String>,
    country: String,
    tally: &Tally,
    kpi_config: &KpiConfig,
    geo_config: &GeoConfig,
) -> AreaMetrics {
    let backlog_pct = round2(percentage(tally.backlog, tally.total));
    let fcr_rate = round2(percentage(tally.fcr, tally.total));
    let major_incident_rate = round2(percentage(tally.major, tally.total));
    let (volume_tier, tier_def) = classify_volume_tier(tally.total, geo_config);
    let intervention_priority =
        identify_intervention_priority(volume_tier, backlog_pct, fcr_rate, kpi_config);

    AreaMetrics {
        location,
        country,
        total_volume: tally.total,
        backlog_count: tally.backlog,
        major_incident_count: tally.major,
        fcr_count: tally.fcr,
        eligible_fcr_count: tally.ftf,
        backlog_pct,
        fcr_rate,
        major_incident_rate,
        volume_tier,
        tier_name: tier_def.name.clone(),
        intervention_priority,
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Top performers: best FCR first (or lowest backlog), with the other
/// metric as the opposite-direction tiebreak.
pub fn top_performers(
    locations: &[AreaMetrics],
    n: usize,
    sort: PerformanceSort,
) -> Vec<AreaMetrics> {
    let mut sorted = locations.to_vec();
    match sort {
        PerformanceSort::FcrRate => sorted.sort_by(|a, b| {
            b.fcr_rate
                .partial_cmp(&a.fcr_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.backlog_pct
                        .partial_cmp(&b.backlog_pct)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        }),
        PerformanceSort::BacklogPct => sorted.sort_by(|a, b| {
            a.backlog_pct
                .partial_cmp(&b.backlog_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.fcr_rate
                        .partial_cmp(&a.fcr_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        }),
    }
    sorted.truncate(n);
    sorted
}

/// Bottom performers: the mirror image of `top_performers`.
pub fn bottom_performers(
    locations: &[AreaMetrics],
    n: usize,
    sort: PerformanceSort,
) -> Vec<AreaMetrics> {
    let mut sorted = locations.to_vec();
    match sort {
        PerformanceSort::FcrRate => sorted.sort_by(|a, b| {
            a.fcr_rate
                .partial_cmp(&b.fcr_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.backlog_pct
                        .partial_cmp(&a.backlog_pct)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        }),
        PerformanceSort::BacklogPct => sorted.sort_by(|a, b| {
            b.backlog_pct
                .partial_cmp(&a.backlog_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.fcr_rate
                        .partial_cmp(&b.fcr_rate)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        }),
    }
    sorted.truncate(n);
    sorted
}

pub fn intervention_summary(locations: &[AreaMetrics]) -> InterventionSummary {
    let count = |priority| {
        locations
            .iter()
            .filter(|l| l.intervention_priority == priority)
            .count()
    };
    let collect = |priority| -> Vec<AreaMetrics> {
        locations
            .iter()
            .filter(|l| l.intervention_priority == priority)
            .cloned()
            .collect()
    };

    InterventionSummary {
        total_locations: locations.len(),
        critical_count: count(InterventionPriority::Critical),
        high_count: count(InterventionPriority::High),
        monitor_count: count(InterventionPriority::Monitor),
        standard_count: count(InterventionPriority::Standard),
        critical_locations: collect(InterventionPriority::Critical),
        high_priority_locations: collect(InterventionPriority::High),
    }
}

/// Aggregate the flagged population by country and by location.
pub fn analyze(
    incidents: &[FlaggedIncident],
    requests: &[FlaggedRequest],
    kpi_config: &KpiConfig,
    geo_config: &GeoConfig,
    top_n: usize,
) -> GeoAnalysis {
    let mut population: Vec<GeoRecord> =
        incidents.iter().map(GeoRecord::from_incident).collect();
    population.extend(requests.iter().filter_map(GeoRecord::from_request));

    let mut by_country: HashMap<String, Tally> = HashMap::new();
    let mut by_location: HashMap<(String, String), Tally> = HashMap::new();

    for record in &population {
        let Some(country) = &record.country else {
            continue;
        };
        by_country.entry(country.clone()).or_default().add(record);

        if let Some(location) = &record.location {
            by_location
                .entry((location.clone(), country.clone()))
                .or_default()
                .add(record);
        }
    }

    let mut country_summary: Vec<AreaMetrics> = by_country
        .into_iter()
        .map(|(country, tally)| build_metrics(None, country, &tally, kpi_config, geo_config))
        .collect();
    country_summary.sort_by(|a, b| {
        b.total_volume
            .cmp(&a.total_volume)
            .then_with(|| a.country.cmp(&b.country))
    });

    let mut location_summary: Vec<AreaMetrics> = by_location
        .into_iter()
        .map(|((location, country), tally)| {
            build_metrics(Some(location), country, &tally, kpi_config, geo_config)
        })
        .collect();
    location_summary.sort_by(|a, b| {
        b.total_volume
            .cmp(&a.total_volume)
            .then_with(|| a.location.cmp(&b.location))
    });

    let top = top_performers(&location_summary, top_n, PerformanceSort::FcrRate);
    let bottom = bottom_performers(&location_summary, top_n, PerformanceSort::FcrRate);
    let summary = intervention_summary(&location_summary);

    tracing::info!(
        countries = country_summary.len(),
        locations = location_summary.len(),
        critical = summary.critical_count,
        "geographic analysis complete"
    );

    GeoAnalysis {
        country_summary,
        location_summary,
        top_performers: top,
        bottom_performers: bottom,
        intervention_summary: summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Incident, Request};

    fn geo_config() -> GeoConfig {
        crate::config::test_okr_config().geographic_analysis
    }

    fn incident(location: &str, country: &str, backlog: bool, fcr: bool) -> FlaggedIncident {
        FlaggedIncident {
            record: Incident {
                number: "INC001".into(),
                priority: None,
                priority_number: 3,
                state: None,
                opened_at: None,
                resolved_at: None,
                reassignment_count: 0,
                contact_type: None,
                location: Some(location.into()),
                country: Some(country.into()),
            },
            days_open: 1.0,
            days_to_resolve: None,
            is_p1: false,
            is_p2: false,
            is_major_incident: false,
            is_resolved: false,
            is_backlog: backlog,
            is_first_time_fix: fcr,
            is_first_call_resolution: fcr,
        }
    }

    #[test]
    fn volume_tiers_follow_thresholds() {
        let config = geo_config();
        assert_eq!(classify_volume_tier(750, &config).0, VolumeTier::Tier1);
        assert_eq!(classify_volume_tier(500, &config).0, VolumeTier::Tier1);
        assert_eq!(classify_volume_tier(350, &config).0, VolumeTier::Tier2);
        assert_eq!(classify_volume_tier(150, &config).0, VolumeTier::Tier3);
        assert_eq!(classify_volume_tier(99, &config).0, VolumeTier::Tier4);
    }

    #[test]
    fn intervention_priority_precedence() {
        let config = crate::config::test_kpi_config();

        // High volume + poor performance.
        assert_eq!(
            identify_intervention_priority(VolumeTier::Tier1, 15.0, 70.0, &config),
            InterventionPriority::Critical
        );
        // Low volume + poor performance.
        assert_eq!(
            identify_intervention_priority(VolumeTier::Tier4, 15.0, 70.0, &config),
            InterventionPriority::Monitor
        );
        // Mid volume + poor performance.
        assert_eq!(
            identify_intervention_priority(VolumeTier::Tier3, 15.0, 70.0, &config),
            InterventionPriority::High
        );
        // High volume + good performance.
        assert_eq!(
            identify_intervention_priority(VolumeTier::Tier2, 5.0, 90.0, &config),
            InterventionPriority::High
        );
        // Low volume + good performance.
        assert_eq!(
            identify_intervention_priority(VolumeTier::Tier4, 5.0, 90.0, &config),
            InterventionPriority::Standard
        );
    }

    #[test]
    fn country_metrics_aggregate_counts_and_rates() {
        let kpi_config = crate::config::test_kpi_config();
        let geo_config = geo_config();

        let mut incidents = Vec::new();
        for index in 0..40 {
            incidents.push(incident("Berlin Office", "Germany", index < 10, index < 30));
        }
        for _ in 0..10 {
            incidents.push(incident("Lyon Site", "France", false, true));
        }

        let analysis = analyze(&incidents, &[], &kpi_config, &geo_config, 10);

        assert_eq!(analysis.country_summary.len(), 2);
        let germany = &analysis.country_summary[0];
        assert_eq!(germany.country, "Germany");
        assert_eq!(germany.total_volume, 40);
        assert_eq!(germany.backlog_count, 10);
        assert_eq!(germany.backlog_pct, 25.0);
        assert_eq!(germany.fcr_rate, 75.0);
        assert_eq!(germany.volume_tier, VolumeTier::Tier4);
    }

    #[test]
    fn unlocated_requests_stay_out_of_the_population() {
        let kpi_config = crate::config::test_kpi_config();
        let geo_config = geo_config();

        let located = Request {
            number: "REQ001".into(),
            state: None,
            opened_at: None,
            closed_at: None,
            location: Some("Madrid Hub".into()),
            country: Some("Spain".into()),
        };
        let unlocated = Request {
            location: None,
            ..located.clone()
        };
        let requests = vec![
            FlaggedRequest {
                record: located,
                days_open: 1.0,
                days_to_close: None,
                is_aged: false,
                is_closed: false,
            },
            FlaggedRequest {
                record: unlocated,
                days_open: 1.0,
                days_to_close: None,
                is_aged: true,
                is_closed: false,
            },
        ];

        let analysis = analyze(&[], &requests, &kpi_config, &geo_config, 10);
        assert_eq!(analysis.location_summary.len(), 1);
        assert_eq!(analysis.location_summary[0].total_volume, 1);
        // Requests contribute volume, never performance flags.
        assert_eq!(analysis.location_summary[0].backlog_count, 0);
    }

    #[test]
    fn top_and_bottom_sort_with_opposite_tiebreaks() {
        let kpi_config = crate::config::test_kpi_config();
        let geo_config = geo_config();

        let mut incidents = Vec::new();
        // Two sites with equal FCR, different backlog.
        for index in 0..10 {
            incidents.push(incident("Site A", "Germany", index < 4, index < 8));
        }
        for index in 0..10 {
            incidents.push(incident("Site B", "Germany", index < 1, index < 8));
        }
        for index in 0..10 {
            incidents.push(incident("Site C", "Germany", index < 2, index < 3));
        }

        let analysis = analyze(&incidents, &[], &kpi_config, &geo_config, 10);

        let top = &analysis.top_performers;
        assert_eq!(top[0].location.as_deref(), Some("Site B"));
        assert_eq!(top[1].location.as_deref(), Some("Site A"));
        assert_eq!(top[2].location.as_deref(), Some("Site C"));

        let bottom = &analysis.bottom_performers;
        assert_eq!(bottom[0].location.as_deref(), Some("Site C"));
        assert_eq!(bottom[1].location.as_deref(), Some("Site A"));
        assert_eq!(bottom[2].location.as_deref(), Some("Site B"));

        let by_backlog = top_performers(&analysis.location_summary, 3, PerformanceSort::BacklogPct);
        assert_eq!(by_backlog[0].location.as_deref(), Some("Site B"));
    }

    #[test]
    fn summary_buckets_critical_and_high_rows() {
        let kpi_config = crate::config::test_kpi_config();
        let geo_config = geo_config();

        let mut incidents = Vec::new();
        // A big poor performer and a small poor performer.
        for index in 0..600 {
            incidents.push(incident("Mega Site", "Germany", index < 120, index < 300));
        }
        for index in 0..20 {
            incidents.push(incident("Tiny Site", "France", index < 10, index < 5));
        }

        let analysis = analyze(&incidents, &[], &kpi_config, &geo_config, 10);
        let summary = &analysis.intervention_summary;

        assert_eq!(summary.total_locations, 2);
        assert_eq!(summary.critical_count, 1);
        assert_eq!(summary.monitor_count, 1);
        assert_eq!(summary.critical_locations[0].location.as_deref(), Some("Mega Site"));
        assert!(summary.high_priority_locations.is_empty());
    }
}
