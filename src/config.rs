use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{KpiId, KrId};

/// Fatal configuration failures. These abort the run before any
/// computation; `main` prints actionable guidance for them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required configuration section: {0}")]
    MissingSection(&'static str),
    #[error("missing key result definition: {0}")]
    MissingKeyResult(KrId),
    #[error("missing weight for key result: {0}")]
    MissingWeight(KrId),
    #[error("performance bands for {0} are not in descending min_score order")]
    UnorderedBands(String),
}

// ---------------------------------------------------------------------------
// KPI configuration (kpi_config.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct KpiConfig {
    #[serde(default)]
    pub metadata: Metadata,
    /// Maps internal field names to the CSV column names of the extract,
    /// e.g. `resolved_at: u_resolved`.
    #[serde(default)]
    pub column_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub processing: Processing,
    pub thresholds: Thresholds,
    pub kpis: KpiDefs,
    #[serde(default)]
    pub global_status_rules: GlobalStatusRules,
}

impl KpiConfig {
    /// Resolve a CSV header back to its internal field name.
    pub fn internal_field<'a>(&'a self, header: &'a str) -> &'a str {
        self.column_mappings
            .iter()
            .find(|(_, csv_name)| csv_name.as_str() == header)
            .map(|(field, _)| field.as_str())
            .unwrap_or(header)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Processing {
    #[serde(default)]
    pub priority_extraction: PriorityExtraction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityExtraction {
    /// Sentinel for unparseable priorities; 99 keeps unknown records out
    /// of the major-incident population.
    #[serde(default = "default_priority_fallback")]
    pub fallback_value: u32,
}

impl Default for PriorityExtraction {
    fn default() -> Self {
        Self {
            fallback_value: default_priority_fallback(),
        }
    }
}

fn default_priority_fallback() -> u32 {
    99
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub priority: PriorityThresholds,
    #[serde(default)]
    pub aging: AgingThresholds,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriorityThresholds {
    #[serde(default = "default_major_levels")]
    pub major_incident_levels: Vec<u32>,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            major_incident_levels: default_major_levels(),
        }
    }
}

fn default_major_levels() -> Vec<u32> {
    vec![1, 2]
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgingThresholds {
    #[serde(default = "default_backlog_days")]
    pub backlog_days: f64,
    #[serde(default = "default_request_aging_days")]
    pub request_aging_days: f64,
}

impl Default for AgingThresholds {
    fn default() -> Self {
        Self {
            backlog_days: default_backlog_days(),
            request_aging_days: default_request_aging_days(),
        }
    }
}

fn default_backlog_days() -> f64 {
    10.0
}

fn default_request_aging_days() -> f64 {
    30.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiDefs {
    #[serde(rename = "SM001")]
    pub sm001: KpiDef,
    #[serde(rename = "SM002")]
    pub sm002: KpiDef,
    #[serde(rename = "SM003")]
    pub sm003: KpiDef,
    #[serde(rename = "SM004")]
    pub sm004: KpiDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiDef {
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub targets: KpiTargets,
    #[serde(default)]
    pub business_impact: String,
    #[serde(default)]
    pub exclusions: Exclusions,
}

/// Target fields vary per KPI; absent fields fall back to the documented
/// defaults at the point of use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KpiTargets {
    pub p1_max: Option<u32>,
    pub p2_max: Option<u32>,
    pub adherence_min: Option<f64>,
    /// Fraction of total volume, e.g. 0.10 for 10%.
    pub backlog_max: Option<f64>,
    pub ftf_rate_min: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Exclusions {
    #[serde(default)]
    pub contact_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalStatusRules {
    #[serde(default)]
    pub performance_bands: KpiPerformanceBands,
    #[serde(default)]
    pub scorecard_scoring: ScorecardScoring,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KpiPerformanceBands {
    #[serde(default = "default_excellent")]
    pub excellent: f64,
    #[serde(default = "default_good")]
    pub good: f64,
    #[serde(default = "default_needs_improvement")]
    pub needs_improvement: f64,
}

impl Default for KpiPerformanceBands {
    fn default() -> Self {
        Self {
            excellent: default_excellent(),
            good: default_good(),
            needs_improvement: default_needs_improvement(),
        }
    }
}

fn default_excellent() -> f64 {
    95.0
}

fn default_good() -> f64 {
    85.0
}

fn default_needs_improvement() -> f64 {
    70.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScorecardScoring {
    #[serde(default = "default_weight_sm001")]
    pub weight_sm001: f64,
    #[serde(default = "default_weight_sm002")]
    pub weight_sm002: f64,
    #[serde(default = "default_weight_sm003")]
    pub weight_sm003: f64,
    #[serde(default = "default_weight_sm004")]
    pub weight_sm004: f64,
    pub sm003_disabled_weights: Option<DisabledWeights>,
}

impl Default for ScorecardScoring {
    fn default() -> Self {
        Self {
            weight_sm001: default_weight_sm001(),
            weight_sm002: default_weight_sm002(),
            weight_sm003: default_weight_sm003(),
            weight_sm004: default_weight_sm004(),
            sm003_disabled_weights: None,
        }
    }
}

fn default_weight_sm001() -> f64 {
    20.0
}

fn default_weight_sm002() -> f64 {
    30.0
}

fn default_weight_sm003() -> f64 {
    20.0
}

fn default_weight_sm004() -> f64 {
    30.0
}

/// Alternate three-KPI weight table applied while SM003 is disabled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisabledWeights {
    pub weight_sm001: Option<f64>,
    pub weight_sm002: Option<f64>,
    pub weight_sm004: Option<f64>,
}

impl DisabledWeights {
    pub fn resolved(&self) -> (f64, f64, f64) {
        (
            self.weight_sm001.unwrap_or(30.0),
            self.weight_sm002.unwrap_or(50.0),
            self.weight_sm004.unwrap_or(20.0),
        )
    }
}

pub fn load_kpi_config(path: &Path) -> Result<KpiConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|source| {
        ConfigError::Parse {
            path: path.display().to_string(),
            source,
        }
    })?;

    for section in ["column_mappings", "thresholds", "kpis"] {
        if value.get(section).is_none() {
            return Err(ConfigError::MissingSection(section));
        }
    }

    let config: KpiConfig =
        serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    let bands = &config.global_status_rules.performance_bands;
    if !(bands.excellent > bands.good && bands.good > bands.needs_improvement) {
        return Err(ConfigError::UnorderedBands(
            "global_status_rules.performance_bands".into(),
        ));
    }

    tracing::info!(
        organization = %config.metadata.organization,
        version = %config.metadata.version,
        "loaded KPI configuration"
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// OKR configuration (okr_config.yaml)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OkrConfig {
    #[serde(default)]
    pub metadata: OkrMetadata,
    #[serde(default)]
    pub objective: Objective,
    pub key_results: BTreeMap<KrId, KrDef>,
    pub weighting: Weighting,
    #[serde(default)]
    pub action_triggers: BTreeMap<KrId, KrTriggers>,
    #[serde(default)]
    pub geographic_analysis: GeoConfig,
}

impl OkrConfig {
    pub fn key_result(&self, id: KrId) -> &KrDef {
        // Presence of all four KRs is validated at load time.
        &self.key_results[&id]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OkrMetadata {
    #[serde(default)]
    pub okr_id: String,
    #[serde(default)]
    pub okr_name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub year: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Objective {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub calculation_source: CalculationSource,
    pub target: KrTarget,
    pub scoring: KrScoring,
    pub deadline: Deadline,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub business_impact: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalculationSource {
    pub kpi_id: KpiId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrTarget {
    pub value: f64,
    #[serde(default)]
    pub operator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    InversePercentage,
    DirectPercentage,
    InverseCount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrScoring {
    pub method: ScoringMethod,
    pub max_acceptable: Option<f64>,
    #[serde(default = "default_clamp_min")]
    pub clamp_min: f64,
    #[serde(default = "default_clamp_max")]
    pub clamp_max: f64,
    pub performance_bands: KrPerformanceBands,
}

fn default_clamp_min() -> f64 {
    0.0
}

fn default_clamp_max() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct KrPerformanceBands {
    pub excellent: BandFloor,
    pub good: BandFloor,
    pub at_risk: BandFloor,
    pub critical: BandFloor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandFloor {
    pub min_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deadline {
    pub date: NaiveDate,
    #[serde(default)]
    pub criticality: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weighting {
    pub weights: BTreeMap<KrId, f64>,
    pub overall_score: OverallScoreRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverallScoreRules {
    pub performance_bands: OverallBands,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverallBands {
    pub excellent: OverallBand,
    pub on_track: OverallBand,
    pub at_risk: OverallBand,
    pub critical: OverallBand,
}

impl OverallBands {
    /// Descending evaluation order; load-time validation guarantees the
    /// first match is also the highest qualifying band.
    pub fn descending(&self) -> [&OverallBand; 4] {
        [&self.excellent, &self.on_track, &self.at_risk, &self.critical]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverallBand {
    pub min_score: f64,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KrTriggers {
    pub critical: Option<TriggerDef>,
    pub warning: Option<TriggerDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerDef {
    pub action: String,
    pub escalation: String,
    /// Loaded for reporting only; trigger thresholds are fixed in code.
    #[serde(default)]
    pub condition: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoConfig {
    #[serde(default)]
    pub volume_tiers: VolumeTiers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolumeTiers {
    #[serde(default = "default_tier_1")]
    pub tier_1: TierDef,
    #[serde(default = "default_tier_2")]
    pub tier_2: TierDef,
    #[serde(default = "default_tier_3")]
    pub tier_3: TierDef,
    #[serde(default = "default_tier_4")]
    pub tier_4: TierDef,
}

impl Default for VolumeTiers {
    fn default() -> Self {
        Self {
            tier_1: default_tier_1(),
            tier_2: default_tier_2(),
            tier_3: default_tier_3(),
            tier_4: default_tier_4(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierDef {
    pub threshold: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

fn default_tier_1() -> TierDef {
    TierDef {
        threshold: 500,
        name: "High Volume".into(),
        description: ">=500 records".into(),
    }
}

fn default_tier_2() -> TierDef {
    TierDef {
        threshold: 200,
        name: "Medium Volume".into(),
        description: "200-499 records".into(),
    }
}

fn default_tier_3() -> TierDef {
    TierDef {
        threshold: 100,
        name: "Standard Volume".into(),
        description: "100-199 records".into(),
    }
}

fn default_tier_4() -> TierDef {
    TierDef {
        threshold: 0,
        name: "Low Volume".into(),
        description: "<100 records".into(),
    }
}

pub fn load_okr_config(path: &Path) -> Result<OkrConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|source| {
        ConfigError::Parse {
            path: path.display().to_string(),
            source,
        }
    })?;

    for section in ["key_results", "weighting"] {
        if value.get(section).is_none() {
            return Err(ConfigError::MissingSection(section));
        }
    }

    let config: OkrConfig =
        serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    for kr_id in KrId::ALL {
        let def = config
            .key_results
            .get(&kr_id)
            .ok_or(ConfigError::MissingKeyResult(kr_id))?;
        if config.weighting.weights.get(&kr_id).is_none() {
            return Err(ConfigError::MissingWeight(kr_id));
        }

        let bands = &def.scoring.performance_bands;
        let floors = [
            bands.excellent.min_score,
            bands.good.min_score,
            bands.at_risk.min_score,
            bands.critical.min_score,
        ];
        if floors.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(ConfigError::UnorderedBands(format!(
                "key_results.{kr_id}.scoring.performance_bands"
            )));
        }
    }

    let overall = config
        .weighting
        .overall_score
        .performance_bands
        .descending();
    if overall
        .windows(2)
        .any(|pair| pair[0].min_score <= pair[1].min_score)
    {
        return Err(ConfigError::UnorderedBands(
            "weighting.overall_score.performance_bands".into(),
        ));
    }

    tracing::info!(okr = %config.metadata.okr_name, "loaded OKR configuration");
    Ok(config)
}

#[cfg(test)]
pub(crate) fn test_kpi_config() -> KpiConfig {
    let value: serde_yaml::Value =
        serde_yaml::from_str(include_str!("../config/kpi_config.yaml")).unwrap();
    serde_yaml::from_value(value).unwrap()
}

#[cfg(test)]
pub(crate) fn test_okr_config() -> OkrConfig {
    let value: serde_yaml::Value =
        serde_yaml::from_str(include_str!("../config/okr_config.yaml")).unwrap();
    serde_yaml::from_value(value).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn shipped_configs_load_and_validate() {
        let mut kpi_file = tempfile::NamedTempFile::new().unwrap();
        kpi_file
            .write_all(include_str!("../config/kpi_config.yaml").as_bytes())
            .unwrap();
        let kpi = load_kpi_config(kpi_file.path()).unwrap();
        assert!(kpi.kpis.sm001.enabled);
        assert_eq!(kpi.thresholds.aging.backlog_days, 10.0);
        assert_eq!(kpi.internal_field("u_resolved"), "resolved_at");

        let mut okr_file = tempfile::NamedTempFile::new().unwrap();
        okr_file
            .write_all(include_str!("../config/okr_config.yaml").as_bytes())
            .unwrap();
        let okr = load_okr_config(okr_file.path()).unwrap();
        assert_eq!(okr.key_results.len(), 4);
        assert_eq!(
            okr.key_result(KrId::Kr4).calculation_source.kpi_id,
            KpiId::Sm002
        );
    }

    #[test]
    fn missing_file_is_a_distinct_error() {
        let err = load_kpi_config(Path::new("no/such/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn missing_required_section_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"metadata:\n  organization: Test\n").unwrap();
        let err = load_kpi_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("column_mappings")));
    }

    #[test]
    fn unordered_overall_bands_are_rejected() {
        let text = include_str!("../config/okr_config.yaml")
            .replace("on_track:\n        min_score: 70", "on_track:\n        min_score: 95");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let err = load_okr_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnorderedBands(_)));
    }

    #[test]
    fn disabled_weight_table_falls_back_to_documented_defaults() {
        let weights = DisabledWeights::default().resolved();
        assert_eq!(weights, (30.0, 50.0, 20.0));
    }
}
