use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod export;
mod flags;
mod geo;
mod ingest;
mod kpi;
mod models;
mod okr;
mod report;

use crate::kpi::KpiSet;
use crate::okr::{ActionTriggers, OkrResult, OkrScorer};

#[derive(Parser)]
#[command(name = "kpi-scorecard")]
#[command(about = "Service desk KPI/OKR scorecard pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PipelineArgs {
    /// Incidents CSV extract
    #[arg(long)]
    incidents: PathBuf,
    /// Requests CSV extract (needed while SM003 is enabled)
    #[arg(long)]
    requests: Option<PathBuf>,
    #[arg(long, default_value = "config/kpi_config.yaml")]
    config: PathBuf,
    #[arg(long, default_value = "config/okr_config.yaml")]
    okr_config: PathBuf,
    /// Anchor for age and deadline calculations (YYYY-MM-DD or
    /// "YYYY-MM-DD HH:MM:SS"); defaults to now
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score KPIs and OKRs and print the scorecard
    Score {
        #[command(flatten)]
        args: PipelineArgs,
        /// Dump the full result bundle as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        args: PipelineArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the scorecard as a directory of CSV sheets
    Export {
        #[command(flatten)]
        args: PipelineArgs,
        #[arg(long, default_value = "scorecard_export")]
        out_dir: PathBuf,
    },
    /// Geographic breakdown by country and location
    Geo {
        #[command(flatten)]
        args: PipelineArgs,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

struct PipelineOutput {
    kpis: KpiSet,
    okr: OkrResult,
    triggers: ActionTriggers,
    geo: geo::GeoAnalysis,
    as_of: NaiveDateTime,
}

fn parse_as_of(raw: Option<&str>) -> anyhow::Result<NaiveDateTime> {
    let Some(raw) = raw else {
        return Ok(Utc::now().naive_utc());
    };
    if let Ok(stamp) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(stamp);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .with_context(|| format!("invalid --as-of value: {raw}"))
}

fn run_pipeline(args: &PipelineArgs, top_n: usize) -> anyhow::Result<PipelineOutput> {
    let as_of = parse_as_of(args.as_of.as_deref())?;
    let kpi_config = config::load_kpi_config(&args.config)?;
    let okr_config = config::load_okr_config(&args.okr_config)?;

    let incidents = ingest::load_incidents(&args.incidents, &kpi_config)?;
    let requests = if kpi_config.kpis.sm003.enabled {
        match &args.requests {
            Some(path) => Some(ingest::load_requests(path, &kpi_config)?),
            None => {
                tracing::warn!("SM003 enabled but no requests file given, skipping request KPIs");
                None
            }
        }
    } else {
        None
    };

    let flagged_incidents = flags::derive_incident_flags(&incidents, &kpi_config, as_of);
    let flagged_requests = requests
        .as_deref()
        .map(|records| flags::derive_request_flags(records, &kpi_config, as_of));

    let kpis = kpi::score_all(&flagged_incidents, flagged_requests.as_deref(), &kpi_config);
    let scorer = OkrScorer::new(&okr_config, &kpis);
    let okr = scorer.overall(as_of);
    let triggers = scorer.action_triggers(as_of);
    let geo = geo::analyze(
        &flagged_incidents,
        flagged_requests.as_deref().unwrap_or(&[]),
        &kpi_config,
        &okr_config.geographic_analysis,
        top_n,
    );

    Ok(PipelineOutput {
        kpis,
        okr,
        triggers,
        geo,
        as_of,
    })
}

fn print_scorecard(output: &PipelineOutput) {
    println!("KPI scorecard (as of {}):", output.as_of.format("%Y-%m-%d %H:%M:%S"));
    for result in output.kpis.results.values() {
        println!(
            "- {} {}: {} at {:.1}% adherence ({})",
            result.id,
            result.name,
            result.status,
            result.adherence_rate,
            report::describe_detail(result)
        );
    }
    if let Some(overall) = &output.kpis.overall {
        println!(
            "Overall KPI score {:.1}% ({}) across weight {:.0}",
            overall.overall_score, overall.overall_status, overall.total_weight
        );
    }

    println!();
    println!(
        "OKR {} {}: {:.1}% ({})",
        output.okr.okr_id, output.okr.okr_name, output.okr.overall_score, output.okr.overall_status
    );
    for kr in output.okr.key_results.values() {
        println!(
            "- {} {}: score {:.1} ({}), current {} {} {} target, {} days to deadline",
            kr.kr_id,
            kr.name,
            kr.score,
            kr.status,
            kr.current_value,
            kr.target_operator,
            kr.target_value,
            kr.days_remaining
        );
    }

    if !output.triggers.critical.is_empty() {
        println!();
        println!("Critical actions required:");
        for trigger in &output.triggers.critical {
            println!(
                "- {}: {} (escalate to {})",
                trigger.kr_id, trigger.action, trigger.escalation
            );
        }
    }
    if !output.triggers.warning.is_empty() {
        println!();
        println!("Warning actions:");
        for trigger in &output.triggers.warning {
            println!(
                "- {}: {} (escalate to {})",
                trigger.kr_id, trigger.action, trigger.escalation
            );
        }
    }
}

fn print_geography(output: &PipelineOutput) {
    println!("Countries by volume:");
    for country in &output.geo.country_summary {
        println!(
            "- {}: {} records, backlog {:.2}%, FCR {:.2}%, {} ({})",
            country.country,
            country.total_volume,
            country.backlog_pct,
            country.fcr_rate,
            country.tier_name,
            country.intervention_priority
        );
    }

    println!();
    println!("Top performing locations:");
    for site in &output.geo.top_performers {
        println!(
            "- {} ({}): FCR {:.2}%, backlog {:.2}%",
            site.location.as_deref().unwrap_or("-"),
            site.country,
            site.fcr_rate,
            site.backlog_pct
        );
    }

    println!();
    println!("Bottom performing locations:");
    for site in &output.geo.bottom_performers {
        println!(
            "- {} ({}): FCR {:.2}%, backlog {:.2}%",
            site.location.as_deref().unwrap_or("-"),
            site.country,
            site.fcr_rate,
            site.backlog_pct
        );
    }

    let summary = &output.geo.intervention_summary;
    println!();
    println!(
        "Interventions: {} critical, {} high, {} monitor, {} standard across {} locations",
        summary.critical_count,
        summary.high_count,
        summary.monitor_count,
        summary.standard_count,
        summary.total_locations
    );
    for site in summary
        .critical_locations
        .iter()
        .chain(&summary.high_priority_locations)
    {
        println!(
            "- {} ({}) [{}]: {} records, backlog {:.2}%, FCR {:.2}%",
            site.location.as_deref().unwrap_or("-"),
            site.country,
            site.intervention_priority,
            site.total_volume,
            site.backlog_pct,
            site.fcr_rate
        );
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Score { args, json } => {
            let output = run_pipeline(&args, 10)?;
            if json {
                let bundle = serde_json::json!({
                    "as_of": output.as_of,
                    "kpis": output.kpis,
                    "okr": output.okr,
                    "action_triggers": output.triggers,
                    "geography": output.geo,
                });
                println!("{}", serde_json::to_string_pretty(&bundle)?);
            } else {
                print_scorecard(&output);
            }
        }
        Commands::Report { args, out } => {
            let output = run_pipeline(&args, 10)?;
            let report = report::build_report(
                &output.kpis,
                &output.okr,
                &output.triggers,
                &output.geo,
                output.as_of,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { args, out_dir } => {
            let output = run_pipeline(&args, 10)?;
            let written = export::export_workbook(
                &out_dir,
                &output.kpis,
                &output.okr,
                &output.triggers,
                &output.geo,
            )?;
            println!("Exported {} sheets to {}.", written.len(), out_dir.display());
        }
        Commands::Geo { args, top } => {
            let output = run_pipeline(&args, top)?;
            print_geography(&output);
        }
    }

    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        if err.downcast_ref::<config::ConfigError>().is_some() {
            eprintln!("Check that the configuration files exist and match the documented schema.");
        } else {
            eprintln!("Check that the input directory and CSV file names match the options given.");
        }
        std::process::exit(1);
    }
}
