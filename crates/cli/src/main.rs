use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use neighborhood_mlm_core as core;
use core::data::DataFrame;
use core::engine::{analyze, AnalysisReport, EngineConfig};

#[derive(Parser)]
#[command(name = "openmlm")]
#[command(version)]
#[command(about = "Two-level REML modeling and diagnostics for neighborhood survey data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: nested model sequence, ICC, diagnostics,
    /// and sensitivity analyses
    Analyze {
        /// Path to the analysis-sample CSV file
        #[arg(short, long)]
        data: String,

        /// VIF above which a predictor is flagged as collinear
        #[arg(long, default_value = "5.0")]
        vif_threshold: f64,

        /// Confidence level for the sensitivity significance flag
        #[arg(long, default_value = "0.95")]
        confidence: f64,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            data,
            vif_threshold,
            confidence,
            format,
        } => cmd_analyze(&data, vif_threshold, confidence, &format),
    }
}

fn cmd_analyze(
    data_path: &str,
    vif_threshold: f64,
    confidence: f64,
    output_format: &str,
) -> Result<()> {
    let df = DataFrame::from_csv(data_path)
        .with_context(|| format!("Failed to load data from '{}'", data_path))?;

    eprintln!(
        "Loaded {} observations, {} columns from '{}'",
        df.nrows(),
        df.ncols(),
        data_path
    );

    let config = EngineConfig {
        vif_threshold,
        confidence_level: confidence,
    };

    let report = analyze(&df, &config).context("Analysis failed")?;

    match output_format.to_lowercase().as_str() {
        "json" => print_json(&report)?,
        _ => print_text(&report),
    }

    Ok(())
}

fn print_text(report: &AnalysisReport) {
    println!("{}", report.models.summary());
    println!("{}", report.icc.summary());
    println!("{}", report.diagnostics.summary());
    println!("{}", report.sensitivity.summary());
}

fn print_json(report: &AnalysisReport) -> Result<()> {
    let mut map = serde_json::Map::new();

    // Model sequence
    let models: Vec<serde_json::Value> = report
        .models
        .models()
        .iter()
        .map(|m| {
            serde_json::json!({
                "label": m.label(),
                "n_obs": m.n_obs(),
                "n_groups": m.n_groups(),
                "group_variance": m.group_variance(),
                "residual_variance": m.residual_variance(),
                "coefficients": m.coefficients().iter().map(|c| {
                    serde_json::json!({
                        "name": c.name,
                        "estimate": c.estimate,
                        "se": c.se,
                    })
                }).collect::<Vec<_>>(),
            })
        })
        .collect();
    map.insert("models".to_string(), serde_json::Value::Array(models));

    // Variance decomposition
    let icc = &report.icc;
    map.insert(
        "variance_decomposition".to_string(),
        serde_json::json!({
            "between": icc.between,
            "within": icc.within,
            "total": icc.total,
            "icc": icc.icc,
            "pct_between": icc.pct_between,
            "pct_within": icc.pct_within,
        }),
    );

    // Diagnostics
    let diag = &report.diagnostics;
    map.insert(
        "diagnostics".to_string(),
        serde_json::json!({
            "vif": diag.vif.iter().map(|e| {
                serde_json::json!({ "variable": e.variable, "vif": e.vif })
            }).collect::<Vec<_>>(),
            "high_vif": diag.high_vif,
            "residuals": {
                "mean": diag.residual_stats.mean,
                "sd": diag.residual_stats.sd,
                "skewness": diag.residual_stats.skewness,
                "kurtosis": diag.residual_stats.kurtosis,
            },
            "random_effects": {
                "mean": diag.random_effect_stats.mean,
                "sd": diag.random_effect_stats.sd,
                "min": diag.random_effect_stats.min,
                "max": diag.random_effect_stats.max,
                "count": diag.random_effect_stats.count,
            },
            "n_clusters": diag.n_clusters,
            "n_obs": diag.n_obs,
        }),
    );

    // Sensitivity table
    let sensitivity: Vec<serde_json::Value> = report
        .sensitivity
        .rows
        .iter()
        .map(|r| {
            serde_json::json!({
                "specification": r.specification,
                "n_obs": r.n_obs,
                "coefficient": r.coefficient,
                "se": r.se,
                "significant": r.significant,
            })
        })
        .collect();
    map.insert(
        "sensitivity".to_string(),
        serde_json::Value::Array(sensitivity),
    );
    let failures: Vec<serde_json::Value> = report
        .sensitivity
        .failures
        .iter()
        .map(|f| {
            serde_json::json!({
                "specification": f.specification,
                "reason": f.reason,
            })
        })
        .collect();
    map.insert(
        "sensitivity_failures".to_string(),
        serde_json::Value::Array(failures),
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(map))?
    );
    Ok(())
}
