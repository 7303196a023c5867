mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use saracheck_core::{
    MatchConfig, NormalizedContract, ProcurementContract, ThresholdTable, classify, normalize,
};

#[derive(Parser)]
#[command(name = "saracheck", version)]
#[command(about = "Cross-check SARA contracts in the national register against TED notices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify, match and diagnose a register extract against TED extracts.
    Run {
        /// PLACSP register extract (Parquet).
        #[arg(long, env = "SARACHECK_PLACSP")]
        placsp: PathBuf,
        /// TED extracts (Parquet); repeat for the bulk CSV and eForms tiers.
        #[arg(long, required = true, num_args = 1..)]
        ted: Vec<PathBuf>,
        /// Output directory.
        #[arg(long, env = "SARACHECK_OUT")]
        out: PathBuf,
        /// Threshold table (JSON). Defaults to the built-in table.
        #[arg(long, env = "SARACHECK_THRESHOLDS")]
        thresholds: Option<PathBuf>,
        /// Match configuration (JSON). Defaults apply to every missing field.
        #[arg(long, env = "SARACHECK_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the threshold table.
    Thresholds {
        #[arg(long, env = "SARACHECK_THRESHOLDS")]
        thresholds: Option<PathBuf>,
        /// Print the table as JSON instead of a grid.
        #[arg(long)]
        json: bool,
    },
    /// Decide SARA eligibility for a single contract.
    Classify {
        /// Contract category, e.g. `Obras`, `Servicios`, `supplies`.
        #[arg(long)]
        category: String,
        /// Buyer tier, e.g. `central`, `Entidad Local`.
        #[arg(long)]
        tier: Option<String>,
        #[arg(long)]
        year: i32,
        /// Amount net of VAT, e.g. `230000` or `230.000,00`.
        #[arg(long)]
        amount: String,
        #[arg(long, env = "SARACHECK_THRESHOLDS")]
        thresholds: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            placsp,
            ted,
            out,
            thresholds,
            config,
        } => cmd_run(&placsp, &ted, &out, thresholds.as_deref(), config.as_deref()),
        Commands::Thresholds { thresholds, json } => cmd_thresholds(thresholds.as_deref(), json),
        Commands::Classify {
            category,
            tier,
            year,
            amount,
            thresholds,
        } => cmd_classify(&category, tier.as_deref(), year, &amount, thresholds.as_deref()),
    }
}

fn load_table(path: Option<&Path>) -> anyhow::Result<ThresholdTable> {
    match path {
        Some(p) => ThresholdTable::from_json_path(p)
            .with_context(|| format!("loading threshold table {}", p.display())),
        None => ThresholdTable::builtin().context("loading built-in threshold table"),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MatchConfig> {
    match path {
        Some(p) => MatchConfig::from_json_path(p)
            .with_context(|| format!("loading match config {}", p.display())),
        None => Ok(MatchConfig::default()),
    }
}

fn cmd_run(
    placsp: &Path,
    ted: &[PathBuf],
    out: &Path,
    thresholds: Option<&Path>,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let table = load_table(thresholds)?;
    let config = load_config(config)?;
    info!(
        version = table.version(),
        sectors = config.sectors.len(),
        "saracheck v{}",
        env!("CARGO_PKG_VERSION")
    );

    let contracts = saracheck_store::load_contracts(placsp)
        .with_context(|| format!("reading register extract {}", placsp.display()))?;
    let notices = saracheck_store::load_notices(ted).context("reading TED extracts")?;

    let run = saracheck_match::run(&contracts, &notices, &table, &config);

    let written = saracheck_store::write_run(out, &run)
        .with_context(|| format!("writing outputs to {}", out.display()))?;

    display::print_run_summary(&run);
    println!();
    for path in written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn cmd_thresholds(thresholds: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let table = load_table(thresholds)?;
    if json {
        println!("{}", table.to_json_string()?);
    } else {
        display::print_threshold_table(&table);
    }
    Ok(())
}

fn cmd_classify(
    category: &str,
    tier: Option<&str>,
    year: i32,
    amount: &str,
    thresholds: Option<&Path>,
) -> anyhow::Result<()> {
    let table = load_table(thresholds)?;
    let Some(amount) = normalize::parse_amount(amount) else {
        bail!("unparseable amount: {amount}");
    };
    let contract = ProcurementContract {
        id: "cli".into(),
        category: Some(category.to_owned()),
        buyer_tier: tier.map(str::to_owned),
        award_amount: Some(amount),
        year: Some(year),
        ..Default::default()
    };
    let normalized = NormalizedContract::from_contract(&contract, MatchConfig::default().vat_rate);
    let decision = classify(&normalized, &table);
    display::print_classification(&normalized, &decision);
    Ok(())
}
