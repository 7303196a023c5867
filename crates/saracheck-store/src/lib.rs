//! Storage layer: Parquet inputs in, Parquet and JSON outputs out.

mod error;
pub use error::StoreError;

pub mod decode;
pub mod encode;
pub mod files;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use saracheck_core::{ProcurementContract, TedNotice};
use saracheck_match::RunOutput;

pub use decode::{decode_contracts, decode_notices, reconcile_notices};
pub use encode::{
    encode_matches, encode_sector_coverage, encode_strategy_yield, encode_validation_by_year,
};
pub use files::{read_parquet, write_json, write_parquet};

/// File names written under the output directory.
pub mod names {
    pub const MATCHES: &str = "sara_matches.parquet";
    pub const VALIDATION_BY_YEAR: &str = "validation_by_year.parquet";
    pub const STRATEGY_YIELD: &str = "strategy_yield.parquet";
    pub const SECTOR_COVERAGE: &str = "sector_coverage.parquet";
    pub const REPORT: &str = "run_report.json";
}

/// Load the register extract.
pub fn load_contracts(path: &Path) -> Result<Vec<ProcurementContract>, StoreError> {
    decode_contracts(&read_parquet(path)?)
}

/// Load and merge one or more TED extracts, e.g. the bulk CSV conversion and
/// the eForms download.
pub fn load_notices(paths: &[PathBuf]) -> Result<Vec<TedNotice>, StoreError> {
    let mut notices = Vec::new();
    for path in paths {
        notices.extend(decode_notices(&read_parquet(path)?)?);
    }
    Ok(reconcile_notices(notices))
}

/// Write every run artefact into `dir`, creating it if needed.
pub fn write_run(dir: &Path, run: &RunOutput) -> Result<Vec<PathBuf>, StoreError> {
    fs::create_dir_all(dir)?;

    let tables = [
        (names::MATCHES, encode_matches(&run.records)?),
        (
            names::VALIDATION_BY_YEAR,
            encode_validation_by_year(&run.summary.validation_by_year)?,
        ),
        (
            names::STRATEGY_YIELD,
            encode_strategy_yield(&run.summary.strategy_yield)?,
        ),
        (
            names::SECTOR_COVERAGE,
            encode_sector_coverage(&run.summary.sector_coverage)?,
        ),
    ];

    let mut written = Vec::with_capacity(tables.len() + 1);
    for (name, batch) in &tables {
        let path = dir.join(name);
        write_parquet(&path, batch)?;
        written.push(path);
    }
    let report = dir.join(names::REPORT);
    write_json(&report, &run.report)?;
    written.push(report);

    info!(dir = %dir.display(), files = written.len(), "run written");
    Ok(written)
}
