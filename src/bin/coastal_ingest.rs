//! Run the coastal route-matrix pricing sweep once, end to end.

use anyhow::Result;
use cruisefare::database_ops::coastal::{self, CoastalProvider};
use cruisefare::database_ops::db::Db;
use cruisefare::logging::init_tracing;
use cruisefare::util::env as env_util;

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing("info,cruisefare=debug")?;

    let db = Db::open(env_util::db_path())?;
    let provider = CoastalProvider::new(None)?;
    let report = coastal::run(&provider, &db).await?;

    eprintln!(
        "INFO: coastal ingest finished - facts_written={}, facts_deduplicated={}, skipped={}",
        report.facts_written,
        report.facts_deduplicated,
        report.skipped.len()
    );
    Ok(())
}
