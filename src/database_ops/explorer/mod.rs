//! Voyage discovery + quote resolution for the expedition product line.
//!
//! Walks the vendor's travel-filter listing, pulls product codes off each
//! voyage's detail page, then runs the gateways -> grouped availability ->
//! per-date quote chain for every (code, market) pair. Fully sequential;
//! one failed step skips the unit of work it covers and the run keeps
//! going, with the skip recorded on the run report.

pub mod provider;

pub use provider::{ExplorerProvider, VOYAGE_TYPE};

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::database_ops::db::{insert_explorer_fact, Db, ExplorerFactKey};
use crate::database_ops::dims::{
    ensure_cabin_category, ensure_departure_date, ensure_destination, ensure_report_date,
    ensure_ship, ensure_source_market, ensure_tour, ensure_voyage_type,
};
use crate::database_ops::report::IngestReport;
use crate::util::env as env_util;
use provider::{CalendarEntry, CategoryPrice, VoyageDetail, VoyageSummary};

/// Run the full discovery + quote pipeline against the configured vendor
/// endpoints, writing price observations as they are produced.
pub async fn run(provider: &ExplorerProvider, db: &Db) -> Result<IngestReport> {
    let report_date = Utc::now().date_naive();
    let markets = env_util::markets();
    let mut report = IngestReport::default();

    let voyages = provider.travel_filter().await?;
    info!(voyages = voyages.len(), "travel filter listing fetched");

    for (index, voyage) in voyages.iter().enumerate() {
        let detail = match provider.voyage_detail(voyage).await {
            Ok(detail) => detail,
            Err(err) => {
                report.skip(format!("voyage[{index}] {}", voyage.name), err);
                continue;
            }
        };
        if detail.codes.is_empty() {
            debug!(voyage = %voyage.name, "no product codes on detail page");
            continue;
        }
        for code in &detail.codes {
            for market in &markets {
                if let Err(err) =
                    quote_chain(provider, db, &mut report, voyage, &detail, code, market, report_date)
                        .await
                {
                    report.skip(format!("code={code} market={market}"), err);
                }
            }
        }
    }

    report.log_summary("explorer");
    Ok(report)
}

/// Gateways -> grouped availability -> per-date quote for one
/// (product code, market) pair. An error anywhere in the chain aborts just
/// this pair; partial progress is discarded, not retried.
#[allow(clippy::too_many_arguments)]
async fn quote_chain(
    provider: &ExplorerProvider,
    db: &Db,
    report: &mut IngestReport,
    voyage: &VoyageSummary,
    detail: &VoyageDetail,
    code: &str,
    market: &str,
    report_date: NaiveDate,
) -> Result<()> {
    let sail_from = provider.first_gateway_date(code).await?;
    let grouped = provider.grouped_availability(code, &sail_from, market).await?;
    debug!(
        code,
        market,
        quote_id = %grouped.quote_id,
        entries = grouped.calendar.len(),
        "grouped availability resolved"
    );
    for entry in &grouped.calendar {
        let Some(sail) = &entry.voyage else {
            // No sail behind this calendar slot. Expected absence when the
            // voyage page carried the sold-out banner; otherwise worth a
            // skip record.
            if detail.sold_out {
                debug!(code, market, date = %entry.date, "empty calendar slot on sold-out voyage");
            } else {
                report.skip(
                    format!("code={code} market={market} date={}", entry.date),
                    "calendar entry has no voyage",
                );
            }
            continue;
        };
        let prices = match provider
            .package_prices(&grouped.quote_id, &entry.date, &sail.voyage_id)
            .await
        {
            Ok(prices) => prices,
            Err(err) => {
                report.skip(
                    format!("code={code} market={market} date={}", entry.date),
                    err,
                );
                continue;
            }
        };
        store_quote_prices(db, report, voyage, entry, &prices, market, report_date);
    }
    Ok(())
}

/// Write one fact row per cabin-category line item of a resolved quote.
/// A bad line item drops only that line item.
fn store_quote_prices(
    db: &Db,
    report: &mut IngestReport,
    voyage: &VoyageSummary,
    entry: &CalendarEntry,
    prices: &[CategoryPrice],
    market: &str,
    report_date: NaiveDate,
) {
    for price in prices {
        match store_observation(db, voyage, entry, price, market, report_date) {
            Ok(inserted) => report.record_fact(inserted),
            Err(err) => report.skip(
                format!("market={market} date={} category={}", entry.date, price.code),
                err,
            ),
        }
    }
}

/// Resolve every dimension the observation touches, then insert the fact.
/// Only fully resolved combinations ever reach the fact table.
fn store_observation(
    db: &Db,
    voyage: &VoyageSummary,
    entry: &CalendarEntry,
    price: &CategoryPrice,
    market: &str,
    report_date: NaiveDate,
) -> Result<bool> {
    let sail = entry
        .voyage
        .as_ref()
        .ok_or_else(|| anyhow!("calendar entry has no voyage"))?;
    let ship_code = sail
        .ship_code
        .as_deref()
        .or(voyage.ship_code.as_deref())
        .ok_or_else(|| anyhow!("no ship code for sail on {}", entry.date))?;
    let key = ExplorerFactKey {
        report_date_id: ensure_report_date(db, report_date)?,
        ship_id: ensure_ship(db, ship_code)?,
        category_id: ensure_cabin_category(db, &price.code)?,
        voyage_type_id: ensure_voyage_type(db, VOYAGE_TYPE)?,
        departure_date_id: ensure_departure_date(db, &entry.date)?,
        tour_id: ensure_tour(db, &voyage.name, &voyage.image_url, &voyage.map_url)?,
        destination_id: ensure_destination(db, &voyage.destination)?,
        market_id: ensure_source_market(db, market)?,
    };
    insert_explorer_fact(db, &key, price.amount)
}

#[cfg(test)]
mod tests {
    use super::provider::CalendarVoyage;
    use super::*;

    fn sample_voyage() -> VoyageSummary {
        VoyageSummary {
            name: "Svalbard Express".into(),
            voyage_url: "/cruises/svalbard".into(),
            image_url: "https://example.invalid/img.jpg".into(),
            map_url: "https://example.invalid/map.jpg".into(),
            destination: "Svalbard".into(),
            ship_code: Some("MS".into()),
        }
    }

    fn sample_entry(date: &str, ship: Option<&str>) -> CalendarEntry {
        CalendarEntry {
            date: date.into(),
            voyage: Some(CalendarVoyage {
                voyage_id: "981".into(),
                ship_code: ship.map(str::to_string),
            }),
        }
    }

    fn report_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 14).unwrap()
    }

    #[test]
    fn quote_prices_become_one_fact_per_category() {
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        let prices = vec![
            CategoryPrice { code: "PI".into(), amount: 12995.0 },
            CategoryPrice { code: "PO".into(), amount: 14995.0 },
            CategoryPrice { code: "AS".into(), amount: 18995.0 },
            CategoryPrice { code: "ES".into(), amount: 27995.0 },
        ];
        store_quote_prices(
            &db,
            &mut report,
            &sample_voyage(),
            &sample_entry("2021-05-01", Some("MS")),
            &prices,
            "NO",
            report_date(),
        );
        assert_eq!(report.facts_written, 4);
        assert!(report.skipped.is_empty());
        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM Data_Explorer", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 4);
    }

    #[test]
    fn rerun_over_same_quote_is_a_no_op() {
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        let prices = vec![CategoryPrice { code: "PI".into(), amount: 12995.0 }];
        for _ in 0..2 {
            store_quote_prices(
                &db,
                &mut report,
                &sample_voyage(),
                &sample_entry("2021-05-01", Some("MS")),
                &prices,
                "NO",
                report_date(),
            );
        }
        assert_eq!(report.facts_written, 1);
        assert_eq!(report.facts_deduplicated, 1);
        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM Data_Explorer", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn voyageless_entry_cannot_store() {
        let db = Db::open_in_memory().unwrap();
        let entry = CalendarEntry { date: "2021-05-08".into(), voyage: None };
        let price = CategoryPrice { code: "PI".into(), amount: 12995.0 };
        let err = store_observation(&db, &sample_voyage(), &entry, &price, "NO", report_date());
        assert!(err.is_err());
        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM Data_Explorer", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn listing_ship_code_backfills_missing_calendar_ship() {
        let db = Db::open_in_memory().unwrap();
        let price = CategoryPrice { code: "PI".into(), amount: 12995.0 };
        let inserted = store_observation(
            &db,
            &sample_voyage(),
            &sample_entry("2021-05-01", None),
            &price,
            "NO",
            report_date(),
        )
        .unwrap();
        assert!(inserted);
        let ship: String = db
            .conn
            .query_row("SELECT ShipCode FROM dimShips", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ship, "MS");
    }

    #[test]
    fn one_failed_branch_leaves_the_other_stored() {
        // Two (code, market) branches: one resolves to prices, the other
        // dies at the gateway step. The run keeps the good branch's facts
        // and a skip record for the bad one.
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        store_quote_prices(
            &db,
            &mut report,
            &sample_voyage(),
            &sample_entry("2021-05-01", Some("MS")),
            &[CategoryPrice { code: "PI".into(), amount: 12995.0 }],
            "NO",
            report_date(),
        );
        report.skip("code=SVALBARD-2021 market=DE", "gateways request failed");
        assert_eq!(report.facts_written, 1);
        assert_eq!(report.skipped.len(), 1);
        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM Data_Explorer", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
