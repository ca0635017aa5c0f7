//! Route-matrix pricing for the coastal service.
//!
//! Iterates a rolling monthly window, querying availability once per
//! (market, departure port, arrival port) combination and writing every
//! available cabin-category line item as a fact. A failed combination is
//! recorded on the run report and the sweep moves on; nothing is retried
//! within a run.

pub mod provider;

pub use provider::CoastalProvider;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use itertools::iproduct;
use tracing::info;

use crate::database_ops::date_portion;
use crate::database_ops::db::{insert_coastal_fact, CoastalFactKey, Db};
use crate::database_ops::dims::{
    ensure_arrival_port, ensure_cabin_category, ensure_departure_date, ensure_departure_port,
    ensure_report_date, ensure_ship, ensure_source_market, ensure_voyage_type,
};
use crate::database_ops::report::IngestReport;
use crate::util::env as env_util;
use provider::{AvailabilityDay, AvailabilityQuery, Sailing, SailingCategoryPrice, OCCUPANCY};

/// Candidate departure and arrival ports of the matrix.
pub const DEPARTURE_PORTS: &[&str] = &["BGO", "KKN"];
pub const ARRIVAL_PORTS: &[&str] = &["BGO", "KKN", "TRD"];

/// The Kirkenes turnaround leg the vendor never sells directly. Self-pairs
/// are filtered separately.
const EXCLUDED_PAIRS: &[(&str, &str)] = &[("KKN", "TRD")];

/// First day of the month `date` falls in.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// One month forward, first of month; December rolls into January of the
/// next year.
pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// The (market, from, to) combinations one monthly sweep queries.
pub fn route_matrix(markets: &[String]) -> Vec<(String, String, String)> {
    iproduct!(markets, DEPARTURE_PORTS, ARRIVAL_PORTS)
        .filter(|(_, dp, ap)| dp != ap)
        .filter(|(_, dp, ap)| !EXCLUDED_PAIRS.contains(&(**dp, **ap)))
        .map(|(market, dp, ap)| (market.clone(), dp.to_string(), ap.to_string()))
        .collect()
}

/// Run the monthly route-matrix sweep against the configured endpoint,
/// writing price observations as they are produced.
pub async fn run(provider: &CoastalProvider, db: &Db) -> Result<IngestReport> {
    let today = Utc::now().date_naive();
    let start = month_start(
        env_util::env_opt("COASTAL_START_DATE")
            .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok())
            .unwrap_or(today),
    );
    let end = env_util::env_opt("COASTAL_END_DATE")
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok())
        .unwrap_or_else(|| (0..12).fold(start, |date, _| next_month(date)));
    let via_kirkenes = env_util::env_flag("COASTAL_VIA_KIRKENES", true);
    let combinations = route_matrix(&env_util::markets());
    let report_date = today;
    let mut report = IngestReport::default();

    info!(
        start = %start,
        end = %end,
        combinations = combinations.len(),
        via_kirkenes,
        "coastal sweep starting"
    );

    let mut request_date = start;
    while request_date < end {
        for (market, from_port, to_port) in &combinations {
            let query = AvailabilityQuery {
                from_port: from_port.clone(),
                to_port: to_port.clone(),
                market: market.clone(),
                search_from: request_date,
                via_kirkenes,
            };
            match provider.availability(&query).await {
                Ok(calendar) => store_calendar(db, &mut report, &query, &calendar, report_date),
                Err(err) => report.skip(
                    format!("{request_date} {from_port}->{to_port} {market}"),
                    err,
                ),
            }
        }
        request_date = next_month(request_date);
    }

    report.log_summary("coastal");
    Ok(report)
}

/// Walk calendar -> sailings -> category line items. Only line items the
/// vendor marks available become facts; dates without sailings and
/// sailings without price lists are normal and pass silently.
fn store_calendar(
    db: &Db,
    report: &mut IngestReport,
    query: &AvailabilityQuery,
    calendar: &[AvailabilityDay],
    report_date: NaiveDate,
) {
    for day in calendar {
        let Some(sailings) = day.voyages.as_ref() else {
            continue;
        };
        for sailing in sailings {
            let Some(categories) = sailing.category_prices.as_ref() else {
                continue;
            };
            for category in categories {
                if !category.available {
                    continue;
                }
                let Some(price) = category.price.as_ref() else {
                    continue;
                };
                match store_observation(db, query, day, sailing, category, price.amount, report_date)
                {
                    Ok(inserted) => report.record_fact(inserted),
                    Err(err) => report.skip(
                        format!(
                            "{} {}->{} {} {}",
                            day.date, query.from_port, query.to_port, query.market, category.code
                        ),
                        err,
                    ),
                }
            }
        }
    }
}

/// Resolve every dimension the observation touches, then insert the fact.
fn store_observation(
    db: &Db,
    query: &AvailabilityQuery,
    day: &AvailabilityDay,
    sailing: &Sailing,
    category: &SailingCategoryPrice,
    amount: f64,
    report_date: NaiveDate,
) -> Result<bool> {
    let key = CoastalFactKey {
        report_date_id: ensure_report_date(db, report_date)?,
        ship_id: ensure_ship(db, &sailing.ship.ship_code)?,
        category_id: ensure_cabin_category(db, &category.code)?,
        voyage_type_id: ensure_voyage_type(db, &sailing.voyage_type)?,
        departure_date_id: ensure_departure_date(db, date_portion(&day.date))?,
        departure_port_id: ensure_departure_port(db, &query.from_port)?,
        arrival_port_id: ensure_arrival_port(db, &query.to_port)?,
        market_id: ensure_source_market(db, &query.market)?,
    };
    insert_coastal_fact(db, &key, OCCUPANCY, query.via_kirkenes, amount)
}

#[cfg(test)]
mod tests {
    use super::provider::{PriceAmount, ShipRef};
    use super::*;

    fn markets() -> Vec<String> {
        ["NO", "FR", "DE", "UK", "US"]
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    fn sample_query() -> AvailabilityQuery {
        AvailabilityQuery {
            from_port: "BGO".into(),
            to_port: "KKN".into(),
            market: "DE".into(),
            search_from: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            via_kirkenes: true,
        }
    }

    fn sample_day(categories: Vec<SailingCategoryPrice>) -> AvailabilityDay {
        AvailabilityDay {
            date: "2020-02-04T00:00:00".into(),
            voyages: Some(vec![Sailing {
                voyage_type: "NORTH".into(),
                ship: ShipRef { ship_code: "TN".into() },
                category_prices: Some(categories),
            }]),
        }
    }

    fn coastal_rows(db: &Db) -> i64 {
        db.conn
            .query_row("SELECT COUNT(*) FROM Data", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn december_rolls_into_next_january() {
        let december = NaiveDate::from_ymd_opt(2019, 12, 5).unwrap();
        assert_eq!(
            next_month(month_start(december)),
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
    }

    #[test]
    fn monthly_iteration_reaches_end_in_known_steps() {
        let start = month_start(NaiveDate::from_ymd_opt(2019, 5, 14).unwrap());
        let end = NaiveDate::from_ymd_opt(2020, 6, 2).unwrap();
        let mut date = start;
        let mut steps = 0;
        while date < end {
            steps += 1;
            date = next_month(date);
        }
        // 2019-05 through 2020-06 inclusive.
        assert_eq!(steps, 14);
        assert!(date >= end);
    }

    #[test]
    fn route_matrix_excludes_self_pairs_and_kirkenes_trondheim() {
        let combos = route_matrix(&markets());
        // 6 raw pairs minus BGO-BGO, KKN-KKN and KKN-TRD, times 5 markets.
        assert_eq!(combos.len(), 15);
        for (_, dp, ap) in &combos {
            assert_ne!(dp, ap);
            assert!(!(dp == "KKN" && ap == "TRD"));
        }
    }

    #[test]
    fn unavailable_line_items_never_become_facts() {
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        let day = sample_day(vec![
            SailingCategoryPrice {
                code: "I2".into(),
                available: true,
                price: Some(PriceAmount { amount: 4590.0 }),
            },
            SailingCategoryPrice {
                code: "U2".into(),
                available: false,
                price: Some(PriceAmount { amount: 9999.0 }),
            },
            SailingCategoryPrice { code: "O2".into(), available: true, price: None },
        ]);
        store_calendar(
            &db,
            &mut report,
            &sample_query(),
            &[day],
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        );
        assert_eq!(report.facts_written, 1);
        assert_eq!(coastal_rows(&db), 1);
        let category: String = db
            .conn
            .query_row("SELECT Category FROM dimCabinCategory", [], |r| r.get(0))
            .unwrap();
        assert_eq!(category, "I2");
    }

    #[test]
    fn empty_dates_and_priceless_sailings_pass_silently() {
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        let calendar = vec![
            AvailabilityDay { date: "2020-02-03T00:00:00".into(), voyages: None },
            AvailabilityDay {
                date: "2020-02-04T00:00:00".into(),
                voyages: Some(vec![Sailing {
                    voyage_type: "NORTH".into(),
                    ship: ShipRef { ship_code: "MS".into() },
                    category_prices: None,
                }]),
            },
        ];
        store_calendar(
            &db,
            &mut report,
            &sample_query(),
            &calendar,
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
        );
        assert_eq!(report.facts_written, 0);
        assert!(report.skipped.is_empty());
        assert_eq!(coastal_rows(&db), 0);
    }

    #[test]
    fn rerun_over_same_calendar_is_a_no_op() {
        let db = Db::open_in_memory().unwrap();
        let mut report = IngestReport::default();
        let day = sample_day(vec![SailingCategoryPrice {
            code: "I2".into(),
            available: true,
            price: Some(PriceAmount { amount: 4590.0 }),
        }]);
        let report_date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        store_calendar(&db, &mut report, &sample_query(), &[day.clone()], report_date);
        store_calendar(&db, &mut report, &sample_query(), &[day], report_date);
        assert_eq!(report.facts_written, 1);
        assert_eq!(report.facts_deduplicated, 1);
        assert_eq!(coastal_rows(&db), 1);
    }
}
