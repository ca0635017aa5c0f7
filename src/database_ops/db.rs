//! SQLite storage for normalized price observations.
//!
//! The schema is a small star: dimension tables carry one row per distinct
//! natural-key value, and one fact table per pipeline is keyed by the full
//! set of dimension ids. Re-running a pipeline over identical upstream data
//! hits the composite primary key and becomes a no-op instead of a
//! duplicate insert.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::info;

pub struct Db {
    pub conn: Connection,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dimReportDate (id INTEGER PRIMARY KEY AUTOINCREMENT, ReportDate TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimShips (id INTEGER PRIMARY KEY AUTOINCREMENT, ShipCode TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimCabinCategory (id INTEGER PRIMARY KEY AUTOINCREMENT, Category TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimVoyage (id INTEGER PRIMARY KEY AUTOINCREMENT, VoyageType TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimDepartureDate (id INTEGER PRIMARY KEY AUTOINCREMENT, DepartureDate TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimTour (id INTEGER PRIMARY KEY AUTOINCREMENT, TourName TEXT NOT NULL UNIQUE, TourImg TEXT, TourMap TEXT);
CREATE TABLE IF NOT EXISTS dimDestination (id INTEGER PRIMARY KEY AUTOINCREMENT, Destination TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimDeparturePorts (id INTEGER PRIMARY KEY AUTOINCREMENT, PortName TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimArrivalPorts (id INTEGER PRIMARY KEY AUTOINCREMENT, PortName TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS dimSourceMarket (id INTEGER PRIMARY KEY AUTOINCREMENT, SourceMarket TEXT NOT NULL UNIQUE);
CREATE TABLE IF NOT EXISTS Data_Explorer (
    rDate_id INTEGER NOT NULL,
    ship_id INTEGER NOT NULL,
    cat_id INTEGER NOT NULL,
    type_id INTEGER NOT NULL,
    dep_id INTEGER NOT NULL,
    tour_id INTEGER NOT NULL,
    dest_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    price REAL,
    FOREIGN KEY (rDate_id) REFERENCES dimReportDate(id),
    FOREIGN KEY (ship_id) REFERENCES dimShips(id),
    FOREIGN KEY (cat_id) REFERENCES dimCabinCategory(id),
    FOREIGN KEY (type_id) REFERENCES dimVoyage(id),
    FOREIGN KEY (dep_id) REFERENCES dimDepartureDate(id),
    FOREIGN KEY (tour_id) REFERENCES dimTour(id),
    FOREIGN KEY (dest_id) REFERENCES dimDestination(id),
    FOREIGN KEY (source_id) REFERENCES dimSourceMarket(id),
    PRIMARY KEY (rDate_id, ship_id, cat_id, type_id, dep_id, tour_id, dest_id, source_id));
CREATE TABLE IF NOT EXISTS Data (
    rDate_id INTEGER NOT NULL,
    ship_id INTEGER NOT NULL,
    cat_id INTEGER NOT NULL,
    type_id INTEGER NOT NULL,
    dep_id INTEGER NOT NULL,
    dport_id INTEGER NOT NULL,
    aport_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    occupancy REAL,
    viaKKN REAL,
    price REAL,
    FOREIGN KEY (rDate_id) REFERENCES dimReportDate(id),
    FOREIGN KEY (ship_id) REFERENCES dimShips(id),
    FOREIGN KEY (cat_id) REFERENCES dimCabinCategory(id),
    FOREIGN KEY (type_id) REFERENCES dimVoyage(id),
    FOREIGN KEY (dep_id) REFERENCES dimDepartureDate(id),
    FOREIGN KEY (dport_id) REFERENCES dimDeparturePorts(id),
    FOREIGN KEY (aport_id) REFERENCES dimArrivalPorts(id),
    FOREIGN KEY (source_id) REFERENCES dimSourceMarket(id),
    PRIMARY KEY (rDate_id, ship_id, cat_id, type_id, dep_id, dport_id, aport_id, source_id));
"#;

impl Db {
    /// Open (or create) the pricing database and make sure the star schema
    /// exists. Every statement is IF NOT EXISTS, so reopening an already
    /// initialized file changes nothing; genuine SQL errors still surface.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite database at {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("initializing pricing schema")?;
        info!(db = %path.display(), "pricing database ready");
        Ok(Self { conn })
    }

    /// In-memory database with the full schema. Used by tests; also handy
    /// for dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

/// Dimension ids for one expedition price observation.
#[derive(Debug, Clone, Copy)]
pub struct ExplorerFactKey {
    pub report_date_id: i64,
    pub ship_id: i64,
    pub category_id: i64,
    pub voyage_type_id: i64,
    pub departure_date_id: i64,
    pub tour_id: i64,
    pub destination_id: i64,
    pub market_id: i64,
}

/// Dimension ids for one coastal price observation.
#[derive(Debug, Clone, Copy)]
pub struct CoastalFactKey {
    pub report_date_id: i64,
    pub ship_id: i64,
    pub category_id: i64,
    pub voyage_type_id: i64,
    pub departure_date_id: i64,
    pub departure_port_id: i64,
    pub arrival_port_id: i64,
    pub market_id: i64,
}

/// Insert one expedition fact row. Returns false when the composite key
/// already exists and the row was ignored.
pub fn insert_explorer_fact(db: &Db, key: &ExplorerFactKey, price: f64) -> Result<bool> {
    let changed = db.conn.execute(
        "INSERT OR IGNORE INTO Data_Explorer \
         (rDate_id, ship_id, cat_id, type_id, dep_id, tour_id, dest_id, source_id, price) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            key.report_date_id,
            key.ship_id,
            key.category_id,
            key.voyage_type_id,
            key.departure_date_id,
            key.tour_id,
            key.destination_id,
            key.market_id,
            price
        ],
    )?;
    Ok(changed > 0)
}

/// Insert one coastal fact row. Returns false when the composite key
/// already exists and the row was ignored.
pub fn insert_coastal_fact(
    db: &Db,
    key: &CoastalFactKey,
    occupancy: f64,
    via_kirkenes: bool,
    price: f64,
) -> Result<bool> {
    let changed = db.conn.execute(
        "INSERT OR IGNORE INTO Data \
         (rDate_id, ship_id, cat_id, type_id, dep_id, dport_id, aport_id, source_id, occupancy, viaKKN, price) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            key.report_date_id,
            key.ship_id,
            key.category_id,
            key.voyage_type_id,
            key.departure_date_id,
            key.departure_port_id,
            key.arrival_port_id,
            key.market_id,
            occupancy,
            if via_kirkenes { 1.0 } else { 0.0 },
            price
        ],
    )?;
    Ok(changed > 0)
}
