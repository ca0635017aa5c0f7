//! Dimension lookups.
//!
//! Every value is created lazily on first observation and its synthetic id
//! reused on every later lookup: INSERT OR IGNORE, then SELECT. Rows are
//! never updated or deleted. The single-writer connection makes the
//! two-statement upsert safe without an explicit transaction.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params;
use tracing::debug;

use super::db::Db;

pub fn ensure_report_date(db: &Db, report_date: NaiveDate) -> Result<i64> {
    let value = report_date.format("%Y-%m-%d").to_string();
    db.conn.execute(
        "INSERT OR IGNORE INTO dimReportDate (ReportDate) VALUES (?1)",
        params![value],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimReportDate WHERE ReportDate = ?1",
        params![value],
        |row| row.get(0),
    )?;
    debug!(report_date = %value, id, "report date dimension resolved");
    Ok(id)
}

pub fn ensure_ship(db: &Db, ship_code: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimShips (ShipCode) VALUES (?1)",
        params![ship_code],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimShips WHERE ShipCode = ?1",
        params![ship_code],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_cabin_category(db: &Db, category: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimCabinCategory (Category) VALUES (?1)",
        params![category],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimCabinCategory WHERE Category = ?1",
        params![category],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_voyage_type(db: &Db, voyage_type: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimVoyage (VoyageType) VALUES (?1)",
        params![voyage_type],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimVoyage WHERE VoyageType = ?1",
        params![voyage_type],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_departure_date(db: &Db, departure_date: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimDepartureDate (DepartureDate) VALUES (?1)",
        params![departure_date],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimDepartureDate WHERE DepartureDate = ?1",
        params![departure_date],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Tour rows carry the listing image/map URLs denormalized next to the
/// name; the name alone is the natural key, so later listings with changed
/// artwork keep the first-seen URLs.
pub fn ensure_tour(db: &Db, tour_name: &str, image_url: &str, map_url: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimTour (TourName, TourImg, TourMap) VALUES (?1, ?2, ?3)",
        params![tour_name, image_url, map_url],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimTour WHERE TourName = ?1",
        params![tour_name],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_destination(db: &Db, destination: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimDestination (Destination) VALUES (?1)",
        params![destination],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimDestination WHERE Destination = ?1",
        params![destination],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_departure_port(db: &Db, port: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimDeparturePorts (PortName) VALUES (?1)",
        params![port],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimDeparturePorts WHERE PortName = ?1",
        params![port],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_arrival_port(db: &Db, port: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimArrivalPorts (PortName) VALUES (?1)",
        params![port],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimArrivalPorts WHERE PortName = ?1",
        params![port],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn ensure_source_market(db: &Db, market: &str) -> Result<i64> {
    db.conn.execute(
        "INSERT OR IGNORE INTO dimSourceMarket (SourceMarket) VALUES (?1)",
        params![market],
    )?;
    let id = db.conn.query_row(
        "SELECT id FROM dimSourceMarket WHERE SourceMarket = ?1",
        params![market],
        |row| row.get(0),
    )?;
    Ok(id)
}
