//! Single-endpoint availability client for the coastal route matrix.
//!
//! Unlike the expedition chain there is no quote minting: one POST per
//! (month, market, from-port, to-port) combination returns the whole
//! calendar of sailings with per-category price line items.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::util::env as env_util;

const BOOKING_SOURCE: &str = "TDL_B2C_NO";

/// Passenger count of the fixed two-adult cabin composition every request
/// carries; stored as the occupancy measure on each fact.
pub const OCCUPANCY: f64 = 2.0;

/// One (from, to, market, month) availability request.
#[derive(Debug, Clone)]
pub struct AvailabilityQuery {
    pub from_port: String,
    pub to_port: String,
    pub market: String,
    pub search_from: NaiveDate,
    pub via_kirkenes: bool,
}

/// One calendar slot; `voyages` is null on dates with no sailing.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityDay {
    pub date: String,
    #[serde(default)]
    pub voyages: Option<Vec<Sailing>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sailing {
    #[serde(rename = "voyageType")]
    pub voyage_type: String,
    pub ship: ShipRef,
    #[serde(rename = "categoryPrices", default)]
    pub category_prices: Option<Vec<SailingCategoryPrice>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipRef {
    #[serde(rename = "shipCode")]
    pub ship_code: String,
}

/// A cabin-category line item. Only items the vendor marks available carry
/// a sellable price.
#[derive(Debug, Clone, Deserialize)]
pub struct SailingCategoryPrice {
    pub code: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub price: Option<PriceAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceAmount {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    calendar: Vec<AvailabilityDay>,
}

pub struct CoastalProvider {
    url: String,
    http: Client,
}

impl CoastalProvider {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let timeout = timeout_secs.unwrap_or_else(env_util::http_timeout_secs);
        let http = Client::builder()
            .user_agent("cruisefare/0.1")
            .timeout(Duration::from_secs(timeout))
            .build()?;
        Ok(Self {
            url: env_util::env_opt("HRG_AVAILABILITY_URL")
                .unwrap_or_else(|| "https://api.hurtigruten.com/api/Availability".into()),
            http,
        })
    }

    pub async fn availability(&self, query: &AvailabilityQuery) -> Result<Vec<AvailabilityDay>> {
        let payload = availability_payload(query);
        let response: AvailabilityResponse = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| {
                format!(
                    "availability response for {}->{} {} {}",
                    query.from_port, query.to_port, query.market, query.search_from
                )
            })?;
        Ok(response.calendar)
    }
}

pub(crate) fn availability_payload(query: &AvailabilityQuery) -> Value {
    json!({
        "currencyCode": "NOK",
        "quoteId": "",
        "fromPort": query.from_port,
        "toPort": query.to_port,
        "isViaKirkenes": query.via_kirkenes,
        "searchFromDateTime": format!("{}T00:00:00", query.search_from.format("%Y-%m-%d")),
        "cabins": [{
            "passengers": [
                { "ageCategory": "ADULT", "guestType": "REGULAR" },
                { "ageCategory": "ADULT", "guestType": "REGULAR" }
            ]
        }],
        "bookingSourceCode": BOOKING_SOURCE,
        "marketCode": query.market,
        "languageCode": "en",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_query() -> AvailabilityQuery {
        AvailabilityQuery {
            from_port: "BGO".into(),
            to_port: "KKN".into(),
            market: "DE".into(),
            search_from: NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            via_kirkenes: true,
        }
    }

    #[test]
    fn payload_carries_route_market_and_composition() {
        let payload = availability_payload(&sample_query());
        assert_eq!(payload["fromPort"], "BGO");
        assert_eq!(payload["toPort"], "KKN");
        assert_eq!(payload["marketCode"], "DE");
        assert_eq!(payload["isViaKirkenes"], true);
        assert_eq!(payload["searchFromDateTime"], "2020-02-01T00:00:00");
        assert_eq!(payload["bookingSourceCode"], "TDL_B2C_NO");
        let passengers = payload["cabins"][0]["passengers"].as_array().unwrap();
        assert_eq!(passengers.len() as f64, OCCUPANCY);
    }

    #[test]
    fn calendar_deserializes_null_voyages_and_prices() {
        let raw = r#"{
            "calendar": [
                { "date": "2020-02-03T00:00:00", "voyages": null },
                { "date": "2020-02-04T00:00:00", "voyages": [
                    {
                        "voyageType": "NORTH",
                        "ship": { "shipCode": "TN" },
                        "categoryPrices": [
                            { "code": "I2", "available": true, "price": { "amount": 4590.0 } },
                            { "code": "U2", "available": false, "price": null }
                        ]
                    },
                    { "voyageType": "NORTH", "ship": { "shipCode": "MS" }, "categoryPrices": null }
                ]}
            ]
        }"#;
        let parsed: AvailabilityResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.calendar.len(), 2);
        assert!(parsed.calendar[0].voyages.is_none());
        let sailings = parsed.calendar[1].voyages.as_ref().unwrap();
        assert_eq!(sailings.len(), 2);
        let categories = sailings[0].category_prices.as_ref().unwrap();
        assert!(categories[0].available);
        assert!(categories[1].price.is_none());
        assert!(sailings[1].category_prices.is_none());
    }
}
