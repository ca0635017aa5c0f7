//! Vendor client for the expedition ("Explorer") product line.
//!
//! Price is never exposed by a single call. The chain is:
//! travel filter listing -> detail page (product codes embedded in script
//! markup) -> gateways (first available sail date) -> grouped availability
//! (mints a quote id + calendar) -> per-date package prices scoped to the
//! quote. Each method takes its inputs explicitly and returns a typed
//! record for the next step.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::database_ops::date_portion;
use crate::util::env as env_util;

/// Voyage type label every expedition fact is tagged with.
pub const VOYAGE_TYPE: &str = "EXPLORER";

const BOOKING_SOURCE: &str = "TDL_B2C_NO";

/// One row of the vendor's travel-filter listing.
#[derive(Debug, Clone)]
pub struct VoyageSummary {
    pub name: String,
    pub voyage_url: String,
    pub image_url: String,
    pub map_url: String,
    pub destination: String,
    /// Ship id from the listing; the calendar usually carries a better one.
    pub ship_code: Option<String>,
}

/// What a voyage detail page yields: embedded product codes plus the
/// sold-out promotion banner state.
#[derive(Debug, Clone, Default)]
pub struct VoyageDetail {
    pub codes: Vec<String>,
    pub sold_out: bool,
}

#[derive(Debug, Clone)]
pub struct CalendarVoyage {
    pub voyage_id: String,
    pub ship_code: Option<String>,
}

/// One sail-date slot of a grouped-availability calendar. `voyage` is None
/// when no sail backs the slot.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub date: String,
    pub voyage: Option<CalendarVoyage>,
}

#[derive(Debug, Clone)]
pub struct GroupedAvailability {
    pub quote_id: String,
    pub calendar: Vec<CalendarEntry>,
}

/// One cabin-category line item of a resolved quote.
#[derive(Debug, Clone)]
pub struct CategoryPrice {
    pub code: String,
    pub amount: f64,
}

pub struct ExplorerProvider {
    site_url: String,
    main_url: String,
    api_url: String,
    http: Client,
}

impl ExplorerProvider {
    pub fn new(timeout_secs: Option<u64>) -> Result<Self> {
        let timeout = timeout_secs.unwrap_or_else(env_util::http_timeout_secs);
        let http = Client::builder()
            .user_agent("cruisefare/0.1")
            .timeout(Duration::from_secs(timeout))
            .build()?;
        Ok(Self {
            site_url: base_url("HRG_SITE_URL", "https://www.hurtigruten.com"),
            main_url: base_url("HRG_MAIN_URL", "https://www.hurtigruten.no"),
            api_url: base_url("HRG_API_URL", "https://shadowprodapi.hurtigruten.com/api"),
            http,
        })
    }

    /// Full voyage listing for the fixed market/locale the discovery run
    /// walks. Order is the vendor's.
    pub async fn travel_filter(&self) -> Result<Vec<VoyageSummary>> {
        let url = format!(
            "{}/api/travelfilter?destinationId=&departureMonthYear=&shipId=&marketCode=NO&languageCode=no",
            self.site_url
        );
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("travel filter response was not JSON")?;
        parse_travel_filter(&body, &self.main_url)
    }

    /// Fetch a voyage's detail page and pull the product codes and the
    /// sold-out banner out of the markup.
    pub async fn voyage_detail(&self, voyage: &VoyageSummary) -> Result<VoyageDetail> {
        let url = format!("{}{}", self.main_url, voyage.voyage_url);
        let html = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(voyage = %voyage.name, bytes = html.len(), "voyage detail page fetched");
        Ok(VoyageDetail {
            codes: extract_travel_codes(&html),
            sold_out: detect_sold_out(&html),
        })
    }

    /// First candidate sail date for a product code (date portion only).
    pub async fn first_gateway_date(&self, code: &str) -> Result<String> {
        let url = format!("{}/travelsuggestions/gateways", self.api_url);
        let payload = json!({
            "travelSuggestionCodes": [code],
            "marketCode": "NO",
            "languageCode": "no",
        });
        let body: Value = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let raw = body
            .get("gateways")
            .and_then(|g| g.get(0))
            .and_then(|g| g.get("firstAvailableDate"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("gateways response has no firstAvailableDate for {code}"))?;
        Ok(date_portion(raw).to_string())
    }

    /// Grouped availability mints the quote id the per-date price lookups
    /// are scoped to, plus the calendar of candidate sail dates.
    pub async fn grouped_availability(
        &self,
        code: &str,
        search_from: &str,
        market: &str,
    ) -> Result<GroupedAvailability> {
        let url = format!("{}/availability/travelsuggestions/grouped", self.api_url);
        let payload = json!({
            "packageCode": code,
            "searchFromDateTime": search_from,
            "cabins": [{
                "passengers": [
                    { "ageCategory": "ADULT", "guestType": "REGULAR" },
                    { "ageCategory": "ADULT", "guestType": "REGULAR" }
                ]
            }],
            "currencyCode": "NOK",
            "marketCode": market,
            "languageCode": "no",
            "quoteId": null,
            "bookingSourceCode": BOOKING_SOURCE,
        });
        let body: Value = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_grouped_availability(&body)
            .with_context(|| format!("grouped availability for code={code} market={market}"))
    }

    /// Itemized per-category prices for one sail, scoped to a previously
    /// minted quote.
    pub async fn package_prices(
        &self,
        quote_id: &str,
        date: &str,
        voyage_id: &str,
    ) -> Result<Vec<CategoryPrice>> {
        let url = format!(
            "{}/quotes/{}/packagePrices?date={}&voyageId={}",
            self.api_url, quote_id, date, voyage_id
        );
        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_category_prices(&body))
    }
}

fn base_url(key: &str, default: &str) -> String {
    env_util::env_opt(key)
        .unwrap_or_else(|| default.into())
        .trim_end_matches('/')
        .to_string()
}

fn parse_travel_filter(body: &Value, main_url: &str) -> Result<Vec<VoyageSummary>> {
    let voyages = body
        .get("voyages")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("travel filter response has no voyages array"))?;
    let mut out = Vec::with_capacity(voyages.len());
    for voyage in voyages {
        let Some(voyage_url) = voyage.get("voyageUrl").and_then(|u| u.as_str()) else {
            continue;
        };
        out.push(VoyageSummary {
            name: voyage
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            voyage_url: voyage_url.to_string(),
            image_url: site_absolute(main_url, voyage.get("image")),
            map_url: site_absolute(main_url, voyage.get("map")),
            destination: voyage
                .get("destination")
                .and_then(|d| d.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            ship_code: voyage
                .get("ships")
                .and_then(|s| s.get(0))
                .and_then(|s| s.get("id"))
                .and_then(value_to_string),
        });
    }
    Ok(out)
}

/// Listing image/map paths are site-relative; prefix the main host.
fn site_absolute(main_url: &str, path: Option<&Value>) -> String {
    match path.and_then(|p| p.as_str()) {
        Some(p) => format!("{main_url}{p}"),
        None => String::new(),
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn value_to_string(v: &Value) -> Option<String> {
    if let Some(s) = v.as_str() {
        return Some(s.to_string());
    }
    v.as_i64().map(|n| n.to_string())
}

fn value_as_f64(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    if let Some(s) = v.as_str() {
        return s.parse::<f64>().ok();
    }
    None
}

static CODE_RE: OnceLock<Regex> = OnceLock::new();

/// Product codes embedded in detail-page script markup as `id: "<code>"`,
/// comma-joined inside the first match. Missing or malformed markup yields
/// an empty list.
pub fn extract_travel_codes(html: &str) -> Vec<String> {
    let re = CODE_RE.get_or_init(|| Regex::new(r#"id: "([^"]+)""#).unwrap());
    let Some(script) = script_block_containing(html, "products") else {
        return Vec::new();
    };
    let Some(caps) = re.captures(script) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .map(|code| code.trim().to_string())
        .filter(|code| !code.is_empty())
        .collect()
}

fn script_block_containing<'a>(html: &'a str, needle: &str) -> Option<&'a str> {
    let mut rest = html;
    while let Some(start) = rest.find("<script") {
        let tail = &rest[start..];
        let end = tail
            .find("</script>")
            .map(|e| e + "</script>".len())
            .unwrap_or(tail.len());
        let block = &tail[..end];
        if block.contains(needle) {
            return Some(block);
        }
        rest = &tail[end..];
    }
    None
}

/// The vendor flags sold-out departures with a promotion banner on the
/// detail page rather than through the API.
pub fn detect_sold_out(html: &str) -> bool {
    let Some(pos) = html.find("top-image-promotion") else {
        return false;
    };
    let tail = &html[pos..];
    let end = tail.find("</div>").unwrap_or(tail.len());
    tail[..end].to_ascii_lowercase().contains("sold out")
}

fn parse_grouped_availability(body: &Value) -> Result<GroupedAvailability> {
    let quote_id = body
        .get("quoteId")
        .and_then(value_to_string)
        .ok_or_else(|| anyhow!("grouped availability response has no quoteId"))?;
    let mut calendar = Vec::new();
    if let Some(entries) = body.get("calendar").and_then(|c| c.as_array()) {
        for entry in entries {
            let Some(date_raw) = entry.get("date").and_then(|d| d.as_str()) else {
                continue;
            };
            let voyage = entry
                .get("voyages")
                .and_then(|v| v.as_array())
                .and_then(|v| v.first())
                .and_then(|first| {
                    Some(CalendarVoyage {
                        voyage_id: value_to_string(first.get("voyageId")?)?,
                        ship_code: first
                            .get("ship")
                            .and_then(|s| s.get("shipCode"))
                            .and_then(|c| c.as_str())
                            .map(str::to_string),
                    })
                });
            calendar.push(CalendarEntry {
                date: date_portion(date_raw).to_string(),
                voyage,
            });
        }
    }
    Ok(GroupedAvailability { quote_id, calendar })
}

fn parse_category_prices(body: &Value) -> Vec<CategoryPrice> {
    let mut out = Vec::new();
    if let Some(items) = body.get("categoryPrices").and_then(|c| c.as_array()) {
        for item in items {
            let Some(code) = item.get("code").and_then(|c| c.as_str()) else {
                continue;
            };
            let Some(amount) = item
                .get("price")
                .and_then(|p| p.get("amount"))
                .and_then(value_as_f64)
            else {
                continue;
            };
            out.push(CategoryPrice {
                code: code.to_string(),
                amount,
            });
        }
    }
    out
}
