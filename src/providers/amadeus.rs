//! Amadeus 风格旅行搜索客户端
//!
//! OAuth2 client-credentials 换 token 并缓存（到期前 60 秒提前刷新），
//! 航班 / 酒店 / 活动三类搜索各自把庞大的原始响应化简为紧凑的 offer 结构。
//! 工作单元只依赖 TravelSearchProvider trait，测试用桩替换。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Provider 层错误；工作单元负责把它规范化进 DelegationResult
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("auth failed: {0}")]
    Auth(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no results")]
    NoResults,
}

/// 航班查询（IATA 城市/机场码，日期 YYYY-MM-DD）
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct FlightQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    #[serde(default)]
    pub return_date: Option<String>,
    #[serde(default = "default_adults")]
    pub adults: u32,
}

fn default_adults() -> u32 {
    1
}

/// 酒店查询
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct HotelQuery {
    pub city_code: String,
    pub check_in: String,
    pub check_out: String,
    #[serde(default = "default_adults")]
    pub guests: u32,
}

/// 活动查询（目的地坐标）
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ActivityQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// 搜索半径（公里），缺省 5
    #[serde(default)]
    pub radius_km: Option<u32>,
}

/// 化简后的航班报价
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlightOffer {
    pub carrier: String,
    pub from: String,
    pub to: String,
    pub departure: String,
    pub arrival: String,
    pub stops: u32,
    pub duration: String,
    pub price_total: String,
    pub currency: String,
}

/// 化简后的酒店报价
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HotelOffer {
    pub name: String,
    pub price_total: Option<String>,
    pub currency: Option<String>,
    pub rating: Option<String>,
}

/// 化简后的活动条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityOffer {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<String>,
}

/// 旅行搜索 provider 接口
#[async_trait]
pub trait TravelSearchProvider: Send + Sync {
    async fn search_flights(&self, query: &FlightQuery) -> Result<Vec<FlightOffer>, ProviderError>;
    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<HotelOffer>, ProviderError>;
    async fn search_activities(
        &self,
        query: &ActivityQuery,
    ) -> Result<Vec<ActivityOffer>, ProviderError>;
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 token 缓存：到期前 60 秒提前刷新
pub struct AmadeusAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AmadeusAuth {
    pub fn new(http: reqwest::Client, client_id: &str, client_secret: &str, token_url: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.expires_at {
                return Ok(c.token.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Auth(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        let expires_at =
            Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at,
        });
        Ok(body.access_token)
    }
}

/// Amadeus REST 客户端
pub struct AmadeusClient {
    http: reqwest::Client,
    auth: AmadeusAuth,
    base_url: String,
}

impl AmadeusClient {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        token_url: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            auth: AmadeusAuth::new(http.clone(), client_id, client_secret, token_url),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ProviderError> {
        let token = self.auth.get_token().await?;
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TravelSearchProvider for AmadeusClient {
    async fn search_flights(&self, query: &FlightQuery) -> Result<Vec<FlightOffer>, ProviderError> {
        let mut params = vec![
            ("originLocationCode", query.origin.to_uppercase()),
            ("destinationLocationCode", query.destination.to_uppercase()),
            ("departureDate", query.departure_date.clone()),
            ("adults", query.adults.to_string()),
            ("max", "5".to_string()),
        ];
        if let Some(ret) = &query.return_date {
            params.push(("returnDate", ret.clone()));
        }

        let resp = self.get_json("/v2/shopping/flight-offers", &params).await?;
        let offers = simplify_flight_response(&resp);
        if offers.is_empty() {
            return Err(ProviderError::NoResults);
        }
        Ok(offers)
    }

    async fn search_hotels(&self, query: &HotelQuery) -> Result<Vec<HotelOffer>, ProviderError> {
        let params = vec![
            ("cityCode", query.city_code.to_uppercase()),
            ("checkInDate", query.check_in.clone()),
            ("checkOutDate", query.check_out.clone()),
            ("adults", query.guests.to_string()),
        ];
        let resp = self.get_json("/v3/shopping/hotel-offers", &params).await?;
        let offers = simplify_hotel_response(&resp);
        if offers.is_empty() {
            return Err(ProviderError::NoResults);
        }
        Ok(offers)
    }

    async fn search_activities(
        &self,
        query: &ActivityQuery,
    ) -> Result<Vec<ActivityOffer>, ProviderError> {
        let params = vec![
            ("latitude", query.latitude.to_string()),
            ("longitude", query.longitude.to_string()),
            ("radius", query.radius_km.unwrap_or(5).to_string()),
        ];
        let resp = self.get_json("/v1/shopping/activities", &params).await?;
        let offers = simplify_activity_response(&resp);
        if offers.is_empty() {
            return Err(ProviderError::NoResults);
        }
        Ok(offers)
    }
}

/// 把原始航班响应压成 FlightOffer 列表；dictionaries 里是 carrier 码到可读名的映射
fn simplify_flight_response(resp: &Value) -> Vec<FlightOffer> {
    let carriers = &resp["dictionaries"]["carriers"];
    let mut offers = Vec::new();

    for offer in resp["data"].as_array().unwrap_or(&Vec::new()) {
        let price = &offer["price"];
        for itin in offer["itineraries"].as_array().unwrap_or(&Vec::new()) {
            let segments = itin["segments"].as_array().cloned().unwrap_or_default();
            let (Some(first), Some(last)) = (segments.first(), segments.last()) else {
                continue;
            };
            let carrier_code = first["carrierCode"].as_str().unwrap_or("");
            offers.push(FlightOffer {
                carrier: carriers[carrier_code]
                    .as_str()
                    .unwrap_or(carrier_code)
                    .to_string(),
                from: first["departure"]["iataCode"].as_str().unwrap_or("").to_string(),
                to: last["arrival"]["iataCode"].as_str().unwrap_or("").to_string(),
                departure: first["departure"]["at"].as_str().unwrap_or("").to_string(),
                arrival: last["arrival"]["at"].as_str().unwrap_or("").to_string(),
                stops: segments.len().saturating_sub(1) as u32,
                duration: itin["duration"].as_str().unwrap_or("").to_string(),
                price_total: price["grandTotal"].as_str().unwrap_or("?").to_string(),
                currency: price["currency"].as_str().unwrap_or("").to_string(),
            });
        }
    }
    offers
}

fn simplify_hotel_response(resp: &Value) -> Vec<HotelOffer> {
    resp["data"]
        .as_array()
        .unwrap_or(&Vec::new())
        .iter()
        .filter_map(|entry| {
            let name = entry["hotel"]["name"].as_str()?;
            let offer = entry["offers"].as_array().and_then(|o| o.first());
            Some(HotelOffer {
                name: name.to_string(),
                price_total: offer
                    .and_then(|o| o["price"]["total"].as_str())
                    .map(String::from),
                currency: offer
                    .and_then(|o| o["price"]["currency"].as_str())
                    .map(String::from),
                rating: entry["hotel"]["rating"].as_str().map(String::from),
            })
        })
        .collect()
}

fn simplify_activity_response(resp: &Value) -> Vec<ActivityOffer> {
    resp["data"]
        .as_array()
        .unwrap_or(&Vec::new())
        .iter()
        .filter_map(|entry| {
            let name = entry["name"].as_str()?;
            Some(ActivityOffer {
                name: name.to_string(),
                description: entry["shortDescription"].as_str().map(String::from),
                price: entry["price"]["amount"].as_str().map(String::from),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplify_flight_response() {
        let resp = serde_json::json!({
            "data": [{
                "price": {"grandTotal": "812.30", "currency": "USD"},
                "itineraries": [{
                    "duration": "PT14H10M",
                    "segments": [
                        {"carrierCode": "UA", "departure": {"iataCode": "JFK", "at": "2026-06-01T08:00"},
                         "arrival": {"iataCode": "ORD", "at": "2026-06-01T10:00"}},
                        {"carrierCode": "UA", "departure": {"iataCode": "ORD", "at": "2026-06-01T12:00"},
                         "arrival": {"iataCode": "NRT", "at": "2026-06-02T15:10"}}
                    ]
                }]
            }],
            "dictionaries": {"carriers": {"UA": "UNITED AIRLINES"}}
        });

        let offers = simplify_flight_response(&resp);
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].carrier, "UNITED AIRLINES");
        assert_eq!(offers[0].from, "JFK");
        assert_eq!(offers[0].to, "NRT");
        assert_eq!(offers[0].stops, 1);
        assert_eq!(offers[0].price_total, "812.30");
    }

    #[test]
    fn test_simplify_empty_response() {
        let resp = serde_json::json!({"data": []});
        assert!(simplify_flight_response(&resp).is_empty());
        assert!(simplify_hotel_response(&resp).is_empty());
        assert!(simplify_activity_response(&resp).is_empty());
    }
}
