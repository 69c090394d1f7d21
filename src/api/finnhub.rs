use crate::api::QuoteProvider;
use crate::models::PriceQuote;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const FINNHUB_API_BASE: &str = "https://finnhub.io/api/v1";
const HTTP_TIMEOUT_SECS: u64 = 5;

/// Client for the Finnhub API (primary quote provider)
///
/// Needs two calls per snapshot: `/quote` for the live price and
/// `/stock/metric` for the highs, monthly returns, volatility and cap.
#[derive(Clone)]
pub struct FinnhubClient {
    client: Client,
    api_key: String,
    base_url: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct QuoteRaw {
    /// Current price
    c: f64,
}

#[derive(Debug, Deserialize)]
struct MetricsRaw {
    metric: MetricFields,
}

#[derive(Debug, Deserialize)]
struct MetricFields {
    #[serde(rename = "priceHigh30D")]
    high_30d: Option<f64>,
    #[serde(rename = "priceHigh60D")]
    high_60d: Option<f64>,
    #[serde(rename = "monthToDatePriceReturn")]
    month_to_date_return: Option<f64>,
    #[serde(rename = "lastMonthPriceReturn")]
    last_month_return: Option<f64>,
    #[serde(rename = "annualizedVolatility")]
    annualized_volatility: Option<f64>,
    #[serde(rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

// ============== Implementation ==============

impl FinnhubClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, FINNHUB_API_BASE.to_string())
    }

    /// Point the client at an alternate base URL (test servers)
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Finnhub API error: {}", response.status()).into());
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    fn name(&self) -> &'static str {
        "finnhub"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote> {
        let quote_url = format!(
            "{}/quote?symbol={}&token={}",
            self.base_url, symbol, self.api_key
        );
        let metrics_url = format!(
            "{}/stock/metric?symbol={}&metric=price&token={}",
            self.base_url, symbol, self.api_key
        );

        let quote: QuoteRaw = self.get_json(&quote_url).await?;

        // Finnhub reports unknown symbols as an all-zero quote
        if quote.c <= 0.0 {
            return Err(format!("Finnhub returned no data for {}", symbol).into());
        }

        let metrics: MetricsRaw = self.get_json(&metrics_url).await?;
        let m = metrics.metric;

        Ok(PriceQuote {
            symbol: symbol.to_string(),
            price: quote.c,
            high_30d: m.high_30d.unwrap_or(quote.c),
            high_60d: m.high_60d.unwrap_or(quote.c),
            percent_change_this_month: m.month_to_date_return.unwrap_or(0.0),
            percent_change_last_month: m.last_month_return.unwrap_or(0.0),
            volatility: m.annualized_volatility.unwrap_or(0.0),
            market_cap: m.market_capitalization.unwrap_or(0.0),
            fetched_at: Utc::now(),
            stale: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn quote_body() -> &'static str {
        r#"{"c": 189.5, "h": 191.2, "l": 187.9, "o": 188.3, "pc": 188.0, "t": 1700000000}"#
    }

    fn metrics_body() -> &'static str {
        r#"{
            "metric": {
                "priceHigh30D": 195.1,
                "priceHigh60D": 198.4,
                "monthToDatePriceReturn": 4.2,
                "lastMonthPriceReturn": -2.1,
                "annualizedVolatility": 0.31,
                "marketCapitalization": 2950000.0
            },
            "metricType": "price",
            "symbol": "AAPL"
        }"#
    }

    #[tokio::test]
    async fn test_fetch_quote_parses_both_payloads() {
        let mut server = mockito::Server::new_async().await;

        let quote_mock = server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_body(quote_body())
            .create_async()
            .await;
        let metrics_mock = server
            .mock("GET", "/stock/metric")
            .match_query(Matcher::Any)
            .with_body(metrics_body())
            .create_async()
            .await;

        let client = FinnhubClient::with_base_url("test_key".to_string(), server.url());
        let quote = client.fetch_quote("AAPL").await.unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, 189.5);
        assert_eq!(quote.high_30d, 195.1);
        assert_eq!(quote.high_60d, 198.4);
        assert_eq!(quote.percent_change_this_month, 4.2);
        assert_eq!(quote.percent_change_last_month, -2.1);
        assert_eq!(quote.volatility, 0.31);
        assert!(!quote.stale);

        quote_mock.assert_async().await;
        metrics_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_quote_zero_price_is_error() {
        let mut server = mockito::Server::new_async().await;

        let _quote_mock = server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_body(r#"{"c": 0.0, "t": 0}"#)
            .create_async()
            .await;

        let client = FinnhubClient::with_base_url("test_key".to_string(), server.url());
        let result = client.fetch_quote("NOSUCH").await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no data"));
    }

    #[tokio::test]
    async fn test_fetch_quote_server_error() {
        let mut server = mockito::Server::new_async().await;

        let _quote_mock = server
            .mock("GET", "/quote")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = FinnhubClient::with_base_url("test_key".to_string(), server.url());
        let result = client.fetch_quote("AAPL").await;

        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires API key and network
    async fn test_fetch_quote_live() {
        let api_key = std::env::var("FINNHUB_API_KEY").expect("FINNHUB_API_KEY not set");
        let client = FinnhubClient::new(api_key);

        let quote = client.fetch_quote("AAPL").await.unwrap();
        assert!(quote.price > 0.0);
        assert!(quote.high_60d >= quote.high_30d * 0.5);
    }
}
