use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Error, OrderPlacer, OrderRequest, OrderType, Result};

/// REST client for Kite Connect order placement. Used in live mode only.
pub struct KiteOrderClient {
    base_url: String,
    api_key: String,
    access_token: String,
    exchange: String,
    product: String,
    http: Client,
}

impl KiteOrderClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: access_token.into(),
            exchange: "NFO".into(),
            product: "MIS".into(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn form(&self, order: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tradingsymbol", order.symbol.clone()),
            ("exchange", self.exchange.clone()),
            ("transaction_type", order.side.to_string()),
            ("order_type", order.order_type.to_string()),
            ("quantity", order.quantity.to_string()),
            ("product", self.product.clone()),
            ("validity", "DAY".to_string()),
            ("tag", order.id.chars().take(20).collect()),
        ];
        if order.order_type == OrderType::StopLossMarket {
            if let Some(trigger) = order.trigger_price {
                params.push(("trigger_price", format!("{trigger:.1}")));
            }
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct KiteResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<KiteOrderData>,
}

#[derive(Debug, Deserialize)]
struct KiteOrderData {
    order_id: String,
}

/// Extract the order id from a Kite order response body.
fn parse_order_response(body: &str) -> Result<String> {
    let resp: KiteResponse = serde_json::from_str(body).map_err(|e| Error::Broker(e.to_string()))?;
    match (resp.status.as_str(), resp.data) {
        ("success", Some(data)) => Ok(data.order_id),
        _ => Err(Error::Broker(
            resp.message.unwrap_or_else(|| format!("order rejected with status '{}'", resp.status)),
        )),
    }
}

#[async_trait]
impl OrderPlacer for KiteOrderClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let url = format!("{}/orders/regular", self.base_url);
        debug!(symbol = %order.symbol, side = %order.side, kind = %order.order_type, "Submitting order to Kite");

        let resp = self
            .http
            .post(&url)
            .header("X-Kite-Version", "3")
            .header("Authorization", format!("token {}:{}", self.api_key, self.access_token))
            .form(&self.form(order))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Broker(format!("HTTP {status}: {body}")));
        }
        parse_order_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Side;

    #[test]
    fn stop_loss_orders_carry_one_decimal_trigger() {
        let client = KiteOrderClient::new("https://api.kite.trade/", "key", "token");
        let order = OrderRequest::stop_loss_market("BANKNIFTY24MARFUT", Side::Buy, 35, 49_899.96);
        let form = client.form(&order);
        assert!(form.contains(&("order_type", "SL-M".to_string())));
        assert!(form.contains(&("transaction_type", "BUY".to_string())));
        assert!(form.contains(&("trigger_price", "49900.0".to_string())));

        let form = client.form(&OrderRequest::market("BANKNIFTY24MARFUT", Side::Sell, 35));
        assert!(form.iter().all(|(k, _)| *k != "trigger_price"));
    }

    #[test]
    fn order_response_is_decoded() {
        let ok = r#"{"status": "success", "data": {"order_id": "151220000000000"}}"#;
        assert_eq!(parse_order_response(ok).unwrap(), "151220000000000");

        let err = r#"{"status": "error", "message": "Insufficient funds", "error_type": "InputException"}"#;
        match parse_order_response(err) {
            Err(Error::Broker(msg)) => assert_eq!(msg, "Insufficient funds"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
