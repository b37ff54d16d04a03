use krakenwatch_core::{OrderSet, SourceError};
use serde::Deserialize;
use serde_json::Value;

/// Envelope of every Kraken REST response.
#[derive(Debug, Clone, Deserialize)]
pub struct KrakenResponse<T> {
    #[serde(default)]
    pub error: Vec<String>,
    pub result: Option<T>,
}

/// `result` of `/0/private/OpenOrders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrdersResult {
    pub open: OrderSet,
}

impl<T> KrakenResponse<T> {
    /// Unwrap the result, turning a non-empty `error` array into an exchange error.
    pub fn into_result(self) -> Result<T, SourceError> {
        if !self.error.is_empty() {
            return Err(SourceError::Exchange(self.error));
        }
        self.result
            .ok_or_else(|| SourceError::ResponseFormat("response has no result".to_string()))
    }
}

/// Extract the open-order map from a parsed `OpenOrders` body.
pub fn parse_open_orders(payload: Value) -> Result<OrderSet, SourceError> {
    let response: KrakenResponse<OpenOrdersResult> = serde_json::from_value(payload)
        .map_err(|e| SourceError::ResponseFormat(format!("expected result.open object: {}", e)))?;
    Ok(response.into_result()?.open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_open_orders() {
        let payload = json!({
            "error": [],
            "result": {
                "open": {
                    "OQCLML-BW3P3-BUCMWZ": {
                        "refid": null,
                        "userref": 0,
                        "status": "open",
                        "opentm": 1590488127.3594,
                        "descr": {"pair": "XBTEUR", "type": "buy", "ordertype": "limit", "price": "1.0"},
                        "vol": "1000000",
                        "vol_exec": "0.00000000",
                        "oflags": "fciq"
                    },
                    "OB5VMB-B4U2U-DK2WRW": {"status": "open", "vol": "0.5"}
                }
            }
        });

        let orders = parse_open_orders(payload).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(
            orders.get("OQCLML-BW3P3-BUCMWZ").unwrap()["descr"]["pair"],
            "XBTEUR"
        );
    }

    #[test]
    fn test_empty_open_orders() {
        let orders = parse_open_orders(json!({"error": [], "result": {"open": {}}})).unwrap();
        assert!(orders.is_empty());
    }

    #[test]
    fn test_exchange_errors_surface() {
        let err = parse_open_orders(json!({"error": ["EAPI:Invalid nonce"]})).unwrap_err();
        match err {
            SourceError::Exchange(errors) => assert_eq!(errors, vec!["EAPI:Invalid nonce"]),
            other => panic!("Expected exchange error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_open_is_format_error() {
        let err = parse_open_orders(json!({"error": [], "result": {"closed": {}}})).unwrap_err();
        assert!(matches!(err, SourceError::ResponseFormat(_)));

        let err = parse_open_orders(json!({"error": []})).unwrap_err();
        assert!(matches!(err, SourceError::ResponseFormat(_)));

        let err = parse_open_orders(json!({"result": {"open": [1, 2]}})).unwrap_err();
        assert!(matches!(err, SourceError::ResponseFormat(_)));
    }
}
