use crate::error::Result;
use serde_json::Value;
use std::time::Duration;

/// Source of raw forecast payloads.
///
/// Implementations are called concurrently from the fetch worker pool.
pub trait WeatherClient: Sync {
    /// Requests the raw forecast published at `url`.
    ///
    /// # Errors
    /// Returns error on any transport or decoding failure.
    fn get_forecast(&self, url: &str) -> Result<Value>;
}

/// Blocking HTTP client with a per-request timeout
pub struct HttpWeatherClient {
    agent: ureq::Agent,
}

impl HttpWeatherClient {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }
}

impl WeatherClient for HttpWeatherClient {
    fn get_forecast(&self, url: &str) -> Result<Value> {
        let body = self.agent.get(url).call()?.into_string()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Returns true for payloads that carry no forecast: `null`, `false`, zero,
/// and empty strings, arrays or objects.
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_payloads_are_empty() {
        assert!(is_empty_payload(&Value::Null));
        assert!(is_empty_payload(&json!(false)));
        assert!(is_empty_payload(&json!("")));
        assert!(is_empty_payload(&json!([])));
        assert!(is_empty_payload(&json!({})));
        assert!(is_empty_payload(&json!(0)));
    }

    #[test]
    fn forecast_payload_is_not_empty() {
        assert!(!is_empty_payload(&json!({"forecasts": []})));
        assert!(!is_empty_payload(&json!(1)));
    }
}
