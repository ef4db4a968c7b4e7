use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::{ApiError, Result};

/// M-Pesa Daraja API client. Handles OAuth token fetch and STK push for
/// shift funding top-ups; the asynchronous result arrives on the callback
/// route and is reconciled against the pending transaction row.
pub struct MpesaClient {
    http: reqwest::Client,
    consumer_key: String,
    consumer_secret: String,
    shortcode: String,
    passkey: String,
    base_url: String,
    callback_url: String,
}

#[derive(Debug, Clone)]
pub struct StkPushResponse {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub customer_message: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl MpesaClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            consumer_key: config.mpesa_consumer_key.clone(),
            consumer_secret: config.mpesa_consumer_secret.clone(),
            shortcode: config.mpesa_shortcode.clone(),
            passkey: config.mpesa_passkey.clone(),
            base_url: config.mpesa_base_url.clone(),
            callback_url: config.mpesa_callback_url.clone(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let credentials = format!("{}:{}", self.consumer_key, self.consumer_secret);
        let encoded = BASE64_STANDARD.encode(credentials.as_bytes());

        let response = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.base_url
            ))
            .header("Authorization", format!("Basic {}", encoded))
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("auth request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Gateway(format!(
                "auth failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("invalid auth response: {}", e)))?;

        Ok(token.access_token)
    }

    fn push_password(&self) -> (String, String) {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let raw = format!("{}{}{}", self.shortcode, self.passkey, timestamp);
        (BASE64_STANDARD.encode(raw.as_bytes()), timestamp)
    }

    /// Prompt the phone owner to authorize the payment. `amount` is in cents;
    /// Daraja takes whole shillings so the amount is rounded up.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount_cents: i64,
        account_reference: &str,
        description: &str,
    ) -> Result<StkPushResponse> {
        let token = self.access_token().await?;
        let (password, timestamp) = self.push_password();
        let phone = normalize_phone(phone)?;
        let amount_shillings = (amount_cents + 99) / 100;

        let payload = json!({
            "BusinessShortCode": self.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount_shillings,
            "PartyA": phone,
            "PartyB": self.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": description,
        });

        let response = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::Gateway(format!("STK push request failed: {}", e)))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Gateway(format!("invalid STK push response: {}", e)))?;

        if body.get("ResponseCode").and_then(|v| v.as_str()) == Some("0") {
            Ok(StkPushResponse {
                checkout_request_id: body["CheckoutRequestID"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                merchant_request_id: body["MerchantRequestID"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
                customer_message: body["CustomerMessage"]
                    .as_str()
                    .unwrap_or("STK push sent")
                    .to_string(),
            })
        } else {
            let message = body
                .get("errorMessage")
                .and_then(|v| v.as_str())
                .unwrap_or("STK push rejected");
            Err(ApiError::Gateway(message.to_string()))
        }
    }
}

/// Normalize to the 2547XXXXXXXX format Daraja expects.
fn normalize_phone(phone: &str) -> Result<String> {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, '+' | ' ' | '-'))
        .collect();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(format!("invalid phone number: {}", phone)));
    }

    let normalized = if cleaned.starts_with("254") {
        cleaned
    } else {
        format!("254{}", cleaned.trim_start_matches('0'))
    };

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_local_formats() {
        assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("+254 712 345-678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
    }

    #[test]
    fn rejects_non_numeric_phone() {
        assert!(normalize_phone("not-a-phone").is_err());
        assert!(normalize_phone("").is_err());
    }
}
