//! Payment-processor API types.

use serde::{Deserialize, Deserializer, Serialize};

/// Checkout preference request.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceRequest {
    /// Items charged.
    pub items: Vec<PreferenceItem>,
    /// Return URLs per outcome.
    pub back_urls: BackUrls,
    /// Redirect automatically on approval.
    pub auto_return: String,
    /// Webhook callback URL.
    pub notification_url: String,
    /// Correlation id echoed back on the payment (the consultation id).
    pub external_reference: String,
    /// Amount retained by the platform.
    pub marketplace_fee: f64,
    /// Instruction routing the provider's share to their account.
    pub disbursement: Disbursement,
    /// Free-form metadata echoed back on the payment.
    pub metadata: PreferenceMetadata,
}

/// A line item.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    /// Item id (the consultation id).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Quantity.
    pub quantity: u32,
    /// Unit price in currency units.
    pub unit_price: f64,
    /// ISO currency code.
    pub currency_id: String,
}

/// Return URLs.
#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    /// Approved payment.
    pub success: String,
    /// Rejected payment.
    pub failure: String,
    /// Payment still processing.
    pub pending: String,
}

/// Disbursement to the provider's external account.
#[derive(Debug, Clone, Serialize)]
pub struct Disbursement {
    /// Provider's account id at the processor.
    pub collector_id: String,
    /// Amount in currency units.
    pub amount: f64,
}

/// Metadata attached to the preference.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceMetadata {
    /// The consultation paid for.
    pub consultation_id: String,
    /// The professional receiving the provider share.
    pub professional_id: String,
    /// Platform share quoted at preference time.
    pub platform_fee: f64,
    /// Provider share quoted at preference time.
    pub provider_fee: f64,
}

/// Checkout preference response.
#[derive(Debug, Clone, Deserialize)]
pub struct Preference {
    /// Preference id.
    pub id: String,
    /// Hosted checkout URL.
    #[serde(default)]
    pub init_point: Option<String>,
}

/// A processor payment as returned by the lookup endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    /// Payment id (numeric upstream, normalised to a string).
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Payment status (`approved`, `pending`, `rejected`, ...).
    pub status: String,
    /// Authoritative charged amount.
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    /// Correlation id set on the preference.
    #[serde(default)]
    pub external_reference: Option<String>,
    /// Metadata set on the preference.
    #[serde(default)]
    pub metadata: Option<PaymentMetadata>,
    /// Payment method id.
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

impl Payment {
    /// Whether the payment is approved.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        self.status == teleconsult_core::payment::APPROVED
    }

    /// Consultation reference: external reference first, then metadata.
    #[must_use]
    pub fn consultation_reference(&self) -> Option<&str> {
        self.external_reference
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.consultation_id.as_deref())
                    .filter(|r| !r.trim().is_empty())
            })
    }
}

/// Payment metadata echoed from the preference.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMetadata {
    /// The consultation id.
    #[serde(default)]
    pub consultation_id: Option<String>,
}

/// OAuth token exchange request.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    /// Platform application id.
    pub client_id: &'a str,
    /// Platform application secret.
    pub client_secret: &'a str,
    /// Always `authorization_code`.
    pub grant_type: &'a str,
    /// One-time authorization code.
    pub code: &'a str,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: &'a str,
}

/// OAuth token exchange response.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthToken {
    /// Access token for the linked account.
    pub access_token: String,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Linked account id.
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub user_id: Option<String>,
    /// Linked account public key.
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Webhook notification body.
///
/// The processor sends `{type, data:{id}}`, older integrations `topic` instead of `type`;
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookNotification {
    /// Event type (`payment`, `merchant_order`, ...).
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    /// Legacy event type.
    #[serde(default)]
    pub topic: Option<String>,
    /// Action (`payment.created`, `payment.updated`).
    #[serde(default)]
    pub action: Option<String>,
    /// Event data.
    #[serde(default)]
    pub data: Option<WebhookData>,
}

/// Webhook event data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    /// Resource id (the payment id for payment events).
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(Into::into)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<StringOrNumber>::deserialize(deserializer).map(|v| v.map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payment_accepts_numeric_id() {
        let payment: Payment = serde_json::from_value(json!({
            "id": 123_456_789,
            "status": "approved",
            "transaction_amount": 1000.0,
            "external_reference": "c-1",
            "unknown_field": true
        }))
        .unwrap();
        assert_eq!(payment.id, "123456789");
        assert!(payment.is_approved());
        assert_eq!(payment.consultation_reference(), Some("c-1"));
    }

    #[test]
    fn reference_falls_back_to_metadata() {
        let payment: Payment = serde_json::from_value(json!({
            "id": "PAY1",
            "status": "pending",
            "external_reference": "",
            "metadata": {"consultation_id": "c-2"}
        }))
        .unwrap();
        assert!(!payment.is_approved());
        assert_eq!(payment.consultation_reference(), Some("c-2"));
    }

    #[test]
    fn webhook_tolerates_extra_fields() {
        let notification: WebhookNotification = serde_json::from_value(json!({
            "type": "payment",
            "action": "payment.updated",
            "data": {"id": 987},
            "live_mode": false,
            "user_id": "44"
        }))
        .unwrap();
        assert_eq!(notification.event_type.as_deref(), Some("payment"));
        assert_eq!(
            notification.data.and_then(|d| d.id).as_deref(),
            Some("987")
        );
    }

    #[test]
    fn token_user_id_may_be_numeric() {
        let token: OAuthToken = serde_json::from_value(json!({
            "access_token": "APP_USR-1",
            "user_id": 42
        }))
        .unwrap();
        assert_eq!(token.user_id.as_deref(), Some("42"));
    }
}
