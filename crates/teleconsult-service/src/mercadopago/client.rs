//! Payment-processor API client implementation.

use reqwest::{Client, Url};
use std::time::Duration;

use super::types::{OAuthToken, Payment, Preference, PreferenceRequest, TokenRequest};

/// Timeout for every processor call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for processor operations.
#[derive(Debug, thiserror::Error)]
pub enum MercadoPagoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor answered with a non-2xx status.
    #[error("processor API error: HTTP {status}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body, for logs only.
        body: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Payment-processor API client.
///
/// One instance is built at startup and shared through the application state.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    api_base_url: String,
    auth_base_url: String,
}

impl MercadoPagoClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `api_base_url` - API base (e.g. `"https://api.mercadopago.com"`)
    /// * `auth_base_url` - authorization page base (e.g. `"https://auth.mercadopago.com"`)
    pub fn new(api_base_url: impl Into<String>, auth_base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            auth_base_url: auth_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a checkout preference.
    pub async fn create_preference(
        &self,
        access_token: &str,
        request: &PreferenceRequest,
    ) -> Result<Preference, MercadoPagoError> {
        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_base_url))
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Look up a payment by id.
    ///
    /// The id is appended as a single escaped path segment.
    pub async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<Payment, MercadoPagoError> {
        let response = self
            .client
            .get(self.payment_url(payment_id)?)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Exchange a one-time authorization code for account credentials.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken, MercadoPagoError> {
        let request = TokenRequest {
            client_id,
            client_secret,
            grant_type: "authorization_code",
            code,
            redirect_uri,
        };

        let response = self
            .client
            .post(format!("{}/oauth/token", self.api_base_url))
            .json(&request)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Build the authorization URL a professional is sent to.
    ///
    /// `state` is echoed back on the redirect and identifies the professional.
    pub fn authorization_url(
        &self,
        client_id: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<String, MercadoPagoError> {
        let url = Url::parse_with_params(
            &format!("{}/authorization", self.auth_base_url),
            &[
                ("client_id", client_id),
                ("response_type", "code"),
                ("platform_id", "mp"),
                ("state", state),
                ("redirect_uri", redirect_uri),
            ],
        )
        .map_err(|e| MercadoPagoError::InvalidUrl(e.to_string()))?;

        Ok(url.into())
    }

    fn payment_url(&self, payment_id: &str) -> Result<Url, MercadoPagoError> {
        let mut url = Url::parse(&format!("{}/v1/payments", self.api_base_url))
            .map_err(|e| MercadoPagoError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| MercadoPagoError::InvalidUrl(self.api_base_url.clone()))?
            .push(payment_id);
        Ok(url)
    }

    /// Decode a success body or capture the error body.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MercadoPagoError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        Err(MercadoPagoError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_encodes_params() {
        let client = MercadoPagoClient::new("https://api.test", "https://auth.test/");
        let url = client
            .authorization_url("123", "prof-1", "https://app.test/oauth/callback?x=1")
            .unwrap();

        assert!(url.starts_with("https://auth.test/authorization?"));
        assert!(url.contains("client_id=123"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("platform_id=mp"));
        assert!(url.contains("state=prof-1"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.test%2Foauth%2Fcallback%3Fx%3D1"));
    }

    #[test]
    fn payment_url_escapes_the_id() {
        let client = MercadoPagoClient::new("https://api.test/", "https://auth.test");

        assert_eq!(
            client.payment_url("1234").unwrap().as_str(),
            "https://api.test/v1/payments/1234"
        );
        let url = client.payment_url("1/../../users/me?x=1").unwrap();
        assert_eq!(url.path(), "/v1/payments/1%2F..%2F..%2Fusers%2Fme%3Fx=1");
        assert!(url.query().is_none());
    }
}
