use actix_web::http::{Method, StatusCode};
use awc::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub mod auth;
pub mod campaign;

pub use auth::AuthenticationService;
pub use campaign::CampaignApiService;

/// The envelope every client call resolves to. Failures never panic: they
/// come back with `success == false` and a message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> ApiResponse<T> {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn empty() -> ApiResponse<T> {
        ApiResponse {
            success: true,
            message: None,
            data: None,
        }
    }

    pub fn failure(message: String) -> ApiResponse<T> {
        ApiResponse {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: String,
    error_message: String,
}

/// A JSON client for the service, holding the base url and the bearer token
/// of the tenant it acts for.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiClient {
        ApiClient {
            client: Client::default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> ApiClient {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResponse<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.send(Method::POST, path, None::<&()>).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResponse<T> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResponse<()> {
        self.send(Method::DELETE, path, None::<&()>).await
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ApiResponse<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "sending request");

        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let sent = match body {
            Some(body) => request.send_json(body).await,
            None => request.send().await,
        };

        let mut response = match sent {
            Ok(response) => response,
            Err(err) => {
                error!(%method, %url, error = %err, "request could not be sent");
                return ApiResponse::failure(format!("request failed: {}", err));
            }
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return ApiResponse::empty();
        }

        if status.is_success() {
            return match response.json::<T>().await {
                Ok(data) => ApiResponse::ok(data),
                Err(err) => {
                    error!(%method, %url, error = %err, "response could not be parsed");
                    ApiResponse::failure(format!("invalid response: {}", err))
                }
            };
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => format!("{}: {}", body.error_code, body.error_message),
            Err(_) => format!("unexpected status {}", status),
        };

        warn!(%method, %url, %status, %message, "request was rejected");
        ApiResponse::failure(message)
    }
}
