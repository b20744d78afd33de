//! HTTP client for the chatbot service's REST boundary.
//!
//! Covers the history load consumed by the conversation view, the refresh
//! exchange, and the login/register calls that mint fresh credentials. All
//! authenticated calls carry `Authorization: Bearer <access_token>`.

use std::error::Error as StdError;
use std::fmt;

use tracing::debug;

use crate::api::{
    AuthResponse, ChatData, Envelope, ErrorEnvelope, GetChatsResponse, GetMessagesResponse,
    GoogleLoginRequest, LoginRequest, RefreshRequest, RegisterRequest,
};
use crate::core::message::Message;
use crate::utils::url::construct_api_url;

/// Errors surfaced by the REST boundary, mapped by status code.
///
/// `Unauthorized` must force a sign-out at the call site; the other
/// status-mapped variants terminate in distinct failure views.
#[derive(Debug)]
pub enum ApiError {
    /// 401: the session is no longer accepted; the caller must sign out.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 500.
    Internal,
    /// Any other non-2xx status; carries the envelope's `message` verbatim.
    Server(String),
    /// Request construction, connection, or body decode failure.
    Transport(reqwest::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::Forbidden => write!(f, "Forbidden"),
            ApiError::NotFound => write!(f, "Not found"),
            ApiError::Internal => write!(f, "Internal server error"),
            ApiError::Server(message) => write!(f, "{message}"),
            ApiError::Transport(source) => write!(f, "Request failed: {source}"),
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Transport(source) => Some(source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(source: reqwest::Error) -> Self {
        ApiError::Transport(source)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the user's conversations, in server order.
    pub async fn get_chats(&self, access_token: &str) -> Result<Vec<ChatData>, ApiError> {
        let url = construct_api_url(&self.base_url, "chats");
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let data: GetChatsResponse = unwrap_envelope(response).await?;
        Ok(data.chats)
    }

    /// Load one conversation's history, sorted ascending by message id.
    pub async fn get_messages(
        &self,
        chat_id: u64,
        access_token: &str,
    ) -> Result<Vec<Message>, ApiError> {
        let url = construct_api_url(&self.base_url, &format!("chats/{chat_id}/messages"));
        let response = self.http.get(url).bearer_auth(access_token).send().await?;
        let mut data: GetMessagesResponse = unwrap_envelope(response).await?;
        data.messages.sort_by_key(|message| message.id);
        Ok(data.messages)
    }

    /// Exchange a refresh token for a fresh credential.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        debug!("exchanging refresh token");
        let url = construct_api_url(&self.base_url, "auth/refresh");
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let url = construct_api_url(&self.base_url, "auth/login");
        let response = self
            .http
            .post(url)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    pub async fn login_google(&self, id_token: &str) -> Result<AuthResponse, ApiError> {
        let url = construct_api_url(&self.base_url, "auth/login/google");
        let response = self
            .http
            .post(url)
            .json(&GoogleLoginRequest { id_token })
            .send()
            .await?;
        unwrap_envelope(response).await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let url = construct_api_url(&self.base_url, "auth/register");
        let response = self
            .http
            .post(url)
            .json(&RegisterRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;
        unwrap_envelope(response).await
    }
}

/// Map a response to its envelope `data`, or to the status-coded error.
async fn unwrap_envelope<T>(response: reqwest::Response) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status.is_success() {
        let envelope: Envelope<T> = response.json().await?;
        return Ok(envelope.data);
    }

    debug!(status = status.as_u16(), "request rejected");
    Err(map_status(
        status.as_u16(),
        read_error_message(response).await,
    ))
}

async fn read_error_message(response: reqwest::Response) -> Option<String> {
    response
        .json::<ErrorEnvelope>()
        .await
        .ok()
        .and_then(|envelope| envelope.message)
}

fn map_status(status: u16, message: Option<String>) -> ApiError {
    match status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden,
        404 => ApiError::NotFound,
        500 => ApiError::Internal,
        _ => ApiError::Server(message.unwrap_or_else(|| "Invalid credentials".to_string())),
    }
}
