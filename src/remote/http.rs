use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::models::*;
use super::traits::ConversationService;
use super::types::{ConversationSummary, RemoteMessage, SendRequest, SendResponse, ServiceError};
use crate::config::ServiceConfig;
use crate::models::RemoteId;

/// [`ConversationService`] over the portal's JSON API.
pub struct HttpConversationService {
    client: Client,
    base: Url,
    auth_token: Option<String>,
}

impl HttpConversationService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            ServiceError::RequestFailed(format!("Invalid base URL {}: {}", config.base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ServiceError::RequestFailed(format!(
                "Invalid base URL {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ServiceError::NetworkError(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base,
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ServiceError::RequestFailed(format!("Invalid base URL {}", self.base))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute(&self, req: RequestBuilder) -> Result<Response, ServiceError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ServiceError::NetworkError(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = Self::parse_error_message(status, &body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServiceError::AuthError(message)),
            StatusCode::NOT_FOUND => Err(ServiceError::NotFound(message)),
            _ => Err(ServiceError::RequestFailed(message)),
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<WireErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.message);
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ServiceError> {
        let mut url = self.endpoint(&["conversations"])?;
        url.query_pairs_mut().append_pair("userId", user_id);

        let response = self.execute(self.client.get(url)).await?;
        let listing: Vec<WireConversation> = Self::decode(response).await?;
        Ok(listing.into_iter().map(Into::into).collect())
    }

    async fn get_messages(&self, id: &RemoteId) -> Result<Vec<RemoteMessage>, ServiceError> {
        let url = self.endpoint(&["conversations", id.as_str(), "messages"])?;
        let response = self.execute(self.client.get(url)).await?;
        let messages: Vec<WireMessage> = Self::decode(response).await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn send_message(&self, request: SendRequest) -> Result<SendResponse, ServiceError> {
        let url = self.endpoint(&["chat", "send"])?;
        let body = WireSendRequest {
            conversation_id: request.conversation_id.map(|id| id.as_str().to_string()),
            message: request.text,
        };

        let response = self.execute(self.client.post(url).json(&body)).await?;
        let parsed: WireSendResponse = Self::decode(response).await?;
        if parsed.conversation_id.trim().is_empty() {
            return Err(ServiceError::InvalidResponse(
                "Response carried no conversation id".to_string(),
            ));
        }
        Ok(parsed.into())
    }

    async fn rename_conversation(&self, id: &RemoteId, title: &str) -> Result<(), ServiceError> {
        let url = self.endpoint(&["conversations", id.as_str(), "title"])?;
        let body = WireRenameRequest {
            title: title.to_string(),
        };
        self.execute(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    async fn set_pinned(&self, id: &RemoteId, pinned: bool) -> Result<(), ServiceError> {
        let url = self.endpoint(&["conversations", id.as_str(), "pin"])?;
        let body = WirePinRequest { is_pinned: pinned };
        self.execute(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    async fn delete_conversation(&self, id: &RemoteId) -> Result<(), ServiceError> {
        let url = self.endpoint(&["conversations", id.as_str()])?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base_url: &str) -> HttpConversationService {
        let config = ServiceConfig {
            base_url: base_url.to_string(),
            ..ServiceConfig::default()
        };
        HttpConversationService::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_appends_segments() {
        let svc = service("http://localhost:5009/api");
        let url = svc.endpoint(&["conversations", "17", "messages"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5009/api/conversations/17/messages");
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let svc = service("http://localhost:5009/api/");
        let url = svc.endpoint(&["chat", "send"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5009/api/chat/send");
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let svc = service("http://localhost:5009/api");
        let url = svc.endpoint(&["conversations", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5009/api/conversations/a%2Fb%20c");
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let config = ServiceConfig {
            base_url: "mailto:someone@example.com".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            HttpConversationService::new(&config),
            Err(ServiceError::RequestFailed(_))
        ));
    }

    #[test]
    fn test_error_message_uses_server_text() {
        let msg = HttpConversationService::parse_error_message(
            StatusCode::BAD_REQUEST,
            r#"{"message":"Title too long"}"#,
        );
        assert_eq!(msg, "HTTP 400: Title too long");

        let msg = HttpConversationService::parse_error_message(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(msg, "HTTP 502: Request failed");
    }
}
