//! HTTP implementation of the chat REST collaborator
//!
//! Endpoints consumed (all camelCase JSON):
//! - `POST {base}/chat/send` with `{receiverId, message}`
//! - `GET {base}/chat/conversation/{userId}`
//! - `GET {base}/chat/conversations`
//!
//! Non-success statuses become `ChatError::Api` with the response body
//! attached, so a backend validation message survives to the UI.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::ChatApi;
use crate::error::ChatError;
use crate::models::{ConversationRecord, Message, SendMessageRequest};

/// Reqwest-backed chat API client.
///
/// Thread-safe and cheaply cloneable (shares the connection pool).
#[derive(Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChatApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, ChatError> {
        let payload = SendMessageRequest {
            receiver_id: receiver_id.to_string(),
            message: body.to_string(),
        };
        let response = self
            .authorize(self.client.post(format!("{}/chat/send", self.base_url)))
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn conversation_history(
        &self,
        counterpart_id: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/chat/conversation/{}", self.base_url, counterpart_id)),
            )
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn conversations(&self) -> Result<Vec<ConversationRecord>, ChatError> {
        let response = self
            .authorize(self.client.get(format!("{}/chat/conversations", self.base_url)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
