//! Typed wrapper over the server's HTTP routes.

use anonimku_shared::models::{
    ActiveMatch, Match, Message, RevealRequest, RevealResponse, User,
};
use anonimku_shared::types::{MatchId, RevealRequestId, UserId};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ClientError, Result};

/// Result of answering a reveal request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RevealOutcome {
    pub request: RevealRequest,
    /// Set when the answer revealed both profiles.
    #[serde(rename = "match")]
    pub revealed_match: Option<Match>,
}

#[derive(Deserialize)]
struct FindMatchResponse {
    match_id: Option<MatchId>,
}

#[derive(Deserialize)]
struct ReadResponse {
    updated: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// The WebSocket endpoint on the same server.
    pub fn ws_url(&self) -> String {
        let rest = self
            .base_url
            .strip_prefix("https://")
            .map(|r| format!("wss://{r}"))
            .or_else(|| self.base_url.strip_prefix("http://").map(|r| format!("ws://{r}")))
            .unwrap_or_else(|| self.base_url.clone());
        format!("{rest}/ws")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn sign_in(&self, name: &str, phone: &str) -> Result<User> {
        let resp = self
            .http
            .post(self.url("/users"))
            .json(&json!({ "name": name, "phone": phone }))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_user(&self, id: UserId) -> Result<User> {
        let resp = self.http.get(self.url(&format!("/users/{id}"))).send().await?;
        decode(resp).await
    }

    pub async fn set_online(&self, id: UserId, online: bool) -> Result<User> {
        let resp = self
            .http
            .put(self.url(&format!("/users/{id}/online")))
            .json(&json!({ "online": online }))
            .send()
            .await?;
        decode(resp).await
    }

    /// One pairing attempt. `None` means nobody is available yet.
    pub async fn find_match(&self, id: UserId) -> Result<Option<MatchId>> {
        let resp = self
            .http
            .post(self.url(&format!("/users/{id}/find-match")))
            .send()
            .await?;
        Ok(decode::<FindMatchResponse>(resp).await?.match_id)
    }

    /// The user's current match, or `None` if they are not in one.
    pub async fn active_match(&self, id: UserId) -> Result<Option<ActiveMatch>> {
        let resp = self
            .http
            .get(self.url(&format!("/users/{id}/active-match")))
            .send()
            .await?;
        match decode(resp).await {
            Ok(active) => Ok(Some(active)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn pending_reveal_requests(&self, id: UserId) -> Result<Vec<RevealRequest>> {
        let resp = self
            .http
            .get(self.url(&format!("/users/{id}/reveal-requests")))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn messages(&self, match_id: MatchId) -> Result<Vec<Message>> {
        let resp = self
            .http
            .get(self.url(&format!("/matches/{match_id}/messages")))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn send_message(
        &self,
        match_id: MatchId,
        sender_id: UserId,
        content: &str,
    ) -> Result<Message> {
        let resp = self
            .http
            .post(self.url(&format!("/matches/{match_id}/messages")))
            .json(&json!({ "sender_id": sender_id, "content": content }))
            .send()
            .await?;
        decode(resp).await
    }

    /// Returns how many messages were newly marked read.
    pub async fn mark_read(&self, match_id: MatchId, reader_id: UserId) -> Result<usize> {
        let resp = self
            .http
            .post(self.url(&format!("/matches/{match_id}/messages/read")))
            .json(&json!({ "reader_id": reader_id }))
            .send()
            .await?;
        Ok(decode::<ReadResponse>(resp).await?.updated)
    }

    pub async fn request_reveal(
        &self,
        match_id: MatchId,
        requester_id: UserId,
        target_id: UserId,
    ) -> Result<RevealRequest> {
        let resp = self
            .http
            .post(self.url(&format!("/matches/{match_id}/reveal-requests")))
            .json(&json!({ "requester_id": requester_id, "target_id": target_id }))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn respond_to_reveal(
        &self,
        request_id: RevealRequestId,
        responder_id: UserId,
        response: RevealResponse,
    ) -> Result<RevealOutcome> {
        let resp = self
            .http
            .post(self.url(&format!("/reveal-requests/{request_id}/respond")))
            .json(&json!({ "responder_id": responder_id, "response": response }))
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn end_match(&self, match_id: MatchId) -> Result<Match> {
        let resp = self
            .http
            .post(self.url(&format!("/matches/{match_id}/end")))
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        });

    if status != StatusCode::NOT_FOUND {
        tracing::debug!(status = status.as_u16(), error = %message, "Request failed");
    }
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
