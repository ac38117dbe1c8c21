//! REST implementation of the session service.

use super::{
    ActiveSession, EndedSession, HeartbeatAck, ReadingPosition, SessionService, StartedSession,
    TodayDuration,
};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::session::BookType;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header carrying the client device id.
const DEVICE_HEADER: &str = "x-device-id";

/// Start request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    book_id: i64,
    book_type: BookType,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chapter_index: Option<u32>,
}

/// Session service client over HTTP.
#[derive(Clone)]
pub struct HttpSessionService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSessionService {
    /// Build a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(device_id) = &config.client.device_id {
            let value = HeaderValue::from_str(device_id)
                .map_err(|e| SessionError::Config(format!("Invalid device id: {}", e)))?;
            headers.insert(DEVICE_HEADER, value);
        }

        let client = Client::builder()
            .timeout(config.server.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.server.url.trim_end_matches('/').to_string(),
            token: config.server.token.clone(),
        })
    }

    /// Full URL of a session endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/reading-sessions/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.client.post(self.endpoint(path)).json(body))
            .await?;
        Ok(response.json().await?)
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        self.send(self.client.post(self.endpoint(path))).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn start(
        &self,
        book_id: i64,
        book_type: BookType,
        position: &ReadingPosition,
    ) -> Result<StartedSession> {
        let body = StartRequest {
            book_id,
            book_type,
            position: position.position.as_deref(),
            chapter_index: position.chapter_index,
        };
        self.post_json("start", &body).await
    }

    async fn heartbeat(&self, session_id: i64, position: &ReadingPosition) -> Result<HeartbeatAck> {
        self.post_json(&format!("{}/heartbeat", session_id), position).await
    }

    async fn pause(&self, session_id: i64) -> Result<()> {
        self.post_empty(&format!("{}/pause", session_id)).await
    }

    async fn resume(&self, session_id: i64) -> Result<()> {
        self.post_empty(&format!("{}/resume", session_id)).await
    }

    async fn end(&self, session_id: i64, position: &ReadingPosition) -> Result<EndedSession> {
        self.post_json(&format!("{}/end", session_id), position).await
    }

    async fn active_session(&self) -> Result<Option<ActiveSession>> {
        let request = self.authorize(self.client.get(self.endpoint("active")));
        let response = request.send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(SessionError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn today_duration(&self) -> Result<TodayDuration> {
        let response = self.send(self.client.get(self.endpoint("today"))).await?;
        Ok(response.json().await?)
    }
}
