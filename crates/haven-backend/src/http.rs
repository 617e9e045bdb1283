//! HTTP implementation of the backend

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use haven_protocol::RoomSummary;

use crate::error::BackendError;
use crate::{Backend, Result};

#[derive(Debug, Deserialize)]
struct UnreadCountResponse {
    #[serde(alias = "unreadCount")]
    count: u64,
}

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(BackendError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Append path segments to the base URL, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let endpoint = url.path().to_string();
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                endpoint,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let url = self.endpoint(&["chat", "unread-count", user_id])?;
        let body: UnreadCountResponse = self.get_json(url).await?;

        tracing::debug!(user_id = %user_id, count = body.count, "Fetched unread count");

        Ok(body.count)
    }

    async fn chat_rooms(&self, user_id: &str) -> Result<Vec<RoomSummary>> {
        let url = self.endpoint(&["chat", "rooms", user_id])?;
        let rooms: Vec<RoomSummary> = self.get_json(url).await?;

        tracing::debug!(user_id = %user_id, rooms = rooms.len(), "Fetched chat rooms");

        Ok(rooms)
    }
}
