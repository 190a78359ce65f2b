//! Credential lookup: public channel id → chat channel id + access token.

use std::time::Duration;

use chzzk_chat::ChannelCredentials;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::ApiFileConfig;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The channel does not exist or has no chat session right now.
    #[error("channel {0} not found or has no chat channel")]
    NotFound(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ResolveError {
    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                url: url.to_string(),
                source: err,
            }
        } else {
            Self::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }

    /// Retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Both endpoints wrap their payload in `{ "content": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "Option::default")]
    content: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStatus {
    #[serde(default)]
    chat_channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessToken {
    #[serde(default)]
    access_token: Option<String>,
}

pub struct ChzzkApi {
    client: reqwest::Client,
    service_base_url: String,
    game_base_url: String,
}

impl ChzzkApi {
    pub fn new(config: &ApiFileConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            service_base_url: config.service_base_url.trim_end_matches('/').to_string(),
            game_base_url: config.game_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve the credentials the chat pipeline needs for `channel_id`.
    pub async fn resolve(&self, channel_id: &str) -> Result<ChannelCredentials, ResolveError> {
        let live_status_url = format!(
            "{}/polling/v1/channels/{}/live-status",
            self.service_base_url, channel_id
        );
        let status: Option<Envelope<LiveStatus>> = self.get_json(&live_status_url, &[]).await?;
        let chat_channel_id = status
            .and_then(|s| s.content)
            .and_then(|c| c.chat_channel_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ResolveError::NotFound(channel_id.to_string()))?;
        debug!(%channel_id, %chat_channel_id, "resolved chat channel");

        let token_url = format!("{}/nng_main/v1/chats/access-token", self.game_base_url);
        let token: Option<Envelope<AccessToken>> = self
            .get_json(
                &token_url,
                &[
                    ("channelId", chat_channel_id.as_str()),
                    ("chatType", "STREAMING"),
                ],
            )
            .await?;
        let access_token = token
            .and_then(|t| t.content)
            .and_then(|c| c.access_token)
            .ok_or_else(|| ResolveError::NotFound(channel_id.to_string()))?;

        info!(%channel_id, %chat_channel_id, "chat credentials resolved");
        Ok(ChannelCredentials {
            chat_channel_id,
            access_token,
        })
    }

    /// `Ok(None)` on HTTP 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ResolveError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| ResolveError::from_reqwest(url, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        response
            .error_for_status()
            .map_err(|e| ResolveError::from_reqwest(url, e))?
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ResolveError::from_reqwest(url, e))
    }
}
