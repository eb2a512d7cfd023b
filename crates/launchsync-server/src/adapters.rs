//! HTTP adapters for the feed, the calendar service and webhook delivery.
//!
//! Every adapter maps failures onto [`ErrorClass`] from the HTTP status or
//! the transport error kind. Nothing downstream looks at error text.

use std::time::Duration;

use async_trait::async_trait;
use launchsync_types::{
    CalendarEntryDraft, CalendarPatch, ErrorClass, ExternalError, FeedSnapshot, Notification,
};
use reqwest::{Client, Response};
use serde::Deserialize;

use crate::ports::{CalendarService, DeliveryTransport, FeedSource};

const USER_AGENT: &str = concat!("launchsync/", env!("CARGO_PKG_VERSION"));

/// Builds the shared client used by all adapters.
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Classifies a transport-level failure.
fn classify(context: &str, err: &reqwest::Error) -> ExternalError {
    let class = match err.status() {
        Some(status) => ErrorClass::from_http_status(status.as_u16()),
        None if err.is_decode() || err.is_builder() => ErrorClass::Other,
        None => ErrorClass::Transient,
    };
    ExternalError::new(class, format!("{context}: {err}"))
}

/// Turns a non-success response into a classified error.
fn check(context: &str, response: Response) -> Result<Response, ExternalError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ExternalError::new(
            ErrorClass::from_http_status(status.as_u16()),
            format!("{context}: HTTP {status}"),
        ))
    }
}

/// Reads an already-normalized JSON snapshot from a URL.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<FeedSnapshot, ExternalError> {
        let context = "feed fetch";
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| classify(context, &e))?;
        check(context, response)?
            .json::<FeedSnapshot>()
            .await
            .map_err(|e| classify(context, &e))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEntry {
    id: String,
}

/// Calendar service speaking a small REST protocol:
/// `POST|PATCH|DELETE {base}/destinations/{id}/entries[/{entry}]`.
#[derive(Clone)]
pub struct HttpCalendarService {
    client: Client,
    base_url: String,
}

impl HttpCalendarService {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn entries_url(&self, destination_id: i64) -> String {
        format!("{}/destinations/{destination_id}/entries", self.base_url)
    }
}

#[async_trait]
impl CalendarService for HttpCalendarService {
    async fn create(
        &self,
        destination_id: i64,
        draft: &CalendarEntryDraft,
    ) -> Result<String, ExternalError> {
        let context = "calendar create";
        let response = self
            .client
            .post(self.entries_url(destination_id))
            .json(draft)
            .send()
            .await
            .map_err(|e| classify(context, &e))?;
        let created: CreatedEntry = check(context, response)?
            .json()
            .await
            .map_err(|e| classify(context, &e))?;
        Ok(created.id)
    }

    async fn update(
        &self,
        destination_id: i64,
        entry_id: &str,
        patch: &CalendarPatch,
    ) -> Result<(), ExternalError> {
        let context = "calendar update";
        let response = self
            .client
            .patch(format!("{}/{entry_id}", self.entries_url(destination_id)))
            .json(patch)
            .send()
            .await
            .map_err(|e| classify(context, &e))?;
        check(context, response)?;
        Ok(())
    }

    async fn delete(&self, destination_id: i64, entry_id: &str) -> Result<(), ExternalError> {
        let context = "calendar delete";
        let response = self
            .client
            .delete(format!("{}/{entry_id}", self.entries_url(destination_id)))
            .send()
            .await
            .map_err(|e| classify(context, &e))?;
        check(context, response)?;
        Ok(())
    }
}

/// Posts each notification as JSON to the destination's endpoint.
#[derive(Clone)]
pub struct WebhookTransport {
    client: Client,
}

impl WebhookTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    async fn send(&self, endpoint: &str, notification: &Notification) -> Result<(), ExternalError> {
        let context = "webhook delivery";
        let response = self
            .client
            .post(endpoint)
            .json(notification)
            .send()
            .await
            .map_err(|e| classify(context, &e))?;
        check(context, response)?;
        Ok(())
    }
}
