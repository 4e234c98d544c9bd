// crates/publisher-transfer/src/notify.rs
// ============================================================================
// Module: Webhook Notifier
// Description: Posts failure reports to a chat webhook.
// Purpose: Tell humans about terminal job failures.
// Dependencies: publisher-core, reqwest, serde
// ============================================================================

//! ## Overview
//! Reports are rendered to plain text and posted as
//! `{"msg_type": "text", "content": {"text": ...}}`.
//! Invariants:
//! - A non-200 response is a delivery error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use publisher_core::interfaces::FailureReport;
use publisher_core::interfaces::Notifier;
use publisher_core::interfaces::NotifyError;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Serialize;

use crate::http::parse_http_url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timeout for one webhook call.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Text message body.
#[derive(Debug, Serialize)]
pub(crate) struct TextMessage<'a> {
    /// Message kind.
    pub(crate) msg_type: &'static str,
    /// Message content.
    pub(crate) content: TextContent<'a>,
}

/// Text content wrapper.
#[derive(Debug, Serialize)]
pub(crate) struct TextContent<'a> {
    /// Rendered report.
    pub(crate) text: &'a str,
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notifier posting to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    /// HTTP client.
    client: Client,
    /// Webhook endpoint.
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Delivery`] when the URL is not HTTP or the client
    /// cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let url = url.into();
        parse_http_url(&url).map_err(|err| NotifyError::Delivery(err.to_string()))?;
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        Ok(Self {
            client,
            url,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &FailureReport) -> Result<(), NotifyError> {
        let text = report.render();
        let message = TextMessage {
            msg_type: "text",
            content: TextContent {
                text: &text,
            },
        };
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(NotifyError::Delivery(format!(
                "webhook returned non-OK status: {}",
                response.status().as_u16()
            )));
        }
        tracing::debug!(title = %report.title, "sent failure notification");
        Ok(())
    }
}
