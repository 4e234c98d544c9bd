// crates/publisher-core/src/core/envelope.rs
// ============================================================================
// Module: Publisher Event Envelope
// Description: Typed, uniquely identified wrapper for broker messages.
// Purpose: Multiplex heterogeneous publish jobs over one broker topic.
// Dependencies: serde, serde_json, time, thiserror
// ============================================================================

//! ## Overview
//! An [`Envelope`] carries `{id, type, source, subject, time, data}`. The id is
//! minted once by [`Envelope::compose`] and never regenerated; redeliveries of
//! the same broker message decode to an identical envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::identifiers::RequestId;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Logical event types routed through the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Package mirror publish.
    #[serde(rename = "net.pingcap.tibuild.tiup-publish-request")]
    TiupPublish,
    /// Fileserver (object store) publish.
    #[serde(rename = "net.pingcap.tibuild.fs-publish-request")]
    FsPublish,
    /// Registry-to-registry image copy.
    #[serde(rename = "net.pingcap.tibuild.image-copy-request")]
    ImageCopy,
    /// Multi-arch image index collection.
    #[serde(rename = "net.pingcap.tibuild.image-multiarch-collect-request")]
    ImageMultiArchCollect,
}

impl EventType {
    /// Returns the stable wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TiupPublish => "net.pingcap.tibuild.tiup-publish-request",
            Self::FsPublish => "net.pingcap.tibuild.fs-publish-request",
            Self::ImageCopy => "net.pingcap.tibuild.image-copy-request",
            Self::ImageMultiArchCollect => "net.pingcap.tibuild.image-multiarch-collect-request",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope encoding errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload could not be encoded.
    #[error("envelope encode error: {0}")]
    Encode(String),
    /// Payload or envelope could not be decoded.
    #[error("envelope decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Broker message wrapping one publish job.
///
/// # Invariants
/// - `id` is generated once at composition time.
/// - `time` is an RFC 3339 UTC timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Job identifier and broker message key.
    pub id: RequestId,
    /// Logical event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Producer identifier.
    pub source: String,
    /// Routing subject workers filter on.
    pub subject: String,
    /// Creation timestamp.
    pub time: String,
    /// Destination-specific payload.
    pub data: Value,
}

impl Envelope {
    /// Wraps a payload in a freshly identified envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] when the payload cannot be serialized.
    pub fn compose<T: Serialize>(
        event_type: EventType,
        source: impl Into<String>,
        subject: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let data =
            serde_json::to_value(payload).map_err(|err| EnvelopeError::Encode(err.to_string()))?;
        let time = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| EnvelopeError::Encode(err.to_string()))?;
        Ok(Self {
            id: RequestId::generate(),
            event_type,
            source: source.into(),
            subject: subject.into(),
            time,
            data,
        })
    }

    /// Decodes the payload into a destination-specific request.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] when the payload does not match `T`.
    pub fn decode_data<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        serde_json::from_value(self.data.clone())
            .map_err(|err| EnvelopeError::Decode(err.to_string()))
    }

    /// Serializes the envelope for the broker wire.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] when serialization fails.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|err| EnvelopeError::Encode(err.to_string()))
    }

    /// Parses an envelope from the broker wire.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] when the bytes are not an envelope.
    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(raw).map_err(|err| EnvelopeError::Decode(err.to_string()))
    }
}
