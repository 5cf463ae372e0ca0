//! Encoder boundary: the external QR encoder behind a timeout.
//!
//! The encoder itself lives in the embedding application. It is a pure,
//! CPU-bound function from payload text to raster bytes; this module owns
//! everything the pipeline wraps around it: blocking-pool dispatch, the
//! per-call deadline, and cancellation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error reported by a [`QrEncoder`] implementation.
#[derive(Debug, Clone)]
pub struct QrEncodeError {
    /// Human-readable error description.
    pub message: String,
}

impl QrEncodeError {
    /// Create a new encode error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for QrEncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QR encode error: {}", self.message)
    }
}

impl std::error::Error for QrEncodeError {}

/// The external QR encoder.
///
/// One call produces one raster. Implementations must be pure per call
/// (no side effects on failure) and are invoked on the blocking pool, so
/// they may burn CPU freely but must not touch async resources.
pub trait QrEncoder: Send + Sync + 'static {
    /// Encode a payload into image bytes.
    fn encode(&self, payload: &str) -> Result<Vec<u8>, QrEncodeError>;
}

/// Uniform error type for adapter-wrapped encode calls.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// The per-call deadline elapsed before the encoder returned. Retryable.
    #[error("encode timed out after {0:?}")]
    Timeout(Duration),

    /// The encoder reported an error or panicked. Retryable.
    #[error("encoder failure: {0}")]
    Encoder(String),

    /// The run was cancelled while the call was pending. Not a failure;
    /// the item stays pending.
    #[error("encode cancelled")]
    Cancelled,
}

impl EncodeError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EncodeError::Timeout(_) | EncodeError::Encoder(_))
    }
}

/// Wraps the external encoder with a hard per-call timeout and
/// cancellation awareness.
pub struct EncoderAdapter<E> {
    encoder: Arc<E>,
    timeout: Duration,
}

impl<E: QrEncoder> EncoderAdapter<E> {
    /// Create an adapter around `encoder` with the given per-call deadline.
    pub fn new(encoder: Arc<E>, timeout: Duration) -> Self {
        Self { encoder, timeout }
    }

    /// The configured per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Encode one payload, bounded by the configured timeout.
    ///
    /// The call runs on the blocking pool. Returns
    /// [`EncodeError::Cancelled`] as soon as `token` fires rather than
    /// waiting out the deadline. A call that outlives the deadline or the
    /// token keeps running on its pool thread until it returns on its own;
    /// the result is dropped, never stored.
    ///
    /// # Errors
    ///
    /// * [`EncodeError::Timeout`] - deadline exceeded
    /// * [`EncodeError::Encoder`] - encoder error, panic, or empty payload
    /// * [`EncodeError::Cancelled`] - token fired before the call finished
    pub async fn encode_with_timeout(
        &self,
        payload: &str,
        token: &CancellationToken,
    ) -> Result<Bytes, EncodeError> {
        if token.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        // Payload semantics belong to the catalog layer; only emptiness is
        // rejected here, and without burning a blocking-pool slot.
        if payload.is_empty() {
            return Err(EncodeError::Encoder("empty payload".to_string()));
        }

        let encoder = Arc::clone(&self.encoder);
        let owned_payload = payload.to_string();
        let encode_call = tokio::task::spawn_blocking(move || encoder.encode(&owned_payload));

        tokio::select! {
            biased;

            _ = token.cancelled() => Err(EncodeError::Cancelled),

            joined = tokio::time::timeout(self.timeout, encode_call) => match joined {
                Err(_) => Err(EncodeError::Timeout(self.timeout)),
                Ok(Err(join_error)) => Err(EncodeError::Encoder(format!(
                    "encoder panicked: {}",
                    join_error
                ))),
                Ok(Ok(Err(e))) => Err(EncodeError::Encoder(e.message)),
                Ok(Ok(Ok(data))) => {
                    debug!(size_bytes = data.len(), "encode complete");
                    Ok(Bytes::from(data))
                }
            },
        }
    }
}
