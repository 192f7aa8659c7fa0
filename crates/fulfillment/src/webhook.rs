//! Payment webhook signature verification and event parsing.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex>` where the
//! hex value is HMAC-SHA256 over `"{t}.{payload}"` keyed with the shared
//! webhook secret.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{FulfillmentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Event type sent when a hosted checkout is paid.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Verifies webhook signatures with a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    fn mac(&self, timestamp: &str, payload: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| FulfillmentError::SignatureInvalid(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Checks the header against the raw payload and the timestamp tolerance.
    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<()> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| FulfillmentError::SignatureInvalid("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(FulfillmentError::SignatureInvalid(
                "missing v1 signature".to_string(),
            ));
        }

        let seconds: i64 = timestamp
            .parse()
            .map_err(|_| FulfillmentError::SignatureInvalid("malformed timestamp".to_string()))?;
        if now.timestamp().abs_diff(seconds) > self.tolerance.num_seconds().unsigned_abs() {
            return Err(FulfillmentError::SignatureInvalid(
                "timestamp outside tolerance".to_string(),
            ));
        }

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            if self.mac(timestamp, payload)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(FulfillmentError::SignatureInvalid(
            "no matching signature".to_string(),
        ))
    }

    /// Produces a header value for `payload`, as the provider would.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String> {
        let timestamp = timestamp.to_string();
        let digest = self.mac(&timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }
}

/// The webhook events the orchestrator acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted { session_id: String },
    Other { event_type: String },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: Option<RawData>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: serde_json::Value,
}

/// Parses a verified payload.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent> {
    let event: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| FulfillmentError::InvalidWebhookPayload(e.to_string()))?;

    if event.event_type != CHECKOUT_COMPLETED {
        return Ok(WebhookEvent::Other {
            event_type: event.event_type,
        });
    }

    let session_id = event
        .data
        .as_ref()
        .and_then(|d| d.object.get("id"))
        .and_then(|id| id.as_str())
        .ok_or_else(|| {
            FulfillmentError::InvalidWebhookPayload("session id missing".to_string())
        })?;
    Ok(WebhookEvent::CheckoutCompleted {
        session_id: session_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] =
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_test_0001"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", Duration::seconds(300))
    }

    #[test]
    fn signed_payload_verifies() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp()).unwrap();
        assert!(verifier().verify(PAYLOAD, &header, now).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = verifier().sign(PAYLOAD, now.timestamp()).unwrap();
        let tampered =
            br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_test_0002"}}}"#;
        assert!(matches!(
            verifier().verify(tampered, &header, now),
            Err(FulfillmentError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = WebhookVerifier::new("other", Duration::seconds(300))
            .sign(PAYLOAD, now.timestamp())
            .unwrap();
        assert!(verifier().verify(PAYLOAD, &header, now).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = Utc::now();
        let header = verifier()
            .sign(PAYLOAD, (now - Duration::seconds(301)).timestamp())
            .unwrap();
        assert!(verifier().verify(PAYLOAD, &header, now).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let now = Utc::now();
        for header in ["", "t=abc,v1=00", "v1=deadbeef", "t=1700000000"] {
            assert!(verifier().verify(PAYLOAD, header, now).is_err(), "{header}");
        }
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let now = Utc::now();
        let valid = verifier().sign(PAYLOAD, now.timestamp()).unwrap();
        let v1 = valid.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1=00ff,v1={}", now.timestamp(), v1);
        assert!(verifier().verify(PAYLOAD, &header, now).is_ok());
    }

    #[test]
    fn parses_checkout_completed() {
        assert_eq!(
            parse_event(PAYLOAD).unwrap(),
            WebhookEvent::CheckoutCompleted {
                session_id: "cs_test_0001".to_string()
            }
        );
        assert_eq!(
            parse_event(br#"{"type":"charge.refunded"}"#).unwrap(),
            WebhookEvent::Other {
                event_type: "charge.refunded".to_string()
            }
        );
        assert!(parse_event(br#"{"type":"checkout.session.completed"}"#).is_err());
        assert!(parse_event(b"not json").is_err());
    }
}
