//! Stripe webhook signature verification
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...][,v0=...]`. The
//! signed message is `"{t}.{raw body}"`, keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BillingError, Result};

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verify against the current clock
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<()> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<()> {
        let mut timestamp: Option<i64> = None;
        let mut candidates = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| BillingError::InvalidSignature("missing timestamp in signature header".into()))?;
        if candidates.is_empty() {
            return Err(BillingError::InvalidSignature(
                "no v1 signature in signature header".into(),
            ));
        }

        if (now - timestamp).abs() > self.tolerance_secs {
            return Err(BillingError::InvalidSignature(format!(
                "timestamp {timestamp} outside tolerance of {}s",
                self.tolerance_secs
            )));
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| BillingError::Config(format!("unusable webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = candidates
            .iter()
            .filter_map(|candidate| hex::decode(candidate).ok())
            .any(|expected| mac.clone().verify_slice(&expected).is_ok());

        if matched {
            Ok(())
        } else {
            Err(BillingError::InvalidSignature(
                "no signatures found matching the expected signature for payload".into(),
            ))
        }
    }
}

/// Build a header the way Stripe does
#[cfg(any(test, feature = "testing"))]
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;
    const PAYLOAD: &[u8] = br#"{"type":"customer.subscription.updated"}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SECRET, 300)
    }

    #[test]
    fn test_valid_signature() {
        let header = sign(PAYLOAD, SECRET, NOW);
        verifier().verify_at(PAYLOAD, &header, NOW + 10).unwrap();
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign(PAYLOAD, "whsec_other", NOW);
        assert!(matches!(
            verifier().verify_at(PAYLOAD, &header, NOW),
            Err(BillingError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let header = sign(PAYLOAD, SECRET, NOW);
        let tampered = br#"{"type":"customer.subscription.deleted"}"#;
        assert!(verifier().verify_at(tampered, &header, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = sign(PAYLOAD, SECRET, NOW - 600);
        assert!(verifier().verify_at(PAYLOAD, &header, NOW).is_err());
    }

    #[test]
    fn test_any_matching_v1_passes() {
        let signed = sign(PAYLOAD, SECRET, NOW);
        let good = signed.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1=deadbeef,v0=abc,v1={good}");
        verifier().verify_at(PAYLOAD, &header, NOW).unwrap();
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let only_timestamp = format!("t={NOW}");
        for header in ["", "garbage", "v1=abcd", only_timestamp.as_str(), "t=abc,v1=abcd"] {
            assert!(
                matches!(
                    verifier().verify_at(PAYLOAD, header, NOW),
                    Err(BillingError::InvalidSignature(_))
                ),
                "header {header:?} should be rejected"
            );
        }
    }
}
