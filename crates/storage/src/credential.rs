use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Deserialize;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc3339};

/// Region sent to S3-compatible endpoints that do not care about regions.
pub const DEFAULT_REGION: &str = "us-east-1";

/// A time-boxed object-store credential as handed out by an issuer.
///
/// Never mutated: a refresh replaces the whole value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub id: String,
    pub secret: String,
    pub session_token: String,
    pub bucket: String,
    pub endpoint: String,
    #[serde(default)]
    pub region: Option<String>,
    /// ISO-8601 timestamp after which the credential is unusable.
    pub expiry: String,
}

impl Credential {
    /// Parse [`expiry`](Self::expiry).
    pub fn expires_at(&self) -> Result<OffsetDateTime> {
        parse_expiry(&self.expiry)
    }

    /// Whether the credential is unusable at `now`. An unparseable expiry
    /// counts as expired.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_at() {
            Ok(expires_at) => expires_at <= now,
            Err(_) => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

// Keep secrets out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("expiry", &self.expiry)
            .finish()
    }
}

pub(crate) fn parse_expiry(expiry: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(expiry, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(expiry, &Iso8601::DEFAULT))
        .or_raise(|| ErrorKind::InvalidExpiry(expiry.to_string()))
}
