//! Known ACME challenge type identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RestoreError;

/// An ACME challenge type a lineage may prefer.
///
/// Persisted preferences and CLI input both name challenges by their
/// protocol identifier (`http-01`, `dns-01`, `tls-alpn-01`). The short
/// legacy forms `http` and `dns` are accepted on parse and canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeType {
    /// HTTP-01: key authorization served over plain HTTP
    Http01,
    /// DNS-01: key authorization digest published in a TXT record
    Dns01,
    /// TLS-ALPN-01: validation via a special TLS certificate
    TlsAlpn01,
}

impl ChallengeType {
    /// Parse a challenge type identifier.
    ///
    /// Unknown identifiers are a restoration error, never silently
    /// skipped — a typo in a persisted preference must fail that lineage.
    pub fn from_name(name: &str) -> Result<Self, RestoreError> {
        match name.trim() {
            "http-01" | "http" => Ok(Self::Http01),
            "dns-01" | "dns" => Ok(Self::Dns01),
            "tls-alpn-01" => Ok(Self::TlsAlpn01),
            other => Err(RestoreError::UnknownChallenge(other.to_string())),
        }
    }

    /// The canonical protocol identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http01 => "http-01",
            Self::Dns01 => "dns-01",
            Self::TlsAlpn01 => "tls-alpn-01",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(
            ChallengeType::from_name("http-01").unwrap(),
            ChallengeType::Http01
        );
        assert_eq!(
            ChallengeType::from_name("dns-01").unwrap(),
            ChallengeType::Dns01
        );
        assert_eq!(
            ChallengeType::from_name("tls-alpn-01").unwrap(),
            ChallengeType::TlsAlpn01
        );
    }

    #[test]
    fn test_legacy_aliases() {
        assert_eq!(
            ChallengeType::from_name("http").unwrap(),
            ChallengeType::Http01
        );
        assert_eq!(
            ChallengeType::from_name("dns").unwrap(),
            ChallengeType::Dns01
        );
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(
            ChallengeType::from_name(" dns-01 ").unwrap(),
            ChallengeType::Dns01
        );
    }

    #[test]
    fn test_unknown_challenge() {
        let err = ChallengeType::from_name("finding-a-shrubbery").unwrap_err();
        assert!(matches!(err, RestoreError::UnknownChallenge(_)));
    }

    #[test]
    fn test_display_round_trip() {
        for c in [
            ChallengeType::Http01,
            ChallengeType::Dns01,
            ChallengeType::TlsAlpn01,
        ] {
            assert_eq!(ChallengeType::from_name(&c.to_string()).unwrap(), c);
        }
    }
}
