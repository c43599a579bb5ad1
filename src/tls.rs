//! TLS policy for the base transport.
//!
//! A [`TlsConfig`] is applied to a fresh `reqwest::ClientBuilder` every time a
//! [`ReqwestTransport`](crate::transport::ReqwestTransport) is built, so two clients with
//! different policies never share connector state.

/// Minimum protocol version accepted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn as_reqwest(self) -> reqwest::tls::Version {
        match self {
            TlsVersion::Tls12 => reqwest::tls::Version::TLS_1_2,
            TlsVersion::Tls13 => reqwest::tls::Version::TLS_1_3,
        }
    }
}

/// TLS settings for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Lowest protocol version to negotiate. `None` keeps the backend default.
    pub min_version: Option<TlsVersion>,
    /// Accept any certificate. Only for self-signed, locally reachable endpoints.
    pub insecure_skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self { min_version: Some(TlsVersion::Tls12), insecure_skip_verify: false }
    }
}

impl TlsConfig {
    /// Require TLS 1.3.
    pub fn modern() -> Self {
        Self { min_version: Some(TlsVersion::Tls13), insecure_skip_verify: false }
    }

    /// Skip certificate verification. Opt-in only; never a default.
    pub fn insecure_for_local_testing() -> Self {
        Self { min_version: Some(TlsVersion::Tls12), insecure_skip_verify: true }
    }

    /// Apply this policy to `builder`.
    pub fn apply(&self, mut builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        if let Some(version) = self.min_version {
            builder = builder.min_tls_version(version.as_reqwest());
        }
        if self.insecure_skip_verify {
            tracing::warn!(
                target: "restline",
                "TLS certificate verification disabled; only use against local self-signed endpoints"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_verifies_certificates() {
        let cfg = TlsConfig::default();
        assert!(!cfg.insecure_skip_verify);
        assert_eq!(cfg.min_version, Some(TlsVersion::Tls12));
    }

    #[test]
    fn insecure_mode_is_explicit() {
        assert!(TlsConfig::insecure_for_local_testing().insecure_skip_verify);
        assert!(!TlsConfig::modern().insecure_skip_verify);
    }

    #[test]
    fn independent_builders_accept_different_policies() {
        let strict = TlsConfig::modern().apply(reqwest::Client::builder()).build();
        let lax = TlsConfig::insecure_for_local_testing().apply(reqwest::Client::builder()).build();
        assert!(strict.is_ok());
        assert!(lax.is_ok());
    }
}
