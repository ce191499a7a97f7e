use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
    TokioAsyncResolver,
};

/// Outcome of one external lookup. Probes never let a network error
/// escape; the default-signal substitution happens one layer up, in the
/// feature functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    Success(T),
    Timeout,
    Failure(String),
}

impl<T> ProbeOutcome<T> {
    pub fn success(&self) -> Option<&T> {
        match self {
            ProbeOutcome::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }
}

/// Run a fallible future under a budget, folding the elapsed case into
/// `Timeout`.
pub async fn timeboxed<T, F>(budget: Duration, fut: F) -> ProbeOutcome<T>
where
    F: std::future::Future<Output = Result<T, String>>,
{
    match tokio::time::timeout(budget, fut).await {
        Err(_) => ProbeOutcome::Timeout,
        Ok(Ok(v)) => ProbeOutcome::Success(v),
        Ok(Err(e)) => ProbeOutcome::Failure(e),
    }
}

pub struct DnsProber {
    resolver: TokioAsyncResolver,
    budget: Duration,
}

impl DnsProber {
    pub fn new(budget: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = budget;
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            budget,
        }
    }

    /// Resolve a host to address records. IP literals trivially resolve
    /// to themselves.
    pub async fn resolve(&self, host: &str) -> ProbeOutcome<Vec<IpAddr>> {
        if host.is_empty() {
            return ProbeOutcome::Failure("empty host".to_string());
        }
        if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
            return ProbeOutcome::Success(vec![ip]);
        }

        match tokio::time::timeout(self.budget, self.resolver.lookup_ip(host)).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Ok(lookup)) => {
                let addrs: Vec<IpAddr> = lookup.iter().collect();
                if addrs.is_empty() {
                    ProbeOutcome::Failure("no address records".to_string())
                } else {
                    ProbeOutcome::Success(addrs)
                }
            }
            Ok(Err(e)) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    debug!("no DNS records for {host}");
                    ProbeOutcome::Failure("no address records".to_string())
                }
                ResolveErrorKind::Timeout => ProbeOutcome::Timeout,
                _ => ProbeOutcome::Failure(e.to_string()),
            },
        }
    }
}

/// Result of verifying a secure endpoint's certificate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsState {
    Verified,
    CertificateError,
    Unreachable,
}

pub struct TlsProber {
    strict: Client,
    lax: Client,
    budget: Duration,
}

impl TlsProber {
    pub fn new(budget: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let strict = Client::builder()
            .user_agent(user_agent)
            .timeout(budget)
            .build()?;
        let lax = Client::builder()
            .user_agent(user_agent)
            .timeout(budget)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { strict, lax, budget })
    }

    /// Lightweight HEAD with full verification. When the verified attempt
    /// fails but an unverified one succeeds, the chain itself is the
    /// problem; when both fail the endpoint is unreachable.
    pub async fn verify(&self, url: &str) -> ProbeOutcome<TlsState> {
        match tokio::time::timeout(self.budget, self.strict.head(url).send()).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Ok(_)) => ProbeOutcome::Success(TlsState::Verified),
            Ok(Err(strict_err)) => {
                debug!("verified TLS attempt failed for {url}: {strict_err}");
                match tokio::time::timeout(self.budget, self.lax.head(url).send()).await {
                    Ok(Ok(_)) => ProbeOutcome::Success(TlsState::CertificateError),
                    _ => ProbeOutcome::Success(TlsState::Unreachable),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeboxed_maps_elapsed_to_timeout() {
        tokio_test::block_on(async {
            let slow = async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, String>(1u8)
            };
            let outcome = timeboxed(Duration::from_millis(10), slow).await;
            assert_eq!(outcome, ProbeOutcome::Timeout);
        });
    }

    #[test]
    fn timeboxed_passes_values_and_errors_through() {
        tokio_test::block_on(async {
            let ok = timeboxed(Duration::from_secs(1), async { Ok::<_, String>(7u8) }).await;
            assert_eq!(ok, ProbeOutcome::Success(7));

            let err = timeboxed(Duration::from_secs(1), async {
                Err::<u8, _>("boom".to_string())
            })
            .await;
            assert_eq!(err, ProbeOutcome::Failure("boom".to_string()));
        });
    }

    #[tokio::test]
    async fn ip_literals_resolve_without_network() {
        let prober = DnsProber::new(Duration::from_millis(50));
        let outcome = prober.resolve("192.168.1.1").await;
        assert!(outcome.is_success());

        let outcome = prober.resolve("[2001:db8::1]").await;
        assert!(outcome.is_success());

        let outcome = prober.resolve("").await;
        assert!(!outcome.is_success());
    }
}
