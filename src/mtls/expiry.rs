//! Server certificate trust check and expiry warnings.
//!
//! At startup every server certificate is validated against the trust store
//! by [`CertificateChecker`].  Each trusted certificate gets an
//! [`ExpiryWarning`] due `threshold` before its `notAfter`, handed to the
//! [`ExpiryScheduler`], a single background task that logs each warning when
//! its moment arrives.  A certificate already inside the window warns at once.
//!
//! The scheduler stops on its [`CancellationToken`]; nothing fires after
//! cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rustls::pki_types::{CertificateDer, UnixTime};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info_span, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::mtls::material::{KeyStore, TrustStore};

// ─────────────────────────────────────────────────────────────────────────────
// Warning
// ─────────────────────────────────────────────────────────────────────────────

/// A one-shot expiry notice for one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryWarning {
    /// Subject DN of the certificate.
    pub subject: String,
    /// The certificate's `notAfter`.
    pub not_after: OffsetDateTime,
    /// When the warning is due (`not_after - threshold`).
    pub warn_at: OffsetDateTime,
}

impl ExpiryWarning {
    /// Time left until `warn_at`, zero if it has already passed.
    fn delay_from(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(self.warn_at - now).unwrap_or(Duration::ZERO)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Single background worker that logs scheduled expiry warnings.
#[derive(Debug)]
pub struct ExpiryScheduler {
    tx: mpsc::UnboundedSender<ExpiryWarning>,
    cancel: CancellationToken,
    fired: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ExpiryScheduler {
    /// Start the worker. It runs until `cancel` fires or the scheduler is
    /// dropped with nothing pending.
    #[must_use]
    pub fn spawn(cancel: CancellationToken) -> Self {
        Self::spawn_with_span(cancel, info_span!("expiry_scheduler"))
    }

    /// Start the worker, logging inside `span`.
    #[must_use]
    pub fn spawn_with_span(cancel: CancellationToken, span: Span) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let fired = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(
            run(rx, cancel.clone(), Arc::clone(&fired)).instrument(span),
        );
        Self {
            tx,
            cancel,
            fired,
            task,
        }
    }

    /// Queue a warning. Past-due warnings fire immediately.
    pub fn schedule(&self, warning: ExpiryWarning) {
        if self.tx.send(warning).is_err() {
            debug!("Expiry scheduler stopped, warning dropped");
        }
    }

    /// Number of warnings logged so far.
    #[must_use]
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Cancel pending warnings and wait for the worker to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Expiry scheduler task failed");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<ExpiryWarning>,
    cancel: CancellationToken,
    fired: Arc<AtomicUsize>,
) {
    // Keyed by deadline, then arrival order
    let mut pending: BTreeMap<(Instant, u64), ExpiryWarning> = BTreeMap::new();
    let mut seq = 0_u64;
    let mut open = true;

    loop {
        let next = pending.keys().next().map(|(at, _)| *at);
        if !open && next.is_none() {
            break;
        }

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(pending = pending.len(), "Expiry scheduler cancelled");
                break;
            }
            msg = rx.recv(), if open => match msg {
                Some(warning) => {
                    let at = Instant::now() + warning.delay_from(OffsetDateTime::now_utc());
                    debug!(subject = %warning.subject, warn_at = %warning.warn_at, "Expiry warning scheduled");
                    pending.insert((at, seq), warning);
                    seq += 1;
                }
                None => open = false,
            },
            () = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let now = Instant::now();
                while let Some(entry) = pending.first_entry() {
                    if entry.key().0 > now {
                        break;
                    }
                    let warning = entry.remove();
                    warn!(
                        subject = %warning.subject,
                        not_after = %warning.not_after,
                        "Server certificate expires soon"
                    );
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trust and expiry check
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of checking one server certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateStatus {
    /// Trusted; the warning is due later.
    Valid(ExpiryWarning),
    /// Trusted, but already expiring within the threshold.
    ExpiresSoon(ExpiryWarning),
    /// Trust-chain validation failed (unknown issuer, expired, ...).
    Untrusted {
        /// Subject DN, or `<unparsable>`.
        subject: String,
        /// Validation error.
        reason: String,
    },
}

impl CertificateStatus {
    /// The warning to schedule, for trusted certificates.
    #[must_use]
    pub fn expiry_warning(&self) -> Option<&ExpiryWarning> {
        match self {
            Self::Valid(warning) | Self::ExpiresSoon(warning) => Some(warning),
            Self::Untrusted { .. } => None,
        }
    }
}

/// Validates server certificates against the trust store.
#[derive(Debug, Clone)]
pub struct CertificateChecker {
    threshold: Duration,
    span: Span,
}

impl CertificateChecker {
    /// Checker warning `threshold` before `notAfter`.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            span: info_span!("certificate_checker"),
        }
    }

    /// Log inside `span` instead of the default one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Validate `cert` as a TLS server certificate at `now`.
    ///
    /// Full path building against `trust`, using `intermediates` to reach a
    /// trust anchor.  No logging.
    #[must_use]
    pub fn check(
        &self,
        trust: &TrustStore,
        cert: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: OffsetDateTime,
    ) -> CertificateStatus {
        let (subject, not_after) = match X509Certificate::from_der(cert.as_ref()) {
            Ok((_, parsed)) => (
                parsed.subject().to_string(),
                parsed.validity().not_after.to_datetime(),
            ),
            Err(e) => {
                return CertificateStatus::Untrusted {
                    subject: "<unparsable>".to_string(),
                    reason: e.to_string(),
                };
            }
        };

        if let Err(reason) = verify_server_cert(trust, cert, intermediates, now) {
            return CertificateStatus::Untrusted { subject, reason };
        }

        let threshold = time::Duration::try_from(self.threshold).unwrap_or(time::Duration::MAX);
        let warning = ExpiryWarning {
            subject,
            not_after,
            warn_at: not_after.checked_sub(threshold).unwrap_or(now),
        };
        if warning.warn_at <= now {
            CertificateStatus::ExpiresSoon(warning)
        } else {
            CertificateStatus::Valid(warning)
        }
    }

    /// Check the key store's server certificate, log the outcome and
    /// schedule its expiry warning when it is trusted.
    ///
    /// Never fails; the caller decides whether `Untrusted` is fatal.
    pub fn check_key_store(
        &self,
        trust: &TrustStore,
        key_store: &KeyStore,
        scheduler: &ExpiryScheduler,
    ) -> CertificateStatus {
        let _guard = self.span.enter();
        let status = self.check(
            trust,
            key_store.server_certificate(),
            key_store.intermediates(),
            OffsetDateTime::now_utc(),
        );

        match &status {
            CertificateStatus::Valid(warning) => {
                debug!(
                    subject = %warning.subject,
                    not_after = %warning.not_after,
                    warn_at = %warning.warn_at,
                    "Server certificate trusted"
                );
                scheduler.schedule(warning.clone());
            }
            CertificateStatus::ExpiresSoon(warning) => {
                debug!(
                    subject = %warning.subject,
                    warn_at = %warning.warn_at,
                    "Server certificate trusted but expiring"
                );
                scheduler.schedule(warning.clone());
            }
            CertificateStatus::Untrusted { subject, reason } => {
                warn!(
                    subject = %subject,
                    reason = %reason,
                    key_store = %key_store.path(),
                    trust_store = %trust.path(),
                    "Server certificate failed trust validation"
                );
            }
        }

        status
    }
}

fn verify_server_cert(
    trust: &TrustStore,
    cert: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    now: OffsetDateTime,
) -> Result<(), String> {
    let end_entity = webpki::EndEntityCert::try_from(cert).map_err(|e| e.to_string())?;
    let algorithms = rustls::crypto::aws_lc_rs::default_provider()
        .signature_verification_algorithms
        .all;
    let secs = u64::try_from(now.unix_timestamp()).unwrap_or(0);

    end_entity
        .verify_for_usage(
            algorithms,
            &trust.roots().roots,
            intermediates,
            UnixTime::since_unix_epoch(Duration::from_secs(secs)),
            webpki::KeyUsage::server_auth(),
            None,
            None,
        )
        .map(|_| ())
        .map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
