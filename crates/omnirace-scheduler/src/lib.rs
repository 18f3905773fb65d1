//! # OmniRace Scheduler
//!
//! The race engine: launches one adapter invocation per provider with a
//! resolvable credential, resolves on the first invocation that acquires a
//! readable upstream stream, and cancels every other invocation the moment a
//! winner exists.
//!
//! Arbitration is a single-slot result channel: the first successful writer
//! wins, and every later report — success or failure — is discarded without
//! effect. A global ceiling bounds the whole race independently of each
//! provider's own timeout, so resolution latency is bounded by the fastest
//! successful adapter, never the slowest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use omnirace_core::{mask_secret, ChatMessage, DeltaStream, KeyPool, RaceError, RaceFailure};
use omnirace_providers::ProviderAdapter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Race-wide settings.
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Ceiling on the whole race, independent of per-provider timeouts.
    pub global_timeout: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            global_timeout: Duration::from_secs(30),
        }
    }
}

impl RaceConfig {
    /// Set the global race timeout.
    #[must_use]
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }
}

/// The winning racer's acquired stream plus its race metadata.
///
/// Exactly one outcome exists per request; it is destroyed when the response
/// finishes or the client disconnects.
pub struct RaceOutcome {
    /// Winning provider name
    pub provider: String,
    /// Masked form of the credential used
    pub masked_key: String,
    /// The winner's canonical text-delta stream
    pub stream: DeltaStream,
    /// The winner's cancellation handle; cancelled on response teardown
    pub cancel: CancellationToken,
    /// Time from race start to stream acquisition
    pub latency: Duration,
}

impl std::fmt::Debug for RaceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaceOutcome")
            .field("provider", &self.provider)
            .field("masked_key", &self.masked_key)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

/// Races all configured providers and arbitrates first success.
pub struct RaceScheduler {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    config: RaceConfig,
}

struct RacerReport {
    index: usize,
    provider: String,
    masked_key: String,
    result: Result<DeltaStream, RaceError>,
    cancel: CancellationToken,
}

impl RaceScheduler {
    /// Create a scheduler over a set of adapters.
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, config: RaceConfig) -> Self {
        Self { adapters, config }
    }

    /// Number of configured adapters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Whether at least one provider currently has a resolvable credential.
    #[must_use]
    pub fn any_provider_available(&self) -> bool {
        self.adapters
            .iter()
            .any(|a| KeyPool::from_env(&a.spec().credential_env).is_some())
    }

    /// Run one race over the given messages.
    ///
    /// # Errors
    /// - [`RaceError::Configuration`] when no provider has a usable key
    /// - [`RaceError::AllProvidersFailed`] when every racer fails
    /// - [`RaceError::Timeout`] when the global ceiling expires first
    pub async fn run(&self, messages: &[ChatMessage]) -> Result<RaceOutcome, RaceError> {
        // INIT: resolve one key per provider; a missing pool just removes
        // that provider from the race.
        let mut entries = Vec::new();
        for adapter in &self.adapters {
            let spec = adapter.spec();
            match KeyPool::from_env(&spec.credential_env) {
                Some(pool) => entries.push((Arc::clone(adapter), pool.pick().clone())),
                None => debug!(
                    provider = %spec.name,
                    env = %spec.credential_env,
                    "No credentials configured, provider skipped"
                ),
            }
        }

        if entries.is_empty() {
            return Err(RaceError::configuration("<no keys found>"));
        }

        let total = entries.len();
        let start = Instant::now();
        let root = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<RacerReport>(total);

        let mut tokens = Vec::with_capacity(total);
        for (index, (adapter, key)) in entries.into_iter().enumerate() {
            let cancel = root.child_token();
            tokens.push(cancel.clone());

            let tx = tx.clone();
            let messages = messages.to_vec();
            tokio::spawn(async move {
                let provider = adapter.spec().name.clone();
                let masked_key = mask_secret(&key);
                let result = adapter.open_stream(&messages, &key, cancel.clone()).await;

                // After a winner exists the receiver is gone and this send
                // fails; the late result (and any stream it holds) is
                // dropped without effect.
                let _ = tx
                    .send(RacerReport {
                        index,
                        provider,
                        masked_key,
                        result,
                        cancel,
                    })
                    .await;
            });
        }
        drop(tx);

        // RACING: await the single result slot under the global ceiling.
        let deadline = tokio::time::Instant::now() + self.config.global_timeout;
        let mut failures: Vec<RaceFailure> = Vec::new();

        loop {
            let report = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    root.cancel();
                    warn!(
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        failures = failures.len(),
                        "Race timed out before any provider acquired a stream"
                    );
                    return Err(RaceError::Timeout {
                        elapsed: start.elapsed(),
                        failures,
                    });
                }
                Ok(Some(report)) => report,
                Ok(None) => {
                    // All senders gone; every racer has reported a failure.
                    return Err(RaceError::AllProvidersFailed { failures });
                }
            };

            match report.result {
                Ok(stream) => {
                    // WINNER_SELECTED: cancel every other invocation at once.
                    for (i, token) in tokens.iter().enumerate() {
                        if i != report.index {
                            token.cancel();
                        }
                    }

                    let latency = start.elapsed();
                    info!(
                        provider = %report.provider,
                        key = %report.masked_key,
                        latency_ms = latency.as_millis() as u64,
                        "Race winner selected"
                    );

                    return Ok(RaceOutcome {
                        provider: report.provider,
                        masked_key: report.masked_key,
                        stream,
                        cancel: report.cancel,
                        latency,
                    });
                }
                Err(err) => {
                    debug!(provider = %report.provider, error = %err, "Racer failed");
                    failures.push(RaceFailure::from(err));

                    if failures.len() == total {
                        return Err(RaceError::AllProvidersFailed { failures });
                    }
                }
            }
        }
    }
}
