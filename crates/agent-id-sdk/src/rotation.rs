//! Automatic key rotation.
//!
//! The agent polls the backend for its key status and replaces the key
//! before it expires. A new key is written to a pending file before it is
//! submitted, and the credential bundle is only rewritten once the backend
//! has acknowledged it, so an interrupted rotation leaves state that
//! [`KeyRotationAgent::reconcile`] can resolve against the backend's key of
//! record.

use agent_id_crypto::{
    canonicalize_rotation_message, current_timestamp, encode_public_key, encode_signature,
    AgentKeyPair,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{KeyBackend, KeyStatusReport, RotationAck, RotationSubmission};
use crate::bundle::{CredentialBundle, PendingKey};
use crate::errors::{Result, SdkError};
use crate::signing::SigningHandle;

/// Where the agent's key is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// Key valid and not yet due
    Fresh,
    /// Inside the rotation window
    ApproachingExpiry,
    /// Rotated; the backend still accepts the prior key
    GracePeriod,
    /// Rotation completed on this tick
    Rotated,
}

impl RotationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationState::Fresh => "fresh",
            RotationState::ApproachingExpiry => "approaching_expiry",
            RotationState::GracePeriod => "grace_period",
            RotationState::Rotated => "rotated",
        }
    }

    /// State implied by a backend report
    pub fn from_report(report: &KeyStatusReport, rotation_window_days: i64) -> Self {
        if report.should_rotate || report.days_until_expiry <= rotation_window_days {
            RotationState::ApproachingExpiry
        } else if report.in_grace_period {
            RotationState::GracePeriod
        } else {
            RotationState::Fresh
        }
    }
}

/// Outcome of comparing local key material with the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Bundle key is the key of record and no rotation was in flight
    InSync,
    /// The backend had accepted the pending key; the bundle now uses it
    PendingPromoted,
    /// The backend never saw the pending key; it was dropped
    PendingDiscarded,
    /// Neither local key is the key of record
    Mismatch { local: String, backend: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RotationEvent {
    StateChanged {
        from: RotationState,
        to: RotationState,
    },
    Rotated {
        public_key: String,
        rotation_count: u32,
    },
    RotationFailed {
        consecutive_failures: u32,
        error: String,
    },
    /// Repeated rotation failures need a human
    OperatorAlert {
        consecutive_failures: u32,
        error: String,
    },
    Reconciled(ReconcileOutcome),
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Time between key status checks
    pub check_interval: Duration,
    /// Rotate once expiry is this many days away, even if the backend does
    /// not ask for it yet
    pub rotation_window_days: i64,
    /// Consecutive failures that raise an operator alert
    pub alert_after_failures: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(3600),
            rotation_window_days: 7,
            alert_after_failures: 3,
        }
    }
}

struct Progress {
    state: RotationState,
    consecutive_failures: u32,
}

/// Background key rotation for one agent
pub struct KeyRotationAgent<B: KeyBackend> {
    backend: Arc<B>,
    bundle_path: PathBuf,
    pending_path: PathBuf,
    config: RotationConfig,
    signer: SigningHandle,
    /// Held for the whole of a rotation or reconcile
    bundle: Mutex<CredentialBundle>,
    progress: parking_lot::Mutex<Progress>,
    events: broadcast::Sender<RotationEvent>,
}

impl<B: KeyBackend + 'static> KeyRotationAgent<B> {
    /// Load the bundle at `bundle_path` and take over its key
    pub fn load(
        backend: Arc<B>,
        bundle_path: impl Into<PathBuf>,
        config: RotationConfig,
    ) -> Result<Self> {
        let bundle_path = bundle_path.into();
        let bundle = CredentialBundle::load(&bundle_path)?;
        let signer = SigningHandle::new(bundle.agent_id, bundle.keypair()?);
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            backend,
            pending_path: PendingKey::path_for(&bundle_path),
            bundle_path,
            config,
            signer,
            bundle: Mutex::new(bundle),
            progress: parking_lot::Mutex::new(Progress {
                state: RotationState::Fresh,
                consecutive_failures: 0,
            }),
            events,
        })
    }

    /// Handle for signing; stays valid across rotations
    pub fn signer(&self) -> SigningHandle {
        self.signer.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RotationEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RotationState {
        self.progress.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.progress.lock().consecutive_failures
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    pub async fn bundle(&self) -> CredentialBundle {
        self.bundle.lock().await.clone()
    }

    fn emit(&self, event: RotationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, to: RotationState) {
        let from = {
            let mut progress = self.progress.lock();
            std::mem::replace(&mut progress.state, to)
        };
        if from != to {
            debug!(from = from.as_str(), to = to.as_str(), "Rotation state changed");
            self.emit(RotationEvent::StateChanged { from, to });
        }
    }

    /// Compare local key material with the backend's key of record
    ///
    /// Run on startup before trusting a bundle that may have been left
    /// mid-rotation.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let mut bundle = self.bundle.lock().await;
        let report = self.backend.key_status(bundle.agent_id).await?;
        let pending = PendingKey::load(&self.pending_path)?;

        let outcome = match pending {
            Some(pending) if pending.public_key == report.public_key => {
                let keypair = pending.keypair()?;
                let rotated_at = report.key_created_at;
                bundle.apply_rotation(&keypair, rotated_at, report.rotation_count);
                bundle.save(&self.bundle_path)?;
                self.signer.swap(keypair);
                PendingKey::remove(&self.pending_path)?;
                info!(
                    agent_id = %bundle.agent_id,
                    "Pending key promoted after interrupted rotation"
                );
                ReconcileOutcome::PendingPromoted
            }
            Some(_) if bundle.public_key == report.public_key => {
                PendingKey::remove(&self.pending_path)?;
                info!(agent_id = %bundle.agent_id, "Unacknowledged pending key discarded");
                ReconcileOutcome::PendingDiscarded
            }
            None if bundle.public_key == report.public_key => ReconcileOutcome::InSync,
            _ => {
                error!(
                    agent_id = %bundle.agent_id,
                    local = %bundle.public_key,
                    backend = %report.public_key,
                    "Local key is not the backend key of record; manual re-issuance required"
                );
                ReconcileOutcome::Mismatch {
                    local: bundle.public_key.clone(),
                    backend: report.public_key.clone(),
                }
            }
        };
        drop(bundle);

        self.emit(RotationEvent::Reconciled(outcome.clone()));
        Ok(outcome)
    }

    /// One monitor tick: check status and rotate when due
    ///
    /// Failures are counted; the next attempt waits for the next tick.
    pub async fn check_once(&self) -> Result<RotationState> {
        match self.check_and_rotate().await {
            Ok(state) => {
                self.progress.lock().consecutive_failures = 0;
                Ok(state)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    async fn check_and_rotate(&self) -> Result<RotationState> {
        let report = self.backend.key_status(self.signer.agent_id()).await?;
        let state = RotationState::from_report(&report, self.config.rotation_window_days);
        self.set_state(state);

        if state != RotationState::ApproachingExpiry {
            return Ok(state);
        }

        info!(
            agent_id = %report.agent_id,
            days_until_expiry = report.days_until_expiry,
            "Key rotation due"
        );
        self.rotate_now().await?;
        Ok(RotationState::Rotated)
    }

    fn record_failure(&self, error: &SdkError) {
        let failures = {
            let mut progress = self.progress.lock();
            progress.consecutive_failures += 1;
            progress.consecutive_failures
        };
        warn!(
            agent_id = %self.signer.agent_id(),
            consecutive_failures = failures,
            error = %error,
            "Key rotation check failed"
        );
        self.emit(RotationEvent::RotationFailed {
            consecutive_failures: failures,
            error: error.to_string(),
        });

        let threshold = self.config.alert_after_failures.max(1);
        if failures % threshold == 0 {
            error!(
                agent_id = %self.signer.agent_id(),
                consecutive_failures = failures,
                error = %error,
                "OPERATOR ALERT: key rotation keeps failing; agent continues on its current key"
            );
            self.emit(RotationEvent::OperatorAlert {
                consecutive_failures: failures,
                error: error.to_string(),
            });
        }
    }

    /// Rotate immediately
    pub async fn rotate_now(&self) -> Result<RotationAck> {
        let mut bundle = self.bundle.lock().await;
        let agent_id = bundle.agent_id;
        let now = current_timestamp();

        let keypair = AgentKeyPair::generate()?;
        PendingKey::new(agent_id, &keypair, now).save(&self.pending_path)?;

        let new_public_key = keypair.public_key_bytes();
        let message = canonicalize_rotation_message(&agent_id, &new_public_key, now);
        let submission = RotationSubmission {
            agent_id,
            new_public_key: encode_public_key(&new_public_key),
            timestamp: now,
            signature: encode_signature(&self.signer.sign(&message)),
        };

        let ack = match self.backend.submit_rotation(&submission).await {
            Ok(ack) => ack,
            Err(e) => {
                if e.is_rejection() {
                    // Definitively refused: the key of record is unchanged
                    PendingKey::remove(&self.pending_path)?;
                }
                return Err(e);
            }
        };

        if ack.public_key != submission.new_public_key {
            return Err(SdkError::KeyMismatch {
                local: submission.new_public_key,
                backend: ack.public_key,
            });
        }

        bundle.apply_rotation(&keypair, ack.rotated_at, ack.rotation_count);
        bundle.save(&self.bundle_path)?;
        self.signer.swap(keypair);
        PendingKey::remove(&self.pending_path)?;
        drop(bundle);

        info!(
            agent_id = %agent_id,
            rotation_count = ack.rotation_count,
            grace_until = ?ack.previous_key_grace_until,
            "Key rotated"
        );
        self.set_state(RotationState::Rotated);
        self.emit(RotationEvent::Rotated {
            public_key: ack.public_key.clone(),
            rotation_count: ack.rotation_count,
        });

        Ok(ack)
    }

    /// Start the monitor on its own task
    pub fn spawn(self: Arc<Self>) -> RotationHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let interval = self.config.check_interval;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // A started rotation runs to completion before the
                        // next cancellation check
                        let _ = self.check_once().await;
                    }
                }
            }

            debug!(agent_id = %self.signer.agent_id(), "Rotation monitor stopped");
        });

        RotationHandle { cancel, join }
    }
}

/// Control handle for a running rotation monitor
pub struct RotationHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RotationHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the monitor, waiting at most `timeout`
    ///
    /// On timeout the task is aborted and [`SdkError::ShutdownTimeout`]
    /// returned; the next start must call `reconcile`.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        let mut join = self.join;

        match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "Rotation monitor panicked");
                Ok(())
            }
            Err(_) => {
                join.abort();
                warn!("Rotation monitor aborted after shutdown timeout");
                Err(SdkError::ShutdownTimeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(
        days_until_expiry: i64,
        should_rotate: bool,
        in_grace_period: bool,
    ) -> KeyStatusReport {
        KeyStatusReport {
            agent_id: uuid::Uuid::new_v4(),
            key_status: "verified".to_string(),
            public_key: String::new(),
            key_created_at: 0,
            key_expires_at: 0,
            days_until_expiry,
            should_rotate,
            in_grace_period,
            previous_key_grace_until: None,
            rotation_count: 0,
        }
    }

    #[test]
    fn test_state_from_report() {
        assert_eq!(RotationState::from_report(&report(60, false, false), 7), RotationState::Fresh);
        assert_eq!(
            RotationState::from_report(&report(6, false, false), 7),
            RotationState::ApproachingExpiry
        );
        assert_eq!(
            RotationState::from_report(&report(60, true, false), 7),
            RotationState::ApproachingExpiry
        );
        assert_eq!(
            RotationState::from_report(&report(89, false, true), 7),
            RotationState::GracePeriod
        );
    }
}
