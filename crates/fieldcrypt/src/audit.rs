//! Structured tracing of each interception stage.
//!
//! The pipeline reports through the [`AuditSink`] trait so that callers can
//! inject their own sink; [`TracingAudit`] is the default and emits `tracing`
//! events.
//!
//! # Invariants
//!
//! - Snapshots carry key fingerprints only, never key secrets.
//! - Decryption failures and warnings are emitted even when verbose
//!   snapshots are switched off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::transcode::DecryptionFailure;

/// Points in the pipeline where a snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Operation as received, plus the encryption context.
    PreEncrypt,
    /// Operation as handed to the data client.
    BeforeDelegate,
    /// Raw result from the data client.
    AfterDelegate,
    /// Result as returned to the caller.
    PostDecrypt,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::PreEncrypt => "pre-encrypt",
            Stage::BeforeDelegate => "before-delegate",
            Stage::AfterDelegate => "after-delegate",
            Stage::PostDecrypt => "post-decrypt",
        }
    }
}

/// Receives audit events from the interception pipeline.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    /// Whether [`AuditSink::stage`] snapshots are wanted. Checked before a
    /// snapshot is built.
    fn verbose(&self) -> bool;

    /// Snapshot of the operation or result at `stage`.
    fn stage(&self, stage: Stage, operation: &str, snapshot: &Value);

    /// A field could not be decrypted and was passed through unchanged.
    fn decryption_failed(&self, model: &str, field: &str, failure: &DecryptionFailure);

    /// The layer was disabled at construction and passes everything through.
    fn disabled(&self, reason: &str);
}

/// [`AuditSink`] emitting `tracing` events, with a runtime verbosity switch.
#[derive(Debug, Clone)]
pub struct TracingAudit {
    verbose: Arc<AtomicBool>,
}

impl TracingAudit {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose: Arc::new(AtomicBool::new(verbose)),
        }
    }

    /// Switch per-stage snapshots on or off. Clones share the switch.
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }
}

impl Default for TracingAudit {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AuditSink for TracingAudit {
    fn verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    fn stage(&self, stage: Stage, operation: &str, snapshot: &Value) {
        if !self.verbose() {
            return;
        }
        info!(
            stage = stage.as_str(),
            operation,
            snapshot = %snapshot,
            "field encryption stage"
        );
    }

    fn decryption_failed(&self, model: &str, field: &str, failure: &DecryptionFailure) {
        error!(
            model,
            field,
            error = %failure,
            "error decrypting field (fallback: passing through)"
        );
    }

    fn disabled(&self, reason: &str) {
        warn!(reason, "field encryption is disabled");
    }
}
