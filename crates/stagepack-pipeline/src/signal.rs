//! Completion signals per (stage, package)
//!
//! A signal is settled exactly once, either ready or rejected. Rejecting any
//! signal through the board cancels the build: every pending signal is
//! rejected so no waiter blocks forever.

use crate::errors::PipelineError;
use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use stagepack_manifest::PackageId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState {
    Pending,
    Ready,
    Rejected(Arc<str>),
}

/// A one-shot completion signal
#[derive(Debug)]
pub struct ReadySignal {
    state: Mutex<SignalState>,
    settled: Condvar,
}

impl Default for ReadySignal {
    fn default() -> Self {
        ReadySignal {
            state: Mutex::new(SignalState::Pending),
            settled: Condvar::new(),
        }
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        ReadySignal::default()
    }

    /// Mark ready; a signal that is already settled keeps its state
    pub fn resolve(&self) {
        self.settle(SignalState::Ready);
    }

    pub fn reject(&self, reason: &str) {
        self.settle(SignalState::Rejected(Arc::from(reason)));
    }

    fn settle(&self, next: SignalState) {
        let mut state = self.state.lock();
        if *state == SignalState::Pending {
            *state = next;
            self.settled.notify_all();
        }
    }

    pub fn state(&self) -> SignalState {
        self.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SignalState::Ready
    }

    /// Block until settled
    pub fn wait(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock();
        while *state == SignalState::Pending {
            self.settled.wait(&mut state);
        }
        match &*state {
            SignalState::Ready => Ok(()),
            SignalState::Rejected(reason) => Err(PipelineError::Cancelled(reason.to_string())),
            SignalState::Pending => Err(PipelineError::Cancelled("signal never settled".into())),
        }
    }
}

/// All signals of one build plus its cancellation flag
#[derive(Debug)]
pub struct SignalBoard {
    stages: Vec<&'static str>,
    signals: AHashMap<(&'static str, PackageId), Arc<ReadySignal>>,
    cancelled: AtomicBool,
}

impl SignalBoard {
    /// One pending signal for every stage of every package
    pub fn new(stages: &[&'static str], packages: &[PackageId]) -> Self {
        let mut signals = AHashMap::new();
        for &stage in stages {
            for &package in packages {
                signals.insert((stage, package), Arc::new(ReadySignal::new()));
            }
        }
        SignalBoard {
            stages: stages.to_vec(),
            signals,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn signal(&self, stage: &str, package: PackageId) -> Option<&Arc<ReadySignal>> {
        self.stages
            .iter()
            .find(|s| **s == stage)
            .and_then(|s| self.signals.get(&(*s, package)))
    }

    /// Signal of the last stage for `package`
    pub fn terminal(&self, package: PackageId) -> Option<&Arc<ReadySignal>> {
        let last = self.stages.last()?;
        self.signals.get(&(*last, package))
    }

    pub fn resolve(&self, stage: &str, package: PackageId) {
        if let Some(signal) = self.signal(stage, package) {
            signal.resolve();
        }
    }

    /// Reject one signal and cancel the rest of the build
    pub fn reject(&self, stage: &str, package: PackageId, reason: &str) {
        if let Some(signal) = self.signal(stage, package) {
            signal.reject(reason);
        }
        self.cancel(reason);
    }

    pub fn cancel(&self, reason: &str) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Cancelling build: {}", reason);
        for signal in self.signals.values() {
            signal.reject(reason);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error out early if another package already failed
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled(
                "another package failed".to_string(),
            ));
        }
        Ok(())
    }
}
