//! Outcome classification for a reachability test (base spec §4.1, §8) and
//! the callback surface used to report it.
//!
//! The base spec's open question on how results should be surfaced ("just a
//! log line, or a structured event?") is resolved here in favor of a typed
//! callback: logging alone would force callers to parse log lines to learn
//! the outcome, and this subsystem's whole purpose is to tell its caller
//! something concrete about a peer.

use crate::collab::RemoteHostId;
use crate::message::Nonce;

/// The five ways a reachability test can conclude (base spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityStatus {
    /// Bob replied directly from the endpoint Alice tested.
    ReachableOk,
    /// A reply arrived, correlated correctly, but from a different endpoint
    /// than the one under test (e.g. Bob replied through a different path).
    ReachableDifferent,
    /// Bob relayed the test to Charlie, but Charlie never replied.
    CharlieDied,
    /// A reply arrived that correlates to no outstanding test.
    RejectUnsolicited,
    /// No reply arrived from Bob (directly or via Charlie) before the
    /// overall test deadline.
    BobUnresponsive,
}

/// A single completed test result, handed to the status sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestOutcome {
    pub nonce: Nonce,
    pub peer: RemoteHostId,
    pub status: ReachabilityStatus,
}

/// Receives the outcome of each completed reachability test.
///
/// Implementations are expected to be cheap and non-blocking -- this is
/// called directly from the thread that decided the test was complete
/// (either the reader thread or the timer thread, see base spec §5).
pub trait StatusSink: Send + Sync {
    fn report(&self, outcome: TestOutcome);
}

/// A [`StatusSink`] that only logs; used where a caller has no interest in
/// structured results (the demo binary, simple integration tests).
pub struct LoggingSink;

impl StatusSink for LoggingSink {
    fn report(&self, outcome: TestOutcome) {
        match outcome.status {
            ReachabilityStatus::ReachableOk | ReachabilityStatus::ReachableDifferent => {
                log::debug!(target: "peertest", "test {} complete: {:?}", outcome.nonce, outcome.status);
            }
            _ => {
                log::warn!(target: "peertest", "test {} complete: {:?}", outcome.nonce, outcome.status);
            }
        }
    }
}
