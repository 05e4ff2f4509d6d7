//! The Alice role: initiates a reachability test against a peer and
//! classifies the outcome (base spec §2, §4.1).
//!
//! Exactly one test may be in flight at a time per [`TestInitiator`] (base
//! spec Non-goals: no concurrent tests from a single initiator). A second
//! call to [`TestInitiator::run_test`] while one is outstanding fails with
//! [`Error::Busy`] and leaves the in-flight test untouched.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::clock::{to_std, LocalTime, SharedClock};
use crate::collab::{normalize, Random, RemoteHostId, Transport};
use crate::config::Config;
use crate::message::{IntroKey, Nonce, PacketBuilder, TestFromAlice, TestPayload};
use crate::status::{ReachabilityStatus, StatusSink, TestOutcome};
use crate::timer::{TimerId, TimerService};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("a test is already in flight")]
    Busy,
}

/// All per-test state named in the base spec's Alice-role table (§3). Held
/// behind a single mutex so completion (reset to `None`) is atomic with
/// respect to a concurrent reply or retransmit tick (base spec §5).
struct InFlight {
    nonce: Nonce,
    peer: RemoteHostId,
    bob_endpoint: SocketAddr,
    bob_intro_key: IntroKey,
    charlie_endpoint: Option<SocketAddr>,
    test_begin_time: LocalTime,
    last_send_time: LocalTime,
    bob_reply_time: Option<LocalTime>,
    bob_reply_port: Option<u16>,
    charlie_reply_time: Option<LocalTime>,
    charlie_reply_port: Option<u16>,
    retransmit_timer: Option<TimerId>,
}

/// Drives a single reachability test to completion: sends `TestFromAlice`,
/// retransmits on a fixed interval, correlates the Bob and Charlie replies,
/// and reports a [`ReachabilityStatus`] through the configured sink.
pub struct TestInitiator<T: Transport> {
    transport: Arc<T>,
    timer: Arc<TimerService>,
    clock: SharedClock,
    random: Arc<dyn Random + Send + Sync>,
    config: Config,
    sink: Arc<dyn StatusSink>,
    state: Mutex<Option<InFlight>>,
}

impl<T: Transport + Send + Sync + 'static> TestInitiator<T> {
    pub fn new(
        transport: Arc<T>,
        timer: Arc<TimerService>,
        clock: SharedClock,
        random: Arc<dyn Random + Send + Sync>,
        config: Config,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            transport,
            timer,
            clock,
            random,
            config,
            sink,
            state: Mutex::new(None),
        }
    }

    /// Begin testing reachability via `bob`, tagging the eventual outcome
    /// with `peer` (the identity the caller associates with this test --
    /// not part of the base spec's data model, but needed for the sink to
    /// say which peer a result is about). Fails only if a test is already
    /// running (base spec §4.1, precondition).
    pub fn run_test(
        self: &Arc<Self>,
        peer: RemoteHostId,
        bob: SocketAddr,
        bob_intro_key: IntroKey,
    ) -> Result<Nonce, Error> {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return Err(Error::Busy);
        }

        let nonce = self.random.next_u32(u32::MAX);
        let now = self.clock.now();

        self.send_test_from_alice(bob, nonce);

        let this = Arc::clone(self);
        let retransmit_timer = Some(self.timer.schedule(
            to_std(self.config.retransmit_interval),
            move || this.on_continue_test(nonce),
        ));

        *guard = Some(InFlight {
            nonce,
            peer,
            bob_endpoint: bob,
            bob_intro_key,
            charlie_endpoint: None,
            test_begin_time: now,
            last_send_time: now,
            bob_reply_time: None,
            bob_reply_port: None,
            charlie_reply_time: None,
            charlie_reply_port: None,
            retransmit_timer,
        });

        Ok(nonce)
    }

    fn send_test_from_alice(&self, to: SocketAddr, nonce: Nonce) {
        let payload = TestPayload::without_endpoint(self.transport.get_intro_key(), nonce);
        self.transport
            .send(to, &PacketBuilder::build(&TestFromAlice(payload)));
    }

    /// One `ContinueTest` tick of the retransmission ladder (base spec
    /// §4.1). Reschedules itself at `now + retransmit_interval` unless the
    /// test has completed or just hit its overall deadline.
    fn on_continue_test(self: Arc<Self>, nonce: Nonce) {
        let mut guard = self.state.lock().unwrap();
        let Some(in_flight) = guard.as_mut() else {
            // Step 1: no current test (already completed). No-op.
            return;
        };
        if in_flight.nonce != nonce {
            // A stale tick from a since-completed test.
            return;
        }

        let now = self.clock.now();
        if now > in_flight.test_begin_time + self.config.test_deadline {
            let outcome = Self::classify(in_flight, nonce);
            *guard = None;
            drop(guard);
            self.sink.report(outcome);
            return;
        }

        if in_flight.bob_reply_time.is_none() {
            self.send_test_from_alice(in_flight.bob_endpoint, nonce);
        } else if in_flight.charlie_reply_time.is_none() {
            // Bob replied but hasn't (yet) recruited Charlie to reply to
            // us; poke Bob again so it pokes Charlie.
            self.send_test_from_alice(in_flight.bob_endpoint, nonce);
        } else if in_flight.charlie_reply_port.is_none() {
            if let Some(charlie) = in_flight.charlie_endpoint {
                self.send_test_from_alice(charlie, nonce);
            }
        }
        in_flight.last_send_time = now;

        let this = Arc::clone(&self);
        in_flight.retransmit_timer = Some(self.timer.schedule(
            to_std(self.config.retransmit_interval),
            move || this.on_continue_test(nonce),
        ));
    }

    /// Select the first matching row of the base spec's completion table
    /// (§4.1).
    fn classify(in_flight: &InFlight, nonce: Nonce) -> TestOutcome {
        let status = if let Some(charlie_port) = in_flight.charlie_reply_port {
            if in_flight.bob_reply_port == Some(charlie_port) {
                ReachabilityStatus::ReachableOk
            } else {
                ReachabilityStatus::ReachableDifferent
            }
        } else if in_flight.charlie_reply_time.is_some() {
            ReachabilityStatus::CharlieDied
        } else if in_flight.bob_reply_time.is_some() {
            ReachabilityStatus::RejectUnsolicited
        } else {
            ReachabilityStatus::BobUnresponsive
        };

        TestOutcome {
            nonce,
            peer: in_flight.peer,
            status,
        }
    }

    /// Reply correlation (base spec §4.1): handle an inbound test datagram
    /// whose nonce matches the active test.
    pub fn receive_reply(self: &Arc<Self>, from: SocketAddr, reply: TestPayload) {
        let mut guard = self.state.lock().unwrap();
        let Some(in_flight) = guard.as_mut() else {
            drop(guard);
            return self.reject_unsolicited(reply.nonce);
        };
        if in_flight.nonce != reply.nonce {
            drop(guard);
            return self.reject_unsolicited(reply.nonce);
        }

        if normalize(from).ip() == normalize(in_flight.bob_endpoint).ip() {
            in_flight.bob_reply_time = Some(self.clock.now());
            in_flight.bob_reply_port = Some(reply.port);
            return;
        }

        if in_flight.charlie_reply_time.is_none() {
            in_flight.charlie_reply_time = Some(self.clock.now());
            in_flight.charlie_endpoint = Some(from);
            let nonce = in_flight.nonce;
            drop(guard);
            self.send_test_from_alice(from, nonce);
            return;
        }

        in_flight.charlie_reply_port = Some(reply.port);
        let outcome = Self::classify(in_flight, reply.nonce);
        if let Some(timer) = in_flight.retransmit_timer {
            self.timer.cancel(timer);
        }
        *guard = None;
        drop(guard);
        self.sink.report(outcome);
    }

    fn reject_unsolicited(&self, nonce: Nonce) {
        log::warn!(target: "peertest", "rejecting unsolicited reply for nonce {nonce}");
        // There is no peer to name for a reply with no matching in-flight
        // test; still report it so callers auditing rejected traffic have
        // a signal, using a sentinel zeroed peer id.
        self.sink.report(TestOutcome {
            nonce,
            peer: RemoteHostId([0; 32]),
            status: ReachabilityStatus::RejectUnsolicited,
        });
    }

    /// Whether a test is currently outstanding.
    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Whether `nonce` belongs to our own outstanding test, used by
    /// [`crate::responder::TestResponder::receive_test`] to decide whether
    /// an inbound packet is a reply to us (base spec §4.2, step 2).
    pub fn matches_pending(&self, nonce: Nonce) -> bool {
        matches!(&*self.state.lock().unwrap(), Some(in_flight) if in_flight.nonce == nonce)
    }

    /// The intro key this module's wire payloads carry, exposed so the
    /// demo binary and tests don't need to reach into `transport` directly.
    pub fn intro_key(&self) -> IntroKey {
        self.transport.get_intro_key()
    }
}
