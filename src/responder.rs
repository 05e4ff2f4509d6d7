//! The Bob and Charlie roles, handled by a single component: which role a
//! given inbound packet plays is determined structurally, by comparing the
//! endpoint carried in the payload against the endpoint it actually arrived
//! from, and by Charlie-ring membership -- never by a tag on the wire
//! (base spec §4.2, §9).
//!
//! [`TestResponder::receive_test`] is the base spec's single entry point
//! (§4.2); it also forwards to [`crate::initiator::TestInitiator`] when the
//! inbound nonce belongs to our own outstanding test, so a node running
//! both roles only needs one place to feed inbound packets.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::clock::{to_std, LocalDuration};
use crate::collab::{normalize, Capability, NetDb, Transport};
use crate::initiator::TestInitiator;
use crate::message::{PacketBuilder, TestPayload, TestToAlice, TestToCharlie};
use crate::ring::CharlieRing;
use crate::timer::TimerService;

/// Handles inbound reachability-test packets: the Bob and Charlie roles,
/// plus routing a reply for our own test through to the initiator.
pub struct TestResponder<T: Transport, D: NetDb> {
    transport: Arc<T>,
    netdb: Arc<D>,
    ring: Arc<CharlieRing>,
    timer: Arc<TimerService>,
    initiator: Arc<TestInitiator<T>>,
    charlie_entry_lifetime: LocalDuration,
}

impl<T: Transport + Send + Sync + 'static, D: NetDb> TestResponder<T, D> {
    pub fn new(
        transport: Arc<T>,
        netdb: Arc<D>,
        ring: Arc<CharlieRing>,
        timer: Arc<TimerService>,
        initiator: Arc<TestInitiator<T>>,
        charlie_entry_lifetime: LocalDuration,
    ) -> Self {
        Self {
            transport,
            netdb,
            ring,
            timer,
            initiator,
            charlie_entry_lifetime,
        }
    }

    /// Base spec §4.2's `receive_test(from, msg)`.
    pub fn receive_test(&self, from: SocketAddr, msg: TestPayload) {
        if self.initiator.matches_pending(msg.nonce) {
            self.initiator.receive_reply(from, msg);
            return;
        }

        match msg.endpoint() {
            None => self.receive_from_alice(from, msg),
            Some(endpoint) if normalize(endpoint) == normalize(from) => {
                self.receive_from_alice(from, msg)
            }
            Some(endpoint) => self.receive_recruited_as_charlie(from, endpoint, msg),
        }
    }

    /// The payload's endpoint was absent or matched `from`: the sender is
    /// Alice. Ring membership decides whether we're Bob hearing from her
    /// for the first time, or Charlie hearing from her directly.
    fn receive_from_alice(&self, from: SocketAddr, msg: TestPayload) {
        if self.ring.contains(msg.nonce) {
            self.reply_as_charlie(from, msg);
        } else {
            self.relay_as_bob(from, msg);
        }
    }

    /// §4.2a: we've been recruited as Charlie by Bob. `alice` is the
    /// endpoint Bob named in the relay; `from` is Bob's own address.
    fn receive_recruited_as_charlie(&self, from: SocketAddr, alice: SocketAddr, msg: TestPayload) {
        if alice.port() == 0 {
            log::warn!(target: "peertest", "dropping malformed charlie recruitment from {from}: zero port");
            return;
        }

        let slot = self.ring.insert(msg.nonce);
        let ring = self.ring.clone();
        let nonce = msg.nonce;
        self.timer
            .schedule(to_std(self.charlie_entry_lifetime), move || {
                ring.evict(nonce, slot);
            });

        self.transport.send(
            alice,
            &PacketBuilder::build(&TestToAlice(TestPayload::with_endpoint(
                alice,
                self.transport.get_intro_key(),
                msg.nonce,
            ))),
        );
    }

    /// §4.2c: direct contact from Alice for a nonce we're already
    /// registered as Charlie for.
    fn reply_as_charlie(&self, from: SocketAddr, msg: TestPayload) {
        self.transport.send(
            from,
            &PacketBuilder::build(&TestToAlice(TestPayload::with_endpoint(
                from,
                self.transport.get_intro_key(),
                msg.nonce,
            ))),
        );
    }

    /// §4.2b: first contact from Alice. Pick a Charlie and ask it to reach
    /// out to her; ack Alice either way (base spec §7: an unresolvable
    /// Charlie is a warn-and-drop of the *relay*, not of Bob's own reply --
    /// Alice must still see `bob_reply_time` set so a missing Charlie
    /// eventually classifies as `REJECT_UNSOLICITED` rather than hanging
    /// until `BOB_UNRESPONSIVE`).
    fn relay_as_bob(&self, from: SocketAddr, msg: TestPayload) {
        let charlie = self
            .transport
            .get_peer_state(Capability::Testing)
            .and_then(|id| self.netdb.lookup_local(id));

        let intro_key = charlie
            .map(|c| c.intro_key)
            .unwrap_or_else(|| self.transport.get_intro_key());

        self.transport.send(
            from,
            &PacketBuilder::build(&TestToAlice(TestPayload::with_endpoint(
                from, intro_key, msg.nonce,
            ))),
        );

        match charlie {
            Some(charlie) => {
                self.transport.send(
                    charlie.addr,
                    &PacketBuilder::build(&TestToCharlie(TestPayload::with_endpoint(
                        from,
                        msg.intro_key,
                        msg.nonce,
                    ))),
                );
            }
            None => {
                log::warn!(target: "peertest", "no resolvable testing-capable peer, acking {from} without a charlie relay");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SharedClock;
    use crate::collab::{RemoteHostId, RouterInfo};
    use crate::message::IntroKey;
    use crate::status::{ReachabilityStatus, StatusSink, TestOutcome};
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::sync::Mutex;

    struct FakeTransport {
        intro_key: IntroKey,
        charlie: Option<RemoteHostId>,
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl Transport for FakeTransport {
        fn send(&self, to: SocketAddr, payload: &[u8]) {
            self.sent.lock().unwrap().push((to, payload.to_vec()));
        }
        fn get_intro_key(&self) -> IntroKey {
            self.intro_key
        }
        fn get_peer_state(&self, _capability: Capability) -> Option<RemoteHostId> {
            self.charlie
        }
    }

    struct FakeNetDb {
        known: std::collections::HashMap<RemoteHostId, RouterInfo>,
    }

    impl NetDb for FakeNetDb {
        fn lookup_local(&self, id: RemoteHostId) -> Option<RouterInfo> {
            self.known.get(&id).copied()
        }
    }

    struct NullSink;
    impl StatusSink for NullSink {
        fn report(&self, _outcome: TestOutcome) {}
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn payload(nonce: u32) -> TestPayload {
        TestPayload::without_endpoint([3; 32], nonce)
    }

    fn harness(
        charlie: Option<(RemoteHostId, RouterInfo)>,
    ) -> (Arc<FakeTransport>, Arc<TestResponder<FakeTransport, FakeNetDb>>) {
        let charlie_id = charlie.as_ref().map(|(id, _)| *id);
        let transport = Arc::new(FakeTransport {
            intro_key: [1; 32],
            charlie: charlie_id,
            sent: Mutex::new(Vec::new()),
        });
        let mut known = std::collections::HashMap::new();
        if let Some((id, info)) = charlie {
            known.insert(id, info);
        }
        let netdb = Arc::new(FakeNetDb { known });
        let ring = Arc::new(CharlieRing::new());
        let timer = Arc::new(TimerService::new());
        let initiator = Arc::new(TestInitiator::new(
            transport.clone(),
            timer.clone(),
            SharedClock::new(),
            Arc::new(crate::collab::SystemRandom),
            crate::config::Config::default(),
            Arc::new(NullSink),
        ));
        let responder = Arc::new(TestResponder::new(
            transport.clone(),
            netdb,
            ring,
            timer,
            initiator,
            LocalDuration::from_secs(10),
        ));
        (transport, responder)
    }

    #[test]
    fn bob_relays_to_charlie_and_acks_alice() {
        let charlie_id = RemoteHostId([7; 32]);
        let charlie_addr = addr(9000);
        let (transport, responder) = harness(Some((
            charlie_id,
            RouterInfo {
                addr: charlie_addr,
                intro_key: [8; 32],
            },
        )));

        responder.receive_test(addr(5000), payload(55));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, addr(5000), "alice gets told who charlie is");
        assert_eq!(sent[1].0, charlie_addr, "charlie gets the relay");
    }

    #[test]
    fn no_testing_peer_available_still_acks_alice_without_a_relay() {
        let (transport, responder) = harness(None);

        responder.receive_test(addr(5000), payload(66));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "alice still gets acked even with no charlie to relay to");
        assert_eq!(sent[0].0, addr(5000));
    }

    #[test]
    fn charlie_recruitment_registers_ring_and_replies_to_alice() {
        let (transport, responder) = harness(None);
        let alice = addr(6000);

        responder.receive_test(
            addr(7000), // Bob's address
            TestToCharlie::from(TestPayload::with_endpoint(alice, [9; 32], 77)).0,
        );

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, alice);
        assert!(responder.ring.contains(77));
    }

    #[test]
    fn direct_contact_from_alice_after_recruitment_replies_again() {
        let (transport, responder) = harness(None);
        let alice = addr(6000);

        responder.receive_test(
            addr(7000),
            TestToCharlie::from(TestPayload::with_endpoint(alice, [9; 32], 88)).0,
        );
        transport.sent.lock().unwrap().clear();

        responder.receive_test(alice, payload(88));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, alice);
    }

    #[test]
    fn recruitment_with_zero_port_is_dropped() {
        let (transport, responder) = harness(None);
        let mut malformed = addr(0);
        malformed.set_port(0);

        responder.receive_test(
            addr(7000),
            TestToCharlie::from(TestPayload::with_endpoint(malformed, [9; 32], 99)).0,
        );

        assert!(transport.sent.lock().unwrap().is_empty());
        assert!(!responder.ring.contains(99));
    }

    #[test]
    fn ipv4_mapped_ipv6_from_normalizes_to_match_ipv4_payload() {
        let (transport, responder) = harness(None);
        let v4 = Ipv4Addr::new(10, 0, 0, 1);
        let mapped_from = SocketAddr::new(IpAddr::V6(v4.to_ipv6_mapped()), 4000);

        // Payload carries the plain IPv4 address; `from` arrives as the
        // IPv4-mapped IPv6 form some sockets produce. Must still classify
        // as "sender is Alice" rather than "recruited as Charlie".
        responder.receive_test(
            mapped_from,
            TestPayload::with_endpoint(SocketAddr::new(IpAddr::V4(v4), 4000), [1; 32], 123),
        );

        // No testing peer configured, so Bob just acks `mapped_from`
        // directly -- critically, nothing was sent as if `mapped_from`
        // were a "recruited as Charlie" target.
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, mapped_from);
    }
}

#[cfg(test)]
impl From<TestPayload> for TestToCharlie {
    fn from(payload: TestPayload) -> Self {
        TestToCharlie(payload)
    }
}
