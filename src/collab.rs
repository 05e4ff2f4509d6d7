//! Contracts for the systems this subsystem depends on but does not
//! implement (base spec §1, §6): UDP transport and intro-key store, netDB
//! lookup, and randomness. Production code wires real implementations of
//! these; tests wire the mocks in `src/test/mock.rs`.

use std::net::SocketAddr;

use crate::message::IntroKey;

/// A capability a peer may advertise in its router descriptor. The base
/// spec names exactly one use of this (§4.2b, Bob picking a test-capable
/// peer to act as Charlie); kept as an enum rather than a bare bool so a
/// future capability doesn't need a new collaborator method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Testing,
}

/// Identifies a remote host independent of its current transport endpoint
/// (base spec §6's `router_id`), used both as the netDB lookup key and to
/// tag a completed test's outcome with the peer it was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteHostId(pub [u8; 32]);

/// The address and intro key a netDB lookup resolves a router id to (base
/// spec §6, `RouterInfo`). A real implementation also carries the
/// session's established cipher/MAC keys when one exists; those never
/// surface here because `Transport::send` is the seam that picks the
/// right key for a given destination (base spec §1, Non-goals: encrypted
/// session establishment is out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterInfo {
    pub addr: SocketAddr,
    pub intro_key: IntroKey,
}

/// Sends datagrams on behalf of the reachability-test and IV-validation
/// logic. The actual socket, fragmentation, and session encryption are out
/// of scope (base spec §1, Non-goals) -- this trait is the seam.
pub trait Transport {
    fn send(&self, to: SocketAddr, payload: &[u8]);

    /// The intro key this node advertises for itself, handed to peers we
    /// ask to relay a reachability probe on our behalf.
    fn get_intro_key(&self) -> IntroKey;

    /// Selects a session-established peer advertising `capability`, used by
    /// Bob to pick a Charlie candidate (base spec §4.2b). Returns `None` if
    /// no such peer is currently known.
    fn get_peer_state(&self, capability: Capability) -> Option<RemoteHostId>;
}

/// Looks up locally known router information by remote host id. NetDB
/// resolution internals are out of scope (base spec §1, Non-goals); only
/// the lookup contract matters here.
pub trait NetDb {
    fn lookup_local(&self, id: RemoteHostId) -> Option<RouterInfo>;
}

/// A source of uniform randomness, used to pick a fresh test nonce (base
/// spec §3: "uniformly random over [0, 2^32-1]").
pub trait Random {
    /// A value uniformly distributed over `[0, max]`.
    fn next_u32(&self, max: u32) -> u32;
}

/// Normalizes an address representation before structural comparison (base
/// spec §9: "implementations must normalize address representations, e.g.
/// IPv4-mapped IPv6, before comparison, otherwise legitimate replies will be
/// misclassified"). Shared by the responder's Alice-vs-Bob/Charlie dispatch
/// and the initiator's Bob-vs-Charlie reply correlation, since both compare
/// a `SocketAddr` a peer sent against one observed from `recv_from`.
pub fn normalize(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(v4.into(), addr.port()),
            None => addr,
        },
        SocketAddr::V4(_) => addr,
    }
}

/// The production [`Random`], backed by the process-global PRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl Random for SystemRandom {
    fn next_u32(&self, max: u32) -> u32 {
        fastrand::u32(0..=max)
    }
}
