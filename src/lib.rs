#![allow(dead_code)]
pub mod clock;
pub mod collab;
pub mod config;
pub mod initiator;
pub mod iv;
pub mod logger;
pub mod message;
pub mod responder;
pub mod ring;
pub mod runtime;
pub mod signals;
pub mod status;
#[cfg(test)]
pub mod test;
pub mod timer;
pub mod wire;

pub use runtime::Runtime;

pub mod prelude {
    pub use crate::clock::{LocalDuration, LocalTime, SharedClock, Timestamp};
    pub use crate::collab::{Capability, NetDb, Random, RemoteHostId, RouterInfo, SystemRandom, Transport};
    pub use crate::config::Config;
    pub use crate::initiator::TestInitiator;
    pub use crate::iv::{DecayingMembership, IvValidator};
    pub use crate::message::{IntroKey, Nonce, TestPayload};
    pub use crate::responder::TestResponder;
    pub use crate::ring::CharlieRing;
    pub use crate::status::{ReachabilityStatus, StatusSink, TestOutcome};
}
