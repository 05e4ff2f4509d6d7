//! Tunables for the reachability test and IV replay filter, with defaults
//! matching the concrete numbers named in the base spec (§5, §6).

use serde::Deserialize;

use crate::clock::LocalDuration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often Alice retransmits `TestFromAlice` while waiting for a reply.
    #[serde(with = "duration_millis")]
    pub retransmit_interval: LocalDuration,
    /// Overall time budget for a single test before giving up.
    #[serde(with = "duration_millis")]
    pub test_deadline: LocalDuration,
    /// How long a Charlie-ring entry is kept before it's treated as expired.
    #[serde(with = "duration_millis")]
    pub charlie_entry_lifetime: LocalDuration,
    /// Half-life of the IV replay filter's decaying membership.
    #[serde(with = "duration_millis")]
    pub iv_halflife: LocalDuration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retransmit_interval: LocalDuration::from_secs(5),
            test_deadline: LocalDuration::from_secs(30),
            charlie_entry_lifetime: LocalDuration::from_secs(10),
            iv_halflife: LocalDuration::from_millis(600_000),
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        let config = serde_json::from_slice(&bytes)?;

        Ok(config)
    }
}

/// `serde` (de)serializes [`LocalDuration`] as a millisecond count, since it
/// has no `Serialize`/`Deserialize` impl of its own.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::clock::LocalDuration;

    pub fn serialize<S: Serializer>(d: &LocalDuration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<LocalDuration, D::Error> {
        let millis = u128::deserialize(d)?;
        Ok(LocalDuration::from_millis(millis))
    }
}
