//! Demo binary wiring the reachability-test and IV-validation cores
//! (`reach::prelude`) against a real UDP socket.
//!
//! Per base spec §1, the UDP socket's session encryption and the netDB's
//! resolution internals are external collaborators this subsystem does not
//! implement. This binary fills those seams with a bare, unencrypted socket
//! and a tiny in-memory router table so the state machine can be driven end
//! to end over loopback -- it is explicitly not a rendition of the
//! surrounding anonymizing overlay transport.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use crossbeam_channel as chan;

use reach::collab::{Capability, NetDb, RemoteHostId, RouterInfo, SystemRandom, Transport};
use reach::config::Config;
use reach::message::IntroKey;
use reach::runtime::{remote_host_id_for, Runtime};
use reach::status::LoggingSink;
use reach::{logger, signals};

pub const NAME: &str = "reach";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP_MSG: &str = r#"
Usage

   reach --listen <address> [<option>...]

   Runs the peer-reachability-test responder (Bob/Charlie roles) on
   <address>. Pass --run-test to also kick off a test as Alice once the
   responder is up.

Options

    --config          <path>      Config file to use (JSON; falls back to built-in defaults)
    --listen          <address>   Address to bind the test socket to (required)
    --testing-peer    <address>   A peer to advertise as testing-capable when acting as Bob
    --run-test        <address>   Bob's address: immediately run a reachability test against it
    --run-test-key    <hex32>     Bob's intro key for --run-test, as 64 hex characters
    --verbose                     Enable debug logging
    --version                     Print version
    --help                        Print help
"#;

#[derive(Debug)]
struct Options {
    listen: SocketAddr,
    config: Option<PathBuf>,
    testing_peer: Option<SocketAddr>,
    run_test: Option<SocketAddr>,
    run_test_key: Option<IntroKey>,
    verbose: bool,
}

impl Options {
    fn from_env() -> anyhow::Result<Self> {
        use lexopt::prelude::*;

        let mut parser = lexopt::Parser::from_env();
        let mut listen = None;
        let mut config = None;
        let mut testing_peer = None;
        let mut run_test = None;
        let mut run_test_key = None;
        let mut verbose = false;

        while let Some(arg) = parser.next()? {
            match arg {
                Long("listen") => {
                    listen = Some(parser.value()?.parse::<SocketAddr>()?);
                }
                Long("config") => {
                    config = Some(PathBuf::from(parser.value()?));
                }
                Long("testing-peer") => {
                    testing_peer = Some(parser.value()?.parse::<SocketAddr>()?);
                }
                Long("run-test") => {
                    run_test = Some(parser.value()?.parse::<SocketAddr>()?);
                }
                Long("run-test-key") => {
                    let hex: String = parser.value()?.parse()?;
                    run_test_key = Some(parse_hex_key(&hex)?);
                }
                Long("verbose") => verbose = true,
                Long("help") | Short('h') => {
                    println!("{HELP_MSG}");
                    process::exit(0);
                }
                Long("version") => {
                    println!("{NAME} {VERSION}");
                    process::exit(0);
                }
                _ => anyhow::bail!(arg.unexpected()),
            }
        }

        Ok(Self {
            listen: listen.context("--listen <address> is required")?,
            config,
            testing_peer,
            run_test,
            run_test_key,
            verbose,
        })
    }
}

fn parse_hex_key(hex: &str) -> anyhow::Result<IntroKey> {
    anyhow::ensure!(hex.len() == 64, "intro key must be 64 hex characters (32 bytes)");

    let mut key = [0u8; 32];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).context("invalid hex digit")?;
    }
    Ok(key)
}

fn random_intro_key() -> IntroKey {
    let mut key = [0u8; 32];
    for byte in key.iter_mut() {
        *byte = fastrand::u8(..);
    }
    key
}

/// Maps router ids to addresses and intro keys. Real netDB resolution is out
/// of scope (base spec §1, Non-goals); this is just enough to let Bob find
/// the one advertised testing-capable peer.
struct StaticNetDb(Mutex<HashMap<RemoteHostId, RouterInfo>>);

impl StaticNetDb {
    fn new() -> Self {
        Self(Mutex::new(HashMap::new()))
    }

    fn register(&self, id: RemoteHostId, info: RouterInfo) {
        self.0.lock().unwrap().insert(id, info);
    }
}

impl NetDb for StaticNetDb {
    fn lookup_local(&self, id: RemoteHostId) -> Option<RouterInfo> {
        self.0.lock().unwrap().get(&id).copied()
    }
}

/// A bare UDP socket, a locally generated intro key, and an optionally
/// advertised testing-capable peer. Envelope encryption of outgoing
/// datagrams is out of scope (base spec §1) -- this demo sends the
/// reachability-test payload unencrypted, which only matters for driving
/// the state machine, not for the wire privacy the real transport provides.
struct UdpTransport {
    socket: UdpSocket,
    intro_key: IntroKey,
    testing_peer: Mutex<Option<RemoteHostId>>,
}

impl Transport for UdpTransport {
    fn send(&self, to: SocketAddr, payload: &[u8]) {
        if let Err(err) = self.socket.send_to(payload, to) {
            log::warn!(target: "peertest", "send to {to} failed: {err}");
        }
    }

    fn get_intro_key(&self) -> IntroKey {
        self.intro_key
    }

    fn get_peer_state(&self, capability: Capability) -> Option<RemoteHostId> {
        match capability {
            Capability::Testing => *self.testing_peer.lock().unwrap(),
        }
    }
}

fn execute() -> anyhow::Result<()> {
    let options = Options::from_env()?;
    logger::init(if options.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })?;

    log::info!(target: "peertest", "starting {NAME} {VERSION}");

    let config = match &options.config {
        Some(path) => Config::load(path).context("failed to load --config")?,
        None => Config::default(),
    };

    let reader_socket = UdpSocket::bind(options.listen).context("failed to bind --listen address")?;
    let sender_socket = reader_socket
        .try_clone()
        .context("failed to clone listening socket")?;
    log::info!(target: "peertest", "listening on {}", reader_socket.local_addr()?);

    let netdb = Arc::new(StaticNetDb::new());
    let transport = Arc::new(UdpTransport {
        socket: sender_socket,
        intro_key: random_intro_key(),
        testing_peer: Mutex::new(None),
    });

    if let Some(peer_addr) = options.testing_peer {
        let peer_id = remote_host_id_for(peer_addr);
        *transport.testing_peer.lock().unwrap() = Some(peer_id);
        netdb.register(
            peer_id,
            RouterInfo {
                addr: peer_addr,
                intro_key: random_intro_key(),
            },
        );
        log::info!(target: "peertest", "advertising {peer_addr} as testing-capable");
    }

    let (notify, shutdown) = chan::bounded(1);
    signals::install(notify)?;

    let runtime = Runtime::init(
        reader_socket,
        transport,
        netdb,
        Arc::new(SystemRandom),
        config,
        Arc::new(LoggingSink),
        shutdown,
    )?;

    if let Some(bob) = options.run_test {
        let bob_id = remote_host_id_for(bob);
        let bob_key = options.run_test_key.unwrap_or_else(random_intro_key);
        let nonce = runtime
            .initiator
            .run_test(bob_id, bob, bob_key)
            .context("a test is already in flight")?;
        log::info!(target: "peertest", "started reachability test {nonce} via bob at {bob}");
    }

    runtime.join();
    Ok(())
}

fn main() {
    if let Err(err) = execute() {
        log::error!(target: "peertest", "fatal: {err:#}");
        process::exit(1);
    }
}
