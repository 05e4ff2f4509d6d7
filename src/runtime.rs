//! Wires the reachability-test and IV-validation cores together behind a
//! real UDP socket, following the teacher's `Runtime` pattern of owning the
//! worker threads and exposing a blocking `run()`. Unlike the teacher, there
//! is no reactor/worker-pool here: the socket only needs one reader thread
//! (base spec §5), so a plain blocking `recv_from` loop on a labeled OS
//! thread is enough.

pub mod thread;

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crossbeam_channel as chan;

use crate::clock::SharedClock;
use crate::collab::{NetDb, Random, RemoteHostId, Transport};
use crate::config::Config;
use crate::initiator::TestInitiator;
use crate::message::{PacketReader, TestPayload};
use crate::responder::TestResponder;
use crate::ring::CharlieRing;
use crate::status::StatusSink;
use crate::timer::TimerService;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the socket reader thread and the two role components (Alice-role
/// [`TestInitiator`], Bob/Charlie-role [`TestResponder`]) that share it.
pub struct Runtime<T: Transport, D: NetDb> {
    pub initiator: Arc<TestInitiator<T>>,
    pub responder: Arc<TestResponder<T, D>>,
    reader: Option<std::thread::JoinHandle<()>>,
}

impl<T, D> Runtime<T, D>
where
    T: Transport + Send + Sync + 'static,
    D: NetDb + Send + Sync + 'static,
{
    /// Bind `socket` and start the reader thread. `shutdown` is checked
    /// between reads so the caller can stop the loop from the signal
    /// handler (see `src/signals.rs`), the same way the teacher's runtime
    /// reacts to its own shutdown channel.
    pub fn init(
        socket: UdpSocket,
        transport: Arc<T>,
        netdb: Arc<D>,
        random: Arc<dyn Random + Send + Sync>,
        config: Config,
        sink: Arc<dyn StatusSink>,
        shutdown: chan::Receiver<()>,
    ) -> Result<Self, Error> {
        let clock = SharedClock::new();
        let timer = Arc::new(TimerService::new());
        let ring = Arc::new(CharlieRing::new());

        let initiator = Arc::new(TestInitiator::new(
            transport.clone(),
            timer.clone(),
            clock.clone(),
            random,
            config.clone(),
            sink,
        ));
        let responder = Arc::new(TestResponder::new(
            transport,
            netdb,
            ring,
            timer,
            initiator.clone(),
            config.charlie_entry_lifetime,
        ));

        socket.set_read_timeout(Some(std::time::Duration::from_millis(200)))?;

        let reader = {
            let responder = responder.clone();

            thread::spawn("reach", "reader", move || {
                Self::read_loop(socket, responder, clock, shutdown)
            })
        };

        Ok(Self {
            initiator,
            responder,
            reader: Some(reader),
        })
    }

    /// Blocks on `recv_from` (bounded by the socket's 200ms read timeout)
    /// and ticks `clock` once per iteration, whether or not a datagram
    /// arrived -- this is the only place production code advances
    /// [`SharedClock`] to the current wall-clock time, so the overall test
    /// deadline (base spec §4.1) and the IV filter's decay rotation (§4.3)
    /// both depend on this loop actually running.
    fn read_loop(
        socket: UdpSocket,
        responder: Arc<TestResponder<T, D>>,
        clock: SharedClock,
        shutdown: chan::Receiver<()>,
    ) {
        let mut buf = [0u8; 512];

        loop {
            if shutdown.try_recv().is_ok() {
                log::info!(target: "peertest", "reader thread shutting down");
                return;
            }

            let (len, from) = match socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    clock.tick();
                    continue;
                }
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                    clock.tick();
                    continue;
                }
                Err(err) => {
                    log::error!(target: "peertest", "socket read error: {err}");
                    return;
                }
            };

            clock.tick();
            Self::dispatch(&responder, from, &buf[..len]);
        }
    }

    fn dispatch(responder: &Arc<TestResponder<T, D>>, from: SocketAddr, bytes: &[u8]) {
        let msg = match PacketReader::read::<TestPayload>(bytes) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!(target: "peertest", "dropping malformed packet from {from}: {err}");
                return;
            }
        };

        responder.receive_test(from, msg);
    }

    pub fn join(mut self) {
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

/// Derives a stand-in peer identity from a socket address, for the demo
/// binary only. Real deployments identify a peer by its session's public
/// key, established well below this subsystem (base spec §1, Non-goals);
/// the demo has no such session layer, so it hashes the endpoint instead.
pub fn remote_host_id_for(addr: SocketAddr) -> RemoteHostId {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    addr.hash(&mut hasher);
    let digest = hasher.finish().to_be_bytes();

    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&digest);
    RemoteHostId(id)
}
