//! [`DatagramListener`] – background UDP receiver feeding the [`ChannelStore`].
//!
//! The listener owns a UDP socket configured with a receive timeout and runs
//! on its own thread for the lifetime of a capture session.  Each datagram is
//! decoded with [`decode_datagram`] and its well-formed channels are written
//! into the store in one batch.
//!
//! # Failure classes
//!
//! | Condition | Handling |
//! |---|---|
//! | receive timeout | not an error; re-check the running flag and loop |
//! | interrupted / ICMP reset or refused | logged at `warn`, loop continues |
//! | undecodable datagram | logged at `warn`, datagram dropped, loop continues |
//! | malformed value for one key | that key is skipped (`trace`) |
//! | any other socket error | logged at `error`, running flag cleared, returned as [`ListenerError::Fatal`] |
//!
//! The running flag is polled once per iteration.  A stopping session clears
//! the flag and then sends an empty datagram through a [`ListenerWaker`], so
//! the blocked receive returns at once instead of waiting out its timeout.
//! Empty datagrams are never decoded.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mocap_types::MocapError;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::codec::{DecodeError, decode_datagram};
use crate::store::ChannelStore;

/// Default UDP port the sensor device streams to.
pub const DEFAULT_PORT: u16 = 12345;

/// Largest datagram read in one receive; longer datagrams are truncated and
/// then fail to decode.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Default receive timeout; the loop re-checks its running flag at least
/// this often.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Socket settings for a [`DatagramListener`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    pub recv_timeout: Duration,
    pub max_datagram_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

/// Errors that can arise from setting up or running a listener.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to configure UDP socket: {0}")]
    Configure(io::Error),

    #[error("failed to spawn listener thread: {0}")]
    Spawn(io::Error),

    /// Carries the counters accumulated before the failure.
    #[error("fatal socket error: {source}")]
    Fatal {
        source: io::Error,
        stats: ListenerStats,
    },
}

impl From<ListenerError> for MocapError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Bind { addr, source } => MocapError::Bind {
                addr: addr.to_string(),
                details: source.to_string(),
            },
            ListenerError::Configure(e) => MocapError::Socket(e.to_string()),
            ListenerError::Spawn(e) => MocapError::Thread(e.to_string()),
            ListenerError::Fatal { source, .. } => MocapError::ListenerFault(source.to_string()),
        }
    }
}

/// Join handle of a spawned listener thread.
pub type ListenerHandle = JoinHandle<Result<ListenerStats, ListenerError>>;

/// Counters accumulated over a listener's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    /// Datagrams received, including ones that failed to decode.
    pub datagrams: u64,
    /// Channel samples written into the store.
    pub samples: u64,
    /// Individual keys dropped for having the wrong shape.
    pub skipped_entries: u64,
    /// Datagrams dropped as a whole.
    pub decode_errors: u64,
    /// Non-fatal socket errors.
    pub transient_errors: u64,
}

enum RecvFailure {
    Timeout,
    Transient(io::Error),
    Fatal(io::Error),
}

fn classify(err: io::Error) -> RecvFailure {
    match err.kind() {
        // Unix reports an expired SO_RCVTIMEO as WouldBlock, Windows as TimedOut.
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RecvFailure::Timeout,
        io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused => RecvFailure::Transient(err),
        _ if is_oversized_datagram(&err) => RecvFailure::Transient(err),
        _ => RecvFailure::Fatal(err),
    }
}

// Windows fails the receive with WSAEMSGSIZE instead of silently truncating.
#[cfg(windows)]
fn is_oversized_datagram(err: &io::Error) -> bool {
    err.raw_os_error() == Some(10040)
}

#[cfg(not(windows))]
fn is_oversized_datagram(_err: &io::Error) -> bool {
    false
}

// ────────────────────────────────────────────────────────────────────────────
// Datagram source
// ────────────────────────────────────────────────────────────────────────────

/// Where a [`DatagramListener`] receives from.  Implemented for
/// [`UdpSocket`]; a source must honour its own receive timeout.
pub trait DatagramSource: Send + 'static {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSource for UdpSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Unblocks a listener's pending receive by sending it an empty datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerWaker {
    target: SocketAddr,
}

impl ListenerWaker {
    /// Waker for a listener bound to `bound`.  A wildcard address is
    /// reached through the loopback interface of the same family.
    pub fn new(bound: SocketAddr) -> Self {
        let ip = match bound.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self {
            target: SocketAddr::new(ip, bound.port()),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one empty datagram to the listener.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the datagram could not be sent; the
    /// listener then exits on its next receive timeout instead.
    pub fn wake(&self) -> io::Result<()> {
        let any: IpAddr = match self.target {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(any, 0))?;
        socket.send_to(&[], self.target).map(|_| ())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Listener
// ────────────────────────────────────────────────────────────────────────────

/// UDP receiver that decodes telemetry datagrams into a [`ChannelStore`].
pub struct DatagramListener<S: DatagramSource = UdpSocket> {
    source: S,
    store: ChannelStore,
    running: Arc<AtomicBool>,
    max_datagram_size: usize,
    stats: ListenerStats,
}

impl DatagramListener<UdpSocket> {
    /// Bind the socket described by `config` and apply its receive timeout.
    ///
    /// The listener keeps looping while `running` is `true`; clearing the
    /// flag makes [`run`][Self::run] return on the next receive, which a
    /// [`ListenerWaker`] can force.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] if the address cannot be bound and
    /// [`ListenerError::Configure`] if the timeout is rejected (for example a
    /// zero duration).
    pub fn bind(
        config: &ListenerConfig,
        store: ChannelStore,
        running: Arc<AtomicBool>,
    ) -> Result<Self, ListenerError> {
        let socket = UdpSocket::bind(config.bind_addr).map_err(|source| ListenerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
        socket
            .set_read_timeout(Some(config.recv_timeout))
            .map_err(ListenerError::Configure)?;

        info!(
            addr = %config.bind_addr,
            timeout_ms = config.recv_timeout.as_millis() as u64,
            "UDP listener bound"
        );

        Ok(Self::from_source(socket, store, running, config.max_datagram_size))
    }
}

impl<S: DatagramSource> DatagramListener<S> {
    /// Wrap an already configured datagram source.
    pub fn from_source(
        source: S,
        store: ChannelStore,
        running: Arc<AtomicBool>,
        max_datagram_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            running,
            max_datagram_size,
            stats: ListenerStats::default(),
        }
    }

    /// Address the source is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.source.local_addr()
    }

    /// A [`ListenerWaker`] aimed at this listener.
    pub fn waker(&self) -> io::Result<ListenerWaker> {
        self.local_addr().map(ListenerWaker::new)
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ListenerStats {
        self.stats
    }

    /// Move the listener onto a dedicated, named thread.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Spawn`] if the OS refuses to create the
    /// thread.
    pub fn spawn(self) -> Result<ListenerHandle, ListenerError> {
        thread::Builder::new()
            .name("mocap-udp-listener".to_owned())
            .spawn(move || self.run())
            .map_err(ListenerError::Spawn)
    }

    /// Run the receive loop on the current thread until the running flag is
    /// cleared or a fatal socket error occurs.  The socket is closed when
    /// this returns.
    pub fn run(mut self) -> Result<ListenerStats, ListenerError> {
        info!("UDP listener started");
        let mut buffer = vec![0u8; self.max_datagram_size];

        while self.running.load(Ordering::Acquire) {
            let (len, peer) = match self.source.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(e) => match classify(e) {
                    RecvFailure::Timeout => continue,
                    RecvFailure::Transient(e) => {
                        self.stats.transient_errors += 1;
                        warn!(error = %e, "UDP receive error; continuing");
                        continue;
                    }
                    RecvFailure::Fatal(e) => {
                        error!(error = %e, "UDP listener stopping on fatal socket error");
                        self.running.store(false, Ordering::Release);
                        return Err(ListenerError::Fatal {
                            source: e,
                            stats: self.stats,
                        });
                    }
                },
            };

            if len == 0 {
                trace!(%peer, "empty datagram");
                continue;
            }

            if let Err(e) = self.ingest(&buffer[..len]) {
                warn!(%peer, bytes = len, error = %e, "dropping undecodable datagram");
            }
        }

        info!(
            datagrams = self.stats.datagrams,
            samples = self.stats.samples,
            decode_errors = self.stats.decode_errors,
            "UDP listener stopped"
        );
        Ok(self.stats)
    }

    /// Decode one datagram payload and write its channels into the store.
    ///
    /// Returns the number of channels written.
    ///
    /// # Errors
    ///
    /// Returns the [`DecodeError`] when the payload is dropped as a whole;
    /// the store is left untouched in that case.
    pub fn ingest(&mut self, payload: &[u8]) -> Result<usize, DecodeError> {
        self.stats.datagrams += 1;
        let decoded = match decode_datagram(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.decode_errors += 1;
                return Err(e);
            }
        };

        for key in &decoded.skipped {
            trace!(channel = %key, "skipping malformed channel value");
        }
        self.stats.skipped_entries += decoded.skipped.len() as u64;

        let written = self.store.put_many(decoded.samples);
        self.stats.samples += written as u64;
        debug!(written, skipped = decoded.skipped.len(), "datagram ingested");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_types::ChannelSample;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    fn loopback_config() -> ListenerConfig {
        ListenerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            recv_timeout: Duration::from_millis(20),
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn default_config_matches_wire_protocol() {
        let cfg = ListenerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 12345);
        assert!(cfg.bind_addr.ip().is_unspecified());
        assert_eq!(cfg.recv_timeout, Duration::from_secs(1));
        assert_eq!(cfg.max_datagram_size, 1024);
    }

    #[test]
    fn ingest_writes_valid_and_skips_invalid_entries() {
        let store = ChannelStore::new();
        store.put("other", ChannelSample::new(7.0, 7.0, 7.0));
        let running = Arc::new(AtomicBool::new(true));
        let mut listener =
            DatagramListener::bind(&loopback_config(), store.clone(), running).unwrap();

        let written = listener
            .ingest(br#"{"head":[10,20,30],"bad":[1,2],"other":"x"}"#)
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.get("head"), Some(ChannelSample::new(10.0, 20.0, 30.0)));
        // A malformed value for a key leaves the previous sample in place.
        assert_eq!(store.get("other"), Some(ChannelSample::new(7.0, 7.0, 7.0)));
        assert!(store.get("bad").is_none());

        let stats = listener.stats();
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.skipped_entries, 2);
    }

    #[test]
    fn ingest_invalid_json_leaves_store_untouched() {
        let store = ChannelStore::new();
        store.put("head", ChannelSample::new(1.0, 1.0, 1.0));
        let running = Arc::new(AtomicBool::new(true));
        let mut listener =
            DatagramListener::bind(&loopback_config(), store.clone(), running).unwrap();

        assert!(listener.ingest(b"not json").is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(listener.stats().decode_errors, 1);
    }

    #[test]
    fn bind_conflict_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let config = ListenerConfig {
            bind_addr: taken.local_addr().unwrap(),
            ..loopback_config()
        };
        let running = Arc::new(AtomicBool::new(true));
        let result = DatagramListener::bind(&config, ChannelStore::new(), running);
        let err = result.err().expect("second bind on the same port must fail");
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(matches!(MocapError::from(err), MocapError::Bind { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ListenerConfig {
            recv_timeout: Duration::ZERO,
            ..loopback_config()
        };
        let running = Arc::new(AtomicBool::new(true));
        let result = DatagramListener::bind(&config, ChannelStore::new(), running);
        assert!(matches!(result, Err(ListenerError::Configure(_))));
    }

    #[test]
    fn receives_datagrams_and_stops_on_flag() {
        let store = ChannelStore::new();
        let running = Arc::new(AtomicBool::new(true));
        let listener =
            DatagramListener::bind(&loopback_config(), store.clone(), Arc::clone(&running))
                .unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = listener.spawn().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"garbage", addr).unwrap();
        sender.send_to(br#"{"marker1":[1.5,-2.0,0.0]}"#, addr).unwrap();

        assert!(wait_until(|| store.get("marker1").is_some()));
        assert_eq!(store.get("marker1"), Some(ChannelSample::new(1.5, -2.0, 0.0)));

        let stop_requested = Instant::now();
        running.store(false, Ordering::Release);
        let stats = handle.join().unwrap().unwrap();
        assert!(stop_requested.elapsed() < Duration::from_secs(1));
        assert_eq!(stats.datagrams, 2);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.samples, 1);
    }

    #[test]
    fn socket_is_released_after_run_returns() {
        let running = Arc::new(AtomicBool::new(false));
        let listener =
            DatagramListener::bind(&loopback_config(), ChannelStore::new(), running).unwrap();
        let addr = listener.local_addr().unwrap();
        listener.run().unwrap();

        // The port can be bound again once the listener is gone.
        assert!(UdpSocket::bind(addr).is_ok());
    }

    #[test]
    fn classify_error_kinds() {
        let kind = |k: io::ErrorKind| classify(io::Error::from(k));
        assert!(matches!(kind(io::ErrorKind::WouldBlock), RecvFailure::Timeout));
        assert!(matches!(kind(io::ErrorKind::TimedOut), RecvFailure::Timeout));
        assert!(matches!(
            kind(io::ErrorKind::ConnectionReset),
            RecvFailure::Transient(_)
        ));
        assert!(matches!(kind(io::ErrorKind::Interrupted), RecvFailure::Transient(_)));
        assert!(matches!(kind(io::ErrorKind::NotConnected), RecvFailure::Fatal(_)));
    }

    /// Replays a fixed list of receive results, then reports a fatal error.
    struct ScriptedSource {
        script: Mutex<VecDeque<io::Result<Vec<u8>>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    impl DatagramSource for ScriptedSource {
        fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let next = self.script.lock().unwrap().pop_front();
            let payload = next.unwrap_or_else(|| Err(io::ErrorKind::NotConnected.into()))?;
            buf[..payload.len()].copy_from_slice(&payload);
            Ok((payload.len(), SocketAddr::from(([127, 0, 0, 1], 9000))))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 9)))
        }
    }

    #[test]
    fn fatal_error_clears_flag_and_keeps_stats() {
        let store = ChannelStore::new();
        let running = Arc::new(AtomicBool::new(true));
        let source = ScriptedSource::new(vec![
            Ok(br#"{"head":[1,2,3]}"#.to_vec()),
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::ErrorKind::ConnectionReset.into()),
        ]);
        let listener =
            DatagramListener::from_source(source, store.clone(), Arc::clone(&running), 1024);

        let err = listener.run().unwrap_err();

        assert!(!running.load(Ordering::Acquire));
        let ListenerError::Fatal { source, stats } = err else {
            panic!("expected a fatal error");
        };
        assert_eq!(source.kind(), io::ErrorKind::NotConnected);
        assert_eq!(stats.datagrams, 1);
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.transient_errors, 1);
        assert_eq!(store.get("head"), Some(ChannelSample::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn fatal_error_maps_to_listener_fault() {
        let err = ListenerError::Fatal {
            source: io::ErrorKind::NotConnected.into(),
            stats: ListenerStats::default(),
        };
        assert!(matches!(MocapError::from(err), MocapError::ListenerFault(_)));
    }

    #[test]
    fn empty_datagrams_are_ignored() {
        let running = Arc::new(AtomicBool::new(true));
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let listener = DatagramListener::from_source(source, ChannelStore::new(), running, 1024);

        let Err(ListenerError::Fatal { stats, .. }) = listener.run() else {
            panic!("scripted source ends with a fatal error");
        };
        assert_eq!(stats, ListenerStats::default());
    }

    #[test]
    fn waker_targets_loopback_for_wildcard_bind() {
        let v4 = ListenerWaker::new(SocketAddr::from(([0, 0, 0, 0], 12345)));
        assert_eq!(v4.target(), SocketAddr::from(([127, 0, 0, 1], 12345)));

        let v6 = ListenerWaker::new("[::]:4000".parse().unwrap());
        assert_eq!(v6.target(), "[::1]:4000".parse::<SocketAddr>().unwrap());

        let specific = SocketAddr::from(([192, 168, 1, 20], 5000));
        assert_eq!(ListenerWaker::new(specific).target(), specific);
    }

    #[test]
    fn wake_unblocks_long_receive() {
        let config = ListenerConfig {
            recv_timeout: Duration::from_secs(5),
            ..loopback_config()
        };
        let running = Arc::new(AtomicBool::new(true));
        let listener =
            DatagramListener::bind(&config, ChannelStore::new(), Arc::clone(&running)).unwrap();
        let waker = listener.waker().unwrap();
        let handle = listener.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));

        let stop_requested = Instant::now();
        running.store(false, Ordering::Release);
        waker.wake().unwrap();
        let stats = handle.join().unwrap().unwrap();

        assert!(stop_requested.elapsed() < Duration::from_secs(1));
        assert_eq!(stats.datagrams, 0);
    }
}
