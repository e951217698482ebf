//! [`SessionController`] – start/stop state machine for a capture session.
//!
//! ```text
//!   Idle ──start()──▶ Capturing ──stop()──▶ Idle
//! ```
//!
//! A session owns three things: the listener thread (and through it the
//! UDP socket), the registered sample tick, and the active flag both of
//! them poll.  `start` acquires them in that order and `stop` releases them
//! in reverse: clear the flag, unregister the tick, wake and join the
//! listener.  The wake datagram unblocks the pending receive, so `stop`
//! returns promptly and the socket is closed by then; the port can be
//! rebound immediately.
//!
//! Redundant commands are not errors: `start` while capturing reports
//! [`CommandStatus::AlreadyCapturing`] and `stop` while idle reports
//! [`CommandStatus::AlreadyIdle`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mocap_host::{SceneGraph, TimerHandle, TimerHost};
use mocap_middleware::listener::{DEFAULT_PORT, DEFAULT_RECV_TIMEOUT, MAX_DATAGRAM_SIZE};
use mocap_middleware::{
    ChannelStore, DatagramListener, DatagramSource, ListenerConfig, ListenerError, ListenerHandle,
    ListenerStats, ListenerWaker,
};
use mocap_types::{CommandStatus, MocapError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::scheduler::{DEFAULT_SAMPLE_INTERVAL, FrameClock, SampleScheduler};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for a [`SessionController`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Interface to bind (default `0.0.0.0`).
    pub bind_ip: IpAddr,
    /// UDP port (default 12345); `0` picks an ephemeral port.
    pub port: u16,
    /// Socket receive timeout; bounds `stop` latency if the wake datagram
    /// is lost.
    pub recv_timeout: Duration,
    /// Sample tick period.
    pub sample_interval: Duration,
    /// Receive buffer size in bytes.
    pub max_datagram_size: usize,
    /// Empty the channel store when a session starts.
    pub clear_store_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            clear_store_on_start: true,
        }
    }
}

impl SessionConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// # Errors
    ///
    /// Returns [`MocapError::Config`] for a zero receive timeout, a zero
    /// sample interval or a zero datagram size.
    pub fn validate(&self) -> Result<(), MocapError> {
        if self.recv_timeout.is_zero() {
            return Err(MocapError::Config("recv_timeout must be non-zero".into()));
        }
        if self.sample_interval.is_zero() {
            return Err(MocapError::Config("sample_interval must be non-zero".into()));
        }
        if self.max_datagram_size == 0 {
            return Err(MocapError::Config("max_datagram_size must be non-zero".into()));
        }
        Ok(())
    }

    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: self.bind_addr(),
            recv_timeout: self.recv_timeout,
            max_datagram_size: self.max_datagram_size,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Session state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
}

/// Identity of a running capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Host frame at the moment capture started.
    pub base_frame: i64,
    /// Address the listener actually bound.
    pub local_addr: SocketAddr,
}

struct ActiveSession {
    info: SessionInfo,
    running: Arc<AtomicBool>,
    listener: ListenerHandle,
    waker: ListenerWaker,
    timer: TimerHandle,
}

/// Owns the capture session lifecycle and the channel store it feeds.
pub struct SessionController {
    config: SessionConfig,
    store: ChannelStore,
    active: Option<ActiveSession>,
    last_stats: Option<ListenerStats>,
}

impl SessionController {
    /// # Errors
    ///
    /// Returns [`MocapError::Config`] if `config` fails validation.
    pub fn new(config: SessionConfig) -> Result<Self, MocapError> {
        config.validate()?;
        Ok(Self {
            config,
            store: ChannelStore::new(),
            active: None,
            last_stats: None,
        })
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Capturing
        } else {
            SessionState::Idle
        }
    }

    /// The running session, if any.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|s| &s.info)
    }

    /// Listener address of the running session.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session().map(|s| s.local_addr)
    }

    /// `false` once a capturing session's listener has exited on its own
    /// (fatal socket error).  The fault is reported by the next `stop`.
    pub fn listener_healthy(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::Acquire) && !s.listener.is_finished())
    }

    /// The channel store shared with the listener and the sample tick.
    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    /// Counters from the most recently stopped session, including one that
    /// ended on a listener fault.
    pub fn last_listener_stats(&self) -> Option<ListenerStats> {
        self.last_stats
    }

    /// Begin capturing.
    ///
    /// Binds the UDP socket, clears the channel store (unless disabled),
    /// records the host's current frame as the session's base frame, starts
    /// the listener thread and registers the sample tick with `timers`.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::Bind`] / [`MocapError::Socket`] if the socket
    /// cannot be set up and [`MocapError::Thread`] if the listener thread
    /// cannot be spawned.  The controller stays idle and nothing is
    /// registered with the host in every error case.
    pub fn start(
        &mut self,
        scene: &dyn SceneGraph,
        timers: &mut dyn TimerHost,
    ) -> Result<CommandStatus, MocapError> {
        if let Some(session) = &self.active {
            warn!(session = %session.info.id, "capture already running");
            return Ok(CommandStatus::AlreadyCapturing);
        }

        let running = Arc::new(AtomicBool::new(false));
        let listener = DatagramListener::bind(
            &self.config.listener_config(),
            self.store.clone(),
            Arc::clone(&running),
        )
        .inspect_err(|e| error!(error = %e, "capture start failed"))?;
        self.launch(listener, running, scene, timers)
    }

    /// Everything in `start` after the listener exists.  `running` must be
    /// the flag `listener` polls.
    fn launch<S: DatagramSource>(
        &mut self,
        listener: DatagramListener<S>,
        running: Arc<AtomicBool>,
        scene: &dyn SceneGraph,
        timers: &mut dyn TimerHost,
    ) -> Result<CommandStatus, MocapError> {
        let waker = listener
            .waker()
            .map_err(|e| MocapError::Socket(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MocapError::Socket(e.to_string()))?;

        if self.config.clear_store_on_start {
            self.store.clear();
        }

        running.store(true, Ordering::Release);
        let base_frame = scene.current_frame();
        let start = Instant::now();
        let handle = listener.spawn().inspect_err(|e| {
            error!(error = %e, "capture start failed");
            running.store(false, Ordering::Release);
        })?;

        let clock = FrameClock::new(base_frame, start, self.config.sample_interval);
        let scheduler = SampleScheduler::new(clock, self.store.clone(), Arc::clone(&running));
        let timer = timers.register(scheduler.into_callback(), self.config.sample_interval);

        let info = SessionInfo {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            base_frame,
            local_addr,
        };
        info!(
            session = %info.id,
            %local_addr,
            base_frame,
            interval_ms = self.config.sample_interval.as_millis() as u64,
            "capture started"
        );

        self.active = Some(ActiveSession {
            info,
            running,
            listener: handle,
            waker,
            timer,
        });
        Ok(CommandStatus::Started)
    }

    /// End the running capture.
    ///
    /// Wakes the listener and returns after its thread has exited and its
    /// socket is closed.  The controller is idle afterwards whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns [`MocapError::ListenerFault`] when the listener had already
    /// stopped on a fatal socket error, and [`MocapError::Thread`] if the
    /// listener thread panicked.
    pub fn stop(&mut self, timers: &mut dyn TimerHost) -> Result<CommandStatus, MocapError> {
        let Some(session) = self.active.take() else {
            debug!("no capture running");
            return Ok(CommandStatus::AlreadyIdle);
        };

        session.running.store(false, Ordering::Release);
        if !timers.unregister(session.timer) {
            debug!(session = %session.info.id, "sample tick had already deregistered");
        }

        if !session.listener.is_finished()
            && let Err(e) = session.waker.wake()
        {
            debug!(error = %e, "listener wake failed; waiting for receive timeout");
        }

        let joined = session.listener.join();
        let elapsed_ms = (Utc::now() - session.info.started_at).num_milliseconds();
        match joined {
            Ok(Ok(stats)) => {
                self.last_stats = Some(stats);
                info!(
                    session = %session.info.id,
                    elapsed_ms,
                    datagrams = stats.datagrams,
                    samples = stats.samples,
                    decode_errors = stats.decode_errors,
                    "capture stopped"
                );
                Ok(CommandStatus::Stopped)
            }
            Ok(Err(ListenerError::Fatal { source, stats })) => {
                self.last_stats = Some(stats);
                error!(
                    session = %session.info.id,
                    elapsed_ms,
                    error = %source,
                    datagrams = stats.datagrams,
                    "capture ended by listener fault"
                );
                Err(MocapError::ListenerFault(source.to_string()))
            }
            Ok(Err(e)) => {
                error!(session = %session.info.id, error = %e, "listener exited with an error");
                Err(e.into())
            }
            Err(_) => {
                error!(session = %session.info.id, "listener thread panicked");
                Err(MocapError::Thread("listener thread panicked".into()))
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // The listener thread is detached; the host drops the tick on its
        // next invocation.
        if let Some(session) = &self.active {
            session.running.store(false, Ordering::Release);
            let _ = session.waker.wake();
        }
    }
}
