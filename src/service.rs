//! The showtime service: cue ingestion, periodic ticks and announcement fan-out.

use crate::config::ServiceConfig;
use crate::error::{Result, ShowtimeError};
use crate::history::CueHistory;
use crate::subscriptions::{SubscriptionHandle, SubscriptionId, SubscriptionRegistry, Unsubscribe};
use crate::types::{Announcement, Cause};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the cue listener wakes to check for shutdown while idle.
const LISTENER_POLL: Duration = Duration::from_millis(200);

/// State guarded by the service lock.
struct ShowState {
    history: CueHistory,
    registry: SubscriptionRegistry,
}

struct Shared {
    config: ServiceConfig,
    state: Mutex<ShowState>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    /// Build an announcement from the history and offer it to every inbox.
    ///
    /// Must be called with the state lock held so that the snapshot and the
    /// fan-out see the same history and the same set of subscribers.
    fn broadcast(&self, state: &ShowState, cause: Cause) -> Arc<Announcement> {
        let announcement = Arc::new(Announcement::new(
            cause,
            state.history.time_points(Instant::now()),
        ));

        let outcome = state.registry.broadcast(&announcement);
        self.delivered
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(outcome.dropped as u64, Ordering::Relaxed);

        announcement
    }
}

impl Unsubscribe for Shared {
    fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.state.lock().registry.remove(id);
        debug!(subscription = %id, removed, "subscription canceled");
    }
}

/// Counters describing the service's activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Cue records currently held in history.
    pub cues: usize,
    /// Live subscriptions.
    pub subscribers: usize,
    /// Announcements accepted by an inbox.
    pub delivered: u64,
    /// Announcements skipped because an inbox was full.
    pub dropped: u64,
}

/// A live performance time service.
///
/// Owns the cue history and the subscription registry behind a single lock.
/// Cloning is cheap and every clone refers to the same service, so it can be
/// handed to an HTTP layer, a CLI, or the background loops.
#[derive(Clone)]
pub struct Service {
    shared: Arc<Shared>,
}

impl Service {
    /// Create a service with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(ServiceConfig::default())
    }

    /// Create a service with a custom configuration.
    pub fn with_config(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: ServiceConfig) -> Self {
        let state = ShowState {
            history: CueHistory::with_limit(config.history_limit),
            registry: SubscriptionRegistry::new(config.inbox_capacity),
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.shared.config
    }

    // --- Subscriptions ---

    /// Register a new subscription with an empty inbox.
    pub fn subscribe(&self) -> SubscriptionHandle {
        let (id, receiver) = self.shared.state.lock().registry.add();
        debug!(subscription = %id, "subscribed");

        let owner: Weak<dyn Unsubscribe> = Arc::downgrade(&self.shared) as Weak<dyn Unsubscribe>;
        SubscriptionHandle::new(id, receiver, owner)
    }

    /// Get subscription count.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Whether `id` is still registered.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.shared.state.lock().registry.contains(id)
    }

    // --- Cues ---

    /// Record that `cue` fired now and announce it to every subscriber.
    ///
    /// The append and the announcement happen under one lock acquisition, so
    /// concurrent triggers are announced in the order they were recorded.
    pub fn trigger(&self, cue: impl Into<String>) {
        let cue = cue.into();
        info!(cue = %cue, "triggering cue");

        let mut state = self.shared.state.lock();
        state.history.append(cue, Instant::now());
        self.shared.broadcast(&state, Cause::Cue);
    }

    /// Get the number of cue records held.
    pub fn cue_count(&self) -> usize {
        self.shared.state.lock().history.len()
    }

    // --- Announcements ---

    /// Broadcast the current state to every subscriber without blocking.
    pub fn notify(&self, cause: Cause) -> Arc<Announcement> {
        let state = self.shared.state.lock();
        self.shared.broadcast(&state, cause)
    }

    /// Build the current announcement without broadcasting it.
    pub fn announcement(&self, cause: Cause) -> Announcement {
        let state = self.shared.state.lock();
        Announcement::new(cause, state.history.time_points(Instant::now()))
    }

    pub fn stats(&self) -> ServiceStats {
        let state = self.shared.state.lock();
        ServiceStats {
            cues: state.history.len(),
            subscribers: state.registry.len(),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    // --- Lifecycle ---

    /// Bind the cue listener and start the background loops.
    ///
    /// Returns once the socket is bound; the listener and the periodic ticker
    /// run on their own threads until [`RunningService::shutdown`] or drop.
    pub fn start(&self, listen_addr: &str) -> Result<RunningService> {
        let addr = resolve_listen_addr(listen_addr)?;
        let socket =
            UdpSocket::bind(addr).map_err(|source| ShowtimeError::Bind { addr, source })?;
        socket.set_read_timeout(Some(LISTENER_POLL))?;
        let local_addr = socket.local_addr()?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let listener = {
            let service = self.clone();
            let shutdown = shutdown_rx.clone();
            thread::Builder::new()
                .name("showtime-listener".to_string())
                .spawn(move || listen(service, socket, shutdown))
                .map_err(ShowtimeError::Spawn)?
        };
        info!(addr = %local_addr, "listening for cues");

        let mut running = RunningService {
            local_addr,
            shutdown: Some(shutdown_tx),
            listener: Some(listener),
            ticker: None,
        };

        let service = self.clone();
        let interval = self.config().tick_interval();
        let ticker = thread::Builder::new()
            .name("showtime-ticker".to_string())
            .spawn(move || run_ticker(service, interval, shutdown_rx))
            .map_err(ShowtimeError::Spawn)?;
        running.ticker = Some(ticker);

        Ok(running)
    }

    /// Run the service for the life of the process.
    ///
    /// Only returns early on a setup failure such as an unparseable address
    /// or a port that cannot be bound.
    pub fn run(&self, listen_addr: &str) -> Result<()> {
        self.start(listen_addr)?.wait();
        Ok(())
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}

/// Background loops started by [`Service::start`].
///
/// Dropping it signals both loops to stop and joins them.
pub struct RunningService {
    local_addr: SocketAddr,
    shutdown: Option<Sender<()>>,
    listener: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl RunningService {
    /// The address the cue listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal both loops to stop. They exit at their next wake-up.
    pub fn shutdown(&mut self) {
        // Dropping the sender disconnects every shutdown receiver
        if self.shutdown.take().is_some() {
            info!("stopping showtime loops");
        }
    }

    /// Block until both loops have exited.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        for handle in [self.listener.take(), self.ticker.take()].into_iter().flatten() {
            if handle.join().is_err() {
                error!("showtime loop panicked");
            }
        }
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        self.shutdown();
        self.join();
    }
}

/// Resolve a listen address, accepting the `":port"` shorthand for all interfaces.
pub fn resolve_listen_addr(addr: &str) -> Result<SocketAddr> {
    resolve_with_default_host(addr, "0.0.0.0")
}

/// Resolve the address of a cue listener to send to.
///
/// The `":port"` shorthand means the listener on this host.
pub fn resolve_cue_target(addr: &str) -> Result<SocketAddr> {
    resolve_with_default_host(addr, "127.0.0.1")
}

fn resolve_with_default_host(addr: &str, host: &str) -> Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("{host}{addr}")
    } else {
        addr.to_string()
    };

    normalized
        .to_socket_addrs()
        .map_err(|source| ShowtimeError::InvalidAddress {
            addr: addr.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ShowtimeError::InvalidAddress {
            addr: addr.to_string(),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"),
        })
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

/// Windows reports a datagram larger than the buffer as WSAEMSGSIZE.
#[cfg(windows)]
fn is_oversized(e: &io::Error) -> bool {
    e.raw_os_error() == Some(10040)
}

#[cfg(not(windows))]
fn is_oversized(_e: &io::Error) -> bool {
    false
}

/// Read errors the listener survives.
///
/// `ConnectionReset` is how Windows surfaces an ICMP port-unreachable for an
/// earlier send on the same socket; it says nothing about inbound cues.
fn is_recoverable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
    )
}

/// Decode each datagram as a cue and trigger it.
///
/// Any other read failure ends the loop; there is no reconnection.
///
/// Oversized datagrams differ by platform: Unix truncates the payload to
/// `max_datagram_size` and it is triggered as a cue, while Windows fails the
/// read with WSAEMSGSIZE and the datagram is dropped with a warning.
fn listen(service: Service, socket: UdpSocket, shutdown: Receiver<()>) {
    let max = service.config().max_datagram_size;
    let mut buf = vec![0u8; max];

    loop {
        if shutdown_requested(&shutdown) {
            debug!("cue listener stopped");
            return;
        }

        match socket.recv_from(&mut buf) {
            Ok((0, peer)) => {
                warn!(%peer, "ignoring empty cue datagram");
            }
            Ok((n, peer)) => {
                let cue = String::from_utf8_lossy(&buf[..n]).into_owned();
                debug!(%peer, cue = %cue, "received cue datagram");
                service.trigger(cue);
            }
            Err(e) if is_recoverable(&e) => {}
            Err(e) if is_oversized(&e) => {
                warn!(max, "dropping cue datagram larger than max_datagram_size");
            }
            Err(e) => {
                error!(error = %e, "failed to read from UDP port, cue listener exiting");
                return;
            }
        }
    }
}

/// Announce on a fixed interval whether or not any cue has fired.
fn run_ticker(service: Service, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);

    loop {
        select! {
            recv(ticker) -> _ => {
                service.notify(Cause::Periodic);
            }
            recv(shutdown) -> _ => {
                debug!("periodic ticker stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_then_announce() {
        let service = Service::new();
        service.trigger("blackout");

        let ann = service.announcement(Cause::Cue);
        assert_eq!(ann.cause, Cause::Cue);
        assert_eq!(ann.time_points.len(), 1);
        assert_eq!(ann.time_points[0].cue, "blackout");
        assert!(ann.time_points[0].offset >= 0.0);
        assert!(ann.time_points[0].offset < 1.0);
    }

    #[test]
    fn test_two_triggers_unread() {
        let service = Service::new();
        let sub = service.subscribe();

        service.trigger("A");
        service.trigger("B");

        let first = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        let second = sub.recv_timeout(Duration::from_millis(100)).unwrap();

        assert_eq!(first.cause, Cause::Cue);
        assert_eq!(first.time_points.len(), 1);
        let cues: Vec<_> = second.time_points.iter().map(|p| p.cue.as_str()).collect();
        assert_eq!(cues, vec!["A", "B"]);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn test_periodic_with_no_cues() {
        let service = Service::new();
        let a = service.subscribe();
        let b = service.subscribe();

        service.notify(Cause::Periodic);

        for sub in [&a, &b] {
            let ann = sub.recv_timeout(Duration::from_millis(100)).unwrap();
            assert_eq!(ann.cause, Cause::Periodic);
            assert!(ann.time_points.is_empty());
        }
    }

    #[test]
    fn test_cancel_then_trigger() {
        let service = Service::new();
        let sub = service.subscribe();

        service.trigger("before");
        sub.cancel();
        service.trigger("after");

        let queued = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(queued.time_points.len(), 1);
        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(!service.is_subscribed(sub.id()));
        assert_eq!(service.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_handle_deregisters() {
        let service = Service::new();
        {
            let _sub = service.subscribe();
            assert_eq!(service.subscriber_count(), 1);
        }
        assert_eq!(service.subscriber_count(), 0);
    }

    #[test]
    fn test_unread_subscriber_never_blocks() {
        let service = Service::new();
        let sub = service.subscribe();

        for i in 0..100 {
            service.trigger(format!("cue-{i}"));
        }

        assert_eq!(sub.pending(), service.config().inbox_capacity);
        let stats = service.stats();
        assert_eq!(stats.cues, 100);
        assert_eq!(stats.delivered, 5);
        assert_eq!(stats.dropped, 95);
    }

    #[test]
    fn test_history_limit() {
        let service = Service::with_config(ServiceConfig {
            history_limit: Some(3),
            ..Default::default()
        })
        .unwrap();

        for cue in ["one", "two", "three", "four"] {
            service.trigger(cue);
        }

        let ann = service.announcement(Cause::Periodic);
        let cues: Vec<_> = ann.time_points.iter().map(|p| p.cue.as_str()).collect();
        assert_eq!(cues, vec!["two", "three", "four"]);
    }

    #[test]
    fn test_with_invalid_config() {
        let result = Service::with_config(ServiceConfig {
            inbox_capacity: 0,
            ..Default::default()
        });
        assert!(matches!(result, Err(ShowtimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolve_go_style_port() {
        let addr = resolve_listen_addr(":9001").unwrap();
        assert_eq!(addr, "0.0.0.0:9001".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_resolve_invalid() {
        let result = resolve_listen_addr("not an address");
        assert!(matches!(result, Err(ShowtimeError::InvalidAddress { .. })));
    }

    #[test]
    fn test_resolve_cue_target_shorthand() {
        let addr = resolve_cue_target(":9001").unwrap();
        assert_eq!(addr, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());

        let explicit = resolve_cue_target("10.0.0.5:53000").unwrap();
        assert_eq!(explicit, "10.0.0.5:53000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_recoverable_read_errors() {
        for kind in [
            io::ErrorKind::WouldBlock,
            io::ErrorKind::TimedOut,
            io::ErrorKind::Interrupted,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_recoverable(&io::Error::from(kind)), "{kind:?}");
        }
        assert!(!is_recoverable(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(!is_oversized(&io::Error::from(io::ErrorKind::ConnectionRefused)));
    }

    #[cfg(unix)]
    #[test]
    fn test_listener_exits_on_read_error() {
        let service = Service::with_config(ServiceConfig {
            tick_interval_ms: 10,
            ..Default::default()
        })
        .unwrap();
        let bystander = service.subscribe();

        // A port that was bound and released, so nothing answers on it
        let dead_addr = {
            let gone = UdpSocket::bind("127.0.0.1:0").unwrap();
            gone.local_addr().unwrap()
        };
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(LISTENER_POLL)).unwrap();
        socket.connect(dead_addr).unwrap();
        // The ICMP port-unreachable leaves ECONNREFUSED pending on the socket
        socket.send(&[1]).unwrap();
        thread::sleep(Duration::from_millis(50));

        // Keep the sender alive: the listener must stop on its own
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let listener = {
            let service = service.clone();
            let shutdown = shutdown_rx.clone();
            thread::spawn(move || listen(service, socket, shutdown))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !listener.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(listener.is_finished(), "listener kept running after a read error");
        listener.join().unwrap();
        assert_eq!(service.cue_count(), 0);

        // The ticker and the direct trigger path keep working
        let ticker = {
            let service = service.clone();
            thread::spawn(move || run_ticker(service, Duration::from_millis(10), shutdown_rx))
        };
        let periodic = loop {
            let ann = bystander.recv_timeout(Duration::from_secs(5)).unwrap();
            if ann.cause == Cause::Periodic {
                break ann;
            }
        };
        assert!(periodic.is_empty());

        service.trigger("still-running");
        assert_eq!(service.cue_count(), 1);

        drop(shutdown_tx);
        ticker.join().unwrap();
    }
}
