//! Avatar-change readiness detection
//!
//! Requesting an avatar change does not mean the new avatar's parameters are
//! registered yet; values replayed too early are silently dropped by the
//! application. The detector listens for the application's own notifications
//! and declares the avatar ready once its parameter announcements settle.
//!
//! # Architecture
//!
//! ```text
//! UDP :9001 → listener thread → Mutex<ReadinessState> ← polling loop (caller thread)
//! ```
//!
//! The listener only records events; the caller's polling loop evaluates
//! the predicate. The listener is bound before the change request goes out
//! ([`ReadinessDetector::arm`]) and is torn down when the armed handle is
//! dropped, so every exit path releases the socket.
//!
//! Phases: `Idle → WaitingForChangeAck → CollectingParams → Stable`, or
//! `TimedOut` from any non-terminal phase once the deadline passes.

use crate::config::ReadinessSettings;
use crate::error::{FitCheckError, Result};
use crate::osc::AvatarEvent;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long the listener blocks on the socket before checking for shutdown
const LISTENER_POLL: Duration = Duration::from_millis(20);

/// Largest datagram accepted from the application
const MAX_DATAGRAM: usize = 8192;

/// Readiness state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPhase {
    /// Not armed
    Idle,
    /// Armed, no `/avatar/change` seen yet
    WaitingForChangeAck,
    /// Change acknowledged, parameter names still arriving or too few
    CollectingParams,
    /// Success terminal
    Stable,
    /// Failure terminal
    TimedOut,
}

/// When a newly selected avatar counts as ready
#[derive(Debug, Clone)]
pub struct ReadinessCriteria {
    /// Distinct parameter names needed after the change acknowledgement
    pub min_params: usize,
    /// Names that, once all seen, also satisfy the count condition
    pub required: HashSet<String>,
    /// Time without a new name before declaring stable
    pub quiet: Duration,
    /// Overall deadline for [`ArmedReadiness::wait`]
    pub timeout: Duration,
    /// Predicate polling interval
    pub poll_interval: Duration,
}

impl ReadinessCriteria {
    pub fn from_settings(settings: &ReadinessSettings) -> Self {
        Self {
            min_params: settings.min_params,
            required: HashSet::new(),
            quiet: Duration::from_millis(settings.quiet_ms),
            timeout: Duration::from_millis(settings.timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }

    pub fn with_min_params(mut self, min_params: usize) -> Self {
        self.min_params = min_params;
        self
    }

    /// Also accept once every one of `names` has been seen
    ///
    /// This is an alternative to `min_params`, not an additional condition.
    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for ReadinessCriteria {
    fn default() -> Self {
        Self::from_settings(&ReadinessSettings::default())
    }
}

/// State shared between the listener thread and the polling loop
#[derive(Debug, Default)]
struct ReadinessState {
    active_avatar_id: Option<String>,
    /// Leaf names observed since the last change acknowledgement
    seen_names: HashSet<String>,
    last_new_name_at: Option<Instant>,
    changed_at: Option<Instant>,
}

impl ReadinessState {
    fn apply(&mut self, event: AvatarEvent, now: Instant) {
        match event {
            AvatarEvent::Changed { avatar_id } => {
                log::debug!("Readiness: Change acknowledged for {}", avatar_id);
                // A repeated acknowledgement restarts the collection window
                self.active_avatar_id = Some(avatar_id);
                self.seen_names.clear();
                self.last_new_name_at = None;
                self.changed_at = Some(now);
            }
            AvatarEvent::ParameterSeen { name } => {
                if self.active_avatar_id.is_none() {
                    return;
                }
                if self.seen_names.insert(name) {
                    self.last_new_name_at = Some(now);
                }
            }
        }
    }

    fn has_enough_names(&self, criteria: &ReadinessCriteria) -> bool {
        let required_seen =
            !criteria.required.is_empty() && criteria.required.is_subset(&self.seen_names);
        required_seen || self.seen_names.len() >= criteria.min_params
    }

    fn is_stable(&self, criteria: &ReadinessCriteria, now: Instant) -> bool {
        if self.active_avatar_id.is_none() || !self.has_enough_names(criteria) {
            return false;
        }
        match self.last_new_name_at {
            Some(last) => now.saturating_duration_since(last) >= criteria.quiet,
            None => false,
        }
    }

    /// Phase at `now`; past `deadline`, anything short of stable has timed out
    fn phase(
        &self,
        criteria: &ReadinessCriteria,
        now: Instant,
        deadline: Option<Instant>,
    ) -> ReadinessPhase {
        let stable = self.is_stable(criteria, now);
        if !stable && deadline.is_some_and(|deadline| now >= deadline) {
            ReadinessPhase::TimedOut
        } else if self.active_avatar_id.is_none() {
            ReadinessPhase::WaitingForChangeAck
        } else if stable {
            ReadinessPhase::Stable
        } else {
            ReadinessPhase::CollectingParams
        }
    }
}

/// Factory for armed readiness listeners
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    listen_addr: SocketAddr,
    criteria: ReadinessCriteria,
}

impl ReadinessDetector {
    pub fn new(listen_addr: SocketAddr, criteria: ReadinessCriteria) -> Self {
        Self {
            listen_addr,
            criteria,
        }
    }

    pub fn criteria(&self) -> &ReadinessCriteria {
        &self.criteria
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Bind the inbound listener and start recording events
    ///
    /// Call this before sending the change request so an early
    /// acknowledgement is not missed.
    pub fn arm(&self) -> Result<ArmedReadiness> {
        ArmedReadiness::bind(self.listen_addr, self.criteria.clone())
    }
}

/// A bound, running readiness listener
///
/// Dropping the handle stops the listener thread and releases the socket.
pub struct ArmedReadiness {
    state: Arc<Mutex<ReadinessState>>,
    shutdown: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
    criteria: ReadinessCriteria,
}

impl ArmedReadiness {
    fn bind(listen_addr: SocketAddr, criteria: ReadinessCriteria) -> Result<Self> {
        let socket = UdpSocket::bind(listen_addr)?;
        socket.set_read_timeout(Some(LISTENER_POLL))?;
        let local_addr = socket.local_addr()?;

        let state = Arc::new(Mutex::new(ReadinessState::default()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));

        let thread_state = state.clone();
        let thread_shutdown = shutdown.clone();
        let thread_alive = alive.clone();
        let handle = thread::Builder::new()
            .name("readiness-listener".into())
            .spawn(move || {
                Self::listen_loop(socket, thread_state, thread_shutdown);
                thread_alive.store(false, Ordering::Relaxed);
            })?;

        log::info!("Readiness: Listening on {}", local_addr);

        Ok(Self {
            state,
            shutdown,
            alive,
            handle: Some(handle),
            local_addr,
            criteria,
        })
    }

    /// Listener loop running on the dedicated thread; owns the socket
    fn listen_loop(socket: UdpSocket, state: Arc<Mutex<ReadinessState>>, shutdown: Arc<AtomicBool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        while !shutdown.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((n, _from)) => {
                    let events = match AvatarEvent::decode(&buf[..n]) {
                        Ok(events) => events,
                        Err(e) => {
                            log::trace!("Readiness: Dropping undecodable datagram: {}", e);
                            continue;
                        }
                    };
                    if events.is_empty() {
                        continue;
                    }
                    let now = Instant::now();
                    if let Ok(mut state) = state.lock() {
                        for event in events {
                            state.apply(event, now);
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset
                    ) => {}
                Err(e) => {
                    log::error!("Readiness: Listener receive error: {}", e);
                    break;
                }
            }
        }

        log::debug!("Readiness: Listener stopped");
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Check whether the listener thread is still running
    pub fn is_listening(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> ReadinessPhase {
        if self.handle.is_none() {
            return ReadinessPhase::Idle;
        }
        self.state
            .lock()
            .map(|state| state.phase(&self.criteria, Instant::now(), None))
            .unwrap_or(ReadinessPhase::WaitingForChangeAck)
    }

    /// Phase and active avatar at `now`
    fn evaluate(&self, now: Instant, deadline: Instant) -> (ReadinessPhase, Option<String>) {
        match self.state.lock() {
            Ok(state) => (
                state.phase(&self.criteria, now, Some(deadline)),
                state.active_avatar_id.clone(),
            ),
            Err(_) if now >= deadline => (ReadinessPhase::TimedOut, None),
            Err(_) => (ReadinessPhase::WaitingForChangeAck, None),
        }
    }

    /// Block until the active avatar is stable or the timeout elapses
    ///
    /// The listener is stopped before returning, on success and on failure.
    pub fn wait(mut self) -> Result<String> {
        let started = Instant::now();
        let deadline = started + self.criteria.timeout;
        let mut last_phase = ReadinessPhase::Idle;

        let result = loop {
            let now = Instant::now();
            let (phase, avatar_id) = self.evaluate(now, deadline);

            if phase != last_phase {
                log::debug!("Readiness: {:?} -> {:?}", last_phase, phase);
                if phase == ReadinessPhase::TimedOut {
                    log::warn!(
                        "Readiness: Timed out after {:?} in phase {:?}",
                        self.criteria.timeout,
                        last_phase
                    );
                }
                last_phase = phase;
            }

            match (phase, avatar_id) {
                (ReadinessPhase::Stable, Some(avatar_id)) => {
                    log::info!(
                        "Readiness: Avatar {} stable after {:?}",
                        avatar_id,
                        now.duration_since(started)
                    );
                    break Ok(avatar_id);
                }
                (ReadinessPhase::TimedOut, _) => {
                    break Err(FitCheckError::ReadinessTimeout(self.criteria.timeout));
                }
                _ => {}
            }

            thread::sleep(self.criteria.poll_interval.min(deadline.saturating_duration_since(now)));
        };

        self.stop();
        result
    }

    /// Stop the listener thread and release the socket
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ArmedReadiness {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscMessage, OscPacket, OscType};

    fn criteria(min_params: usize, quiet_ms: u64, timeout_ms: u64) -> ReadinessCriteria {
        ReadinessCriteria {
            min_params,
            required: HashSet::new(),
            quiet: Duration::from_millis(quiet_ms),
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn changed(id: &str) -> AvatarEvent {
        AvatarEvent::Changed {
            avatar_id: id.to_string(),
        }
    }

    fn seen(name: &str) -> AvatarEvent {
        AvatarEvent::ParameterSeen {
            name: name.to_string(),
        }
    }

    fn send(socket: &UdpSocket, to: SocketAddr, addr: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        socket
            .send_to(&rosc::encoder::encode(&packet).unwrap(), to)
            .unwrap();
    }

    fn loopback_detector(criteria: ReadinessCriteria) -> ReadinessDetector {
        ReadinessDetector::new("127.0.0.1:0".parse().unwrap(), criteria)
    }

    #[test]
    fn test_predicate_debounce_boundary() {
        let c = criteria(3, 50, 1000);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();

        state.apply(changed("av1"), t0);
        state.apply(seen("A"), t0 + Duration::from_millis(10));
        state.apply(seen("B"), t0 + Duration::from_millis(20));
        let third = t0 + Duration::from_millis(30);
        state.apply(seen("C"), third);

        assert!(!state.is_stable(&c, third + Duration::from_millis(49)));
        assert_eq!(
            state.phase(&c, third + Duration::from_millis(49), None),
            ReadinessPhase::CollectingParams
        );
        assert!(state.is_stable(&c, third + Duration::from_millis(50)));
    }

    #[test]
    fn test_repeated_name_does_not_restart_quiet_period() {
        let c = criteria(1, 50, 1000);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();
        state.apply(changed("av1"), t0);
        state.apply(seen("A"), t0);
        state.apply(seen("A"), t0 + Duration::from_millis(40));
        assert!(state.is_stable(&c, t0 + Duration::from_millis(50)));
    }

    #[test]
    fn test_parameters_before_change_are_ignored() {
        let c = criteria(1, 0, 1000);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();
        state.apply(seen("A"), t0);
        assert!(state.seen_names.is_empty());
        assert_eq!(state.phase(&c, t0, None), ReadinessPhase::WaitingForChangeAck);
    }

    #[test]
    fn test_deadline_reaches_timed_out_unless_stable() {
        let c = criteria(1, 50, 1000);
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_millis(100);
        let mut state = ReadinessState::default();

        assert_eq!(state.phase(&c, t0, Some(deadline)), ReadinessPhase::WaitingForChangeAck);
        assert_eq!(state.phase(&c, deadline, Some(deadline)), ReadinessPhase::TimedOut);

        state.apply(changed("av1"), t0);
        state.apply(seen("A"), t0 + Duration::from_millis(80));
        assert_eq!(
            state.phase(&c, t0 + Duration::from_millis(90), Some(deadline)),
            ReadinessPhase::CollectingParams
        );
        // Still collecting when the deadline passes
        assert_eq!(state.phase(&c, deadline, Some(deadline)), ReadinessPhase::TimedOut);
        // Stable wins once the quiet period has elapsed, even at the deadline
        let late = t0 + Duration::from_millis(130);
        assert_eq!(state.phase(&c, late, Some(late)), ReadinessPhase::Stable);
        // No deadline: never times out
        assert_eq!(
            state.phase(&c, t0 + Duration::from_millis(90), None),
            ReadinessPhase::CollectingParams
        );
    }

    #[test]
    fn test_second_change_resets_collection() {
        let c = criteria(2, 10, 1000);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();
        state.apply(changed("av1"), t0);
        state.apply(seen("A"), t0);
        state.apply(seen("B"), t0);
        assert!(state.is_stable(&c, t0 + Duration::from_millis(10)));

        state.apply(changed("av2"), t0 + Duration::from_millis(20));
        assert!(state.seen_names.is_empty());
        assert!(state.last_new_name_at.is_none());
        assert!(!state.is_stable(&c, t0 + Duration::from_millis(100)));
        assert_eq!(state.active_avatar_id.as_deref(), Some("av2"));
    }

    #[test]
    fn test_required_names_alternative_to_count() {
        let c = criteria(100, 0, 1000).with_required(["Smile", "Hue"]);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();
        state.apply(changed("av1"), t0);
        state.apply(seen("Smile"), t0);
        assert!(!state.is_stable(&c, t0));
        state.apply(seen("Hue"), t0);
        assert!(state.is_stable(&c, t0));
    }

    #[test]
    fn test_change_without_parameters_never_stable() {
        let c = criteria(0, 0, 1000);
        let t0 = Instant::now();
        let mut state = ReadinessState::default();
        state.apply(changed("av1"), t0);
        assert!(!state.is_stable(&c, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_waits_for_quiet_period_after_last_arrival() {
        let detector = loopback_detector(criteria(3, 50, 2000));
        let armed = detector.arm().unwrap();
        let target = armed.local_addr();
        assert_eq!(armed.phase(), ReadinessPhase::WaitingForChangeAck);

        let (tx, rx) = flume::bounded::<Instant>(1);
        let sender = thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            send(&socket, target, "/avatar/change", vec![OscType::String("av1".into())]);
            thread::sleep(Duration::from_millis(10));
            let mut third_sent = Instant::now();
            for name in ["A", "B", "C"] {
                third_sent = Instant::now();
                send(&socket, target, &format!("/avatar/parameters/{}", name), vec![OscType::Bool(true)]);
                thread::sleep(Duration::from_millis(10));
            }
            tx.send(third_sent).unwrap();
        });

        let avatar = armed.wait().unwrap();
        let returned_at = Instant::now();
        sender.join().unwrap();
        let third_sent = rx.recv().unwrap();

        assert_eq!(avatar, "av1");
        assert!(returned_at.duration_since(third_sent) >= Duration::from_millis(50));
    }

    #[test]
    fn test_timeout_without_change_releases_socket() {
        let detector = loopback_detector(criteria(1, 10, 1000));
        let armed = detector.arm().unwrap();
        let addr = armed.local_addr();

        let started = Instant::now();
        let err = armed.wait().unwrap_err();
        assert!(matches!(err, FitCheckError::ReadinessTimeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(1000));

        // Listener gone: the exact address can be bound again
        UdpSocket::bind(addr).unwrap();
    }

    #[test]
    fn test_drop_stops_listener() {
        let detector = loopback_detector(criteria(1, 10, 1000));
        let mut armed = detector.arm().unwrap();
        let addr = armed.local_addr();
        assert!(armed.is_listening());
        armed.stop();
        assert!(!armed.is_listening());
        armed.stop();
        assert_eq!(armed.phase(), ReadinessPhase::Idle);
        drop(armed);
        UdpSocket::bind(addr).unwrap();
    }

    #[test]
    fn test_garbage_datagrams_are_ignored() {
        let detector = loopback_detector(criteria(1, 20, 2000));
        let armed = detector.arm().unwrap();
        let target = armed.local_addr();

        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.send_to(b"not osc", target).unwrap();
        send(&socket, target, "/avatar/change", vec![OscType::String("av7".into())]);
        send(&socket, target, "/avatar/parameters/Smile", vec![OscType::Bool(true)]);

        assert_eq!(armed.wait().unwrap(), "av7");
    }
}
