//! Endpoint discovery via mDNS/DNS-SD
//!
//! The application advertises its parameter tree service on the local
//! network. [`EndpointLocator`] browses for the configured service type and
//! records the first advertisement whose instance name starts with the
//! configured prefix (case-insensitive). Later matches are ignored.

use crate::config::DiscoveryConfig;
use crate::error::{FitCheckError, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

/// Resolved service advertisement, independent of the mDNS library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Full instance name, e.g. `VRChat-Client-1A2B._oscjson._tcp.local.`
    pub fullname: String,
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
}

impl Advertisement {
    fn from_info(info: &ServiceInfo) -> Self {
        Self {
            fullname: info.get_fullname().to_string(),
            hostname: info.get_hostname().to_string(),
            port: info.get_port(),
            addresses: info.get_addresses().iter().copied().collect(),
        }
    }
}

/// A discovered endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub host: String,
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    /// Address of the HTTP parameter tree service
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.address), self.port)
    }
}

/// Check an advertisement against the name prefix and pick its IPv4 address
///
/// Returns `None` for non-matching names and for advertisements without any
/// IPv4 address. With several IPv4 addresses the lowest one is chosen so the
/// result does not depend on set iteration order.
pub fn match_advertisement(ad: &Advertisement, name_prefix: &str) -> Option<Endpoint> {
    let prefix = name_prefix.to_lowercase();
    if !ad.fullname.to_lowercase().starts_with(&prefix) {
        return None;
    }

    let address = ad
        .addresses
        .iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .min();

    match address {
        Some(address) => Some(Endpoint {
            name: ad.fullname.clone(),
            host: ad.hostname.clone(),
            address,
            port: ad.port,
        }),
        None => {
            log::debug!("Discovery: {} has no IPv4 address, skipping", ad.fullname);
            None
        }
    }
}

/// Running browse operation
struct Browse {
    /// Absent when events are fed from elsewhere
    daemon: Option<ServiceDaemon>,
    events: flume::Receiver<ServiceEvent>,
}

/// How a bounded scan of the browse events ended
#[derive(Debug, PartialEq, Eq)]
enum ScanOutcome {
    Found(Endpoint),
    TimedOut,
    Closed,
}

/// Consume browse events until a matching advertisement, the deadline, or
/// a closed channel
///
/// Events after the first match stay queued.
fn scan_events(
    events: &flume::Receiver<ServiceEvent>,
    name_prefix: &str,
    deadline: Instant,
) -> ScanOutcome {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return ScanOutcome::TimedOut;
        }
        match events.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let ad = Advertisement::from_info(&info);
                if let Some(endpoint) = match_advertisement(&ad, name_prefix) {
                    return ScanOutcome::Found(endpoint);
                }
                log::trace!("Discovery: Ignoring {}", ad.fullname);
            }
            Ok(other) => log::trace!("Discovery: {:?}", other),
            Err(flume::RecvTimeoutError::Timeout) => return ScanOutcome::TimedOut,
            Err(flume::RecvTimeoutError::Disconnected) => return ScanOutcome::Closed,
        }
    }
}

/// Blocking locator for the application's endpoint
///
/// The browse is started lazily by the first [`wait`](Self::wait) and reused
/// by later calls until a match is found or [`stop`](Self::stop) is called.
pub struct EndpointLocator {
    config: DiscoveryConfig,
    endpoint: Option<Endpoint>,
    browse: Option<Browse>,
}

impl EndpointLocator {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            endpoint: None,
            browse: None,
        }
    }

    /// Endpoint recorded by a successful wait
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Check whether the mDNS browse is active
    pub fn is_browsing(&self) -> bool {
        self.browse.is_some()
    }

    fn start(&mut self) -> Result<()> {
        if self.browse.is_some() {
            return Ok(());
        }
        let daemon = ServiceDaemon::new()?;
        let events = daemon.browse(&self.config.service_type)?;
        log::info!(
            "Discovery: Browsing for {} (prefix '{}')",
            self.config.service_type,
            self.config.name_prefix
        );
        self.browse = Some(Browse {
            daemon: Some(daemon),
            events,
        });
        Ok(())
    }

    /// Block up to `timeout` for a matching advertisement
    ///
    /// Returns immediately if an endpoint was already recorded. The browse is
    /// torn down once a match is found.
    pub fn wait(&mut self, timeout: Duration) -> Result<bool> {
        if self.endpoint.is_some() {
            return Ok(true);
        }
        self.start()?;
        let Some(events) = self.browse.as_ref().map(|b| b.events.clone()) else {
            return Ok(false);
        };

        let deadline = Instant::now() + timeout;
        match scan_events(&events, &self.config.name_prefix, deadline) {
            ScanOutcome::Found(endpoint) => {
                log::info!(
                    "Discovery: Found {} at {}",
                    endpoint.name,
                    endpoint.socket_addr()
                );
                self.endpoint = Some(endpoint);
                self.stop();
                Ok(true)
            }
            ScanOutcome::TimedOut => {
                log::debug!("Discovery: No match within {:?}", timeout);
                Ok(false)
            }
            ScanOutcome::Closed => {
                log::warn!("Discovery: Browse channel closed");
                self.stop();
                Ok(false)
            }
        }
    }

    /// Wait with the configured timeout, failing if nothing was found
    pub fn locate(&mut self) -> Result<Endpoint> {
        let timeout = self.config.timeout();
        if !self.wait(timeout)? {
            return Err(FitCheckError::DiscoveryTimeout(timeout));
        }
        self.endpoint
            .clone()
            .ok_or(FitCheckError::DiscoveryTimeout(timeout))
    }

    /// Stop browsing and shut down the mDNS daemon
    ///
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        let Some(daemon) = self.browse.take().and_then(|browse| browse.daemon) else {
            return;
        };
        if let Err(e) = daemon.stop_browse(&self.config.service_type) {
            log::debug!("Discovery: stop_browse failed: {}", e);
        }
        if let Err(e) = daemon.shutdown() {
            log::debug!("Discovery: Daemon shutdown failed: {}", e);
        }
    }
}

impl Drop for EndpointLocator {
    fn drop(&mut self) {
        self.stop();
    }
}
