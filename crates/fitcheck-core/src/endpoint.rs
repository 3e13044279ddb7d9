//! Endpoint abstraction used by the preset store
//!
//! The store talks to the application only through [`AvatarEndpoint`], so
//! save/apply logic can be exercised against an in-memory endpoint.

use crate::client::ParameterTreeClient;
use crate::config::FitCheckConfig;
use crate::discovery::Endpoint;
use crate::error::Result;
use crate::readiness::{ReadinessCriteria, ReadinessDetector};
use crate::types::{ParameterRecord, ParameterValue};
use std::net::SocketAddr;

/// Operations the preset store needs from the running application
pub trait AvatarEndpoint {
    /// Identifier of the currently active avatar (fresh query)
    fn avatar_id(&mut self) -> Result<String>;

    /// Full, unfiltered parameter snapshot of the active avatar
    fn avatar_params(&mut self) -> Result<Vec<ParameterRecord>>;

    /// Discard any cached tree state and query again
    fn refresh(&mut self) -> Result<()>;

    /// Send one parameter value (best effort, no acknowledgement)
    fn send_parameter(&mut self, path: &str, value: &ParameterValue) -> Result<()>;

    /// Request an avatar change and block until the new avatar is ready
    ///
    /// Returns the avatar id reported by the application. No parameter may be
    /// sent before this returns.
    fn switch_avatar(&mut self, avatar_id: &str, min_params: usize) -> Result<String>;
}

/// The real application, reached over HTTP and UDP
pub struct LiveEndpoint {
    client: ParameterTreeClient,
    readiness: ReadinessDetector,
}

impl LiveEndpoint {
    pub fn new(client: ParameterTreeClient, readiness: ReadinessDetector) -> Self {
        Self { client, readiness }
    }

    /// Build the client and detector for a discovered endpoint
    ///
    /// The tree is queried on the configured OSC host at the advertised
    /// port; the advertised address may be a LAN interface while the query
    /// server only listens on localhost.
    pub fn connect(endpoint: &Endpoint, config: &FitCheckConfig) -> Result<Self> {
        let client = ParameterTreeClient::new(query_addr(endpoint, config), config.osc.send_addr())?;
        let readiness = ReadinessDetector::new(
            config.osc.listen_addr(),
            ReadinessCriteria::from_settings(&config.readiness),
        );
        Ok(Self::new(client, readiness))
    }

    pub fn client(&self) -> &ParameterTreeClient {
        &self.client
    }
}

/// HTTP address of the parameter tree for a discovered endpoint
pub fn query_addr(endpoint: &Endpoint, config: &FitCheckConfig) -> SocketAddr {
    SocketAddr::new(config.osc.host, endpoint.port)
}

impl AvatarEndpoint for LiveEndpoint {
    fn avatar_id(&mut self) -> Result<String> {
        self.client.avatar_id()
    }

    fn avatar_params(&mut self) -> Result<Vec<ParameterRecord>> {
        self.client.avatar_params()
    }

    fn refresh(&mut self) -> Result<()> {
        self.client.snapshot().map(|_| ())
    }

    fn send_parameter(&mut self, path: &str, value: &ParameterValue) -> Result<()> {
        self.client.send_param(path, value)
    }

    fn switch_avatar(&mut self, avatar_id: &str, min_params: usize) -> Result<String> {
        let criteria = self.readiness.criteria().clone().with_min_params(min_params);
        let detector = ReadinessDetector::new(self.readiness.listen_addr(), criteria);

        // Bound before the request so an early acknowledgement is not lost
        let armed = detector.arm()?;
        self.client.request_avatar_change(avatar_id)?;
        armed.wait()
    }
}
