//! Parameter tree client
//!
//! Queries the endpoint's parameter tree over HTTP+JSON and sends control
//! messages over UDP. Sends are single best-effort datagrams: no
//! acknowledgement, no retry.

use crate::error::{FitCheckError, Result};
use crate::osc::encode_message;
use crate::tree::{flatten, ParameterTree};
use crate::types::{ParameterRecord, ParameterValue, AVATAR_CHANGE_ADDRESS, AVATAR_PARAMETERS_PREFIX};
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Upper bound on a single tree query
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the endpoint's parameter tree and control port
pub struct ParameterTreeClient {
    query_url: String,
    send_addr: SocketAddr,
    socket: UdpSocket,
    agent: ureq::Agent,
    /// Last successful snapshot; cleared before every query
    current: Option<ParameterTree>,
}

impl ParameterTreeClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `query_addr` - Discovered address/port serving the tree over HTTP
    /// * `send_addr` - Address of the application's control port
    pub fn new(query_addr: SocketAddr, send_addr: SocketAddr) -> Result<Self> {
        let bind_ip = match send_addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0))?;
        let agent = ureq::AgentBuilder::new().timeout(QUERY_TIMEOUT).build();

        log::debug!(
            "OSC: Client querying http://{} and sending to {}",
            query_addr,
            send_addr
        );

        Ok(Self {
            query_url: format!("http://{}/", query_addr),
            send_addr,
            socket,
            agent,
            current: None,
        })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }

    pub fn send_addr(&self) -> SocketAddr {
        self.send_addr
    }

    /// Most recent snapshot, if the last query succeeded
    pub fn current(&self) -> Option<&ParameterTree> {
        self.current.as_ref()
    }

    /// Fetch a fresh snapshot of the whole tree
    ///
    /// The previous snapshot is discarded before the request, so after a
    /// failure [`current`](Self::current) is `None`.
    pub fn snapshot(&mut self) -> Result<&ParameterTree> {
        self.current = None;

        let query_failure = |reason: String| FitCheckError::QueryFailure {
            url: self.query_url.clone(),
            reason,
        };

        let response = self
            .agent
            .get(&self.query_url)
            .call()
            .map_err(|e| query_failure(e.to_string()))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(query_failure(format!("HTTP status {}", status)));
        }

        let body = response
            .into_string()
            .map_err(|e| query_failure(format!("unreadable body: {}", e)))?;
        let tree = ParameterTree::from_json(&body)
            .map_err(|e| query_failure(format!("malformed body: {}", e)))?;

        Ok(self.current.insert(tree))
    }

    /// Identifier of the currently active avatar
    pub fn avatar_id(&mut self) -> Result<String> {
        let tree = self.snapshot()?;
        avatar_id_from_tree(tree)
    }

    /// Every avatar parameter with its current value, in tree order
    pub fn avatar_params(&mut self) -> Result<Vec<ParameterRecord>> {
        let tree = self.snapshot()?;
        avatar_params_from_tree(tree)
    }

    /// Send one parameter value to the application
    pub fn send_param(&self, path: &str, value: &ParameterValue) -> Result<()> {
        let datagram = encode_message(path, value)?;
        self.socket.send_to(&datagram, self.send_addr)?;
        log::trace!("OSC: -> {} {}", path, value);
        Ok(())
    }

    /// Ask the application to switch avatars
    pub fn request_avatar_change(&self, avatar_id: &str) -> Result<()> {
        log::info!("OSC: Requesting avatar change to {}", avatar_id);
        self.send_param(
            AVATAR_CHANGE_ADDRESS,
            &ParameterValue::String(avatar_id.to_string()),
        )
    }
}

/// Read the active avatar id from `avatar/change`'s `VALUE`
pub fn avatar_id_from_tree(tree: &ParameterTree) -> Result<String> {
    let change = tree.node(&["avatar", "change"])?;
    change
        .get("VALUE")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FitCheckError::TreeShape {
            path: AVATAR_CHANGE_ADDRESS.to_string(),
            reason: "VALUE is not a string array".to_string(),
        })
}

/// Flatten `avatar/parameters` into parameter records
///
/// Leaves without a usable scalar value are skipped with a warning.
pub fn avatar_params_from_tree(tree: &ParameterTree) -> Result<Vec<ParameterRecord>> {
    let node = tree.node(&["avatar", "parameters"])?;
    let leaves = flatten(node, AVATAR_PARAMETERS_PREFIX)?;

    let mut records = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let Some(raw) = leaf.value.as_ref() else {
            log::warn!("OSC: Parameter {} has no VALUE, skipping", leaf.path);
            continue;
        };
        match ParameterValue::from_json(raw, &leaf.path) {
            Ok(value) => records.push(ParameterRecord::new(leaf.name(), leaf.path.clone(), value)),
            Err(e) => log::warn!("OSC: Skipping parameter: {}", e),
        }
    }
    Ok(records)
}
