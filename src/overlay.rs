//! Seam between the station core and the peer-to-peer overlay transport.
//!
//! The overlay itself — DHT-style node lookup, NAT traversal, the
//! authenticated stream handshake — is out of scope (spec §1: "the overlay
//! network... is a dependency of this crate, not a module in it"). What the
//! core needs is two narrow capabilities: resolve an [`Identifier`] to a
//! reachable address, and speak HTTP-over-authenticated-stream to it. Both
//! are expressed as `async_trait`s so the core can be exercised against a
//! mock without a real overlay running, the same seam the original's
//! `query.hh` draws around `Node`/`HttpClientConnection`.

use crate::identifier::Identifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A peer's claimed network location, as advertised by the overlay's node
/// table. Opaque beyond host/port — the overlay owns connection security.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddr {
    pub id: Identifier,
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(id: Identifier, host: impl Into<String>, port: u16) -> Self {
        NodeAddr {
            id,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}

/// Resolves station identifiers to reachable addresses. Grounded on the
/// original's `Node::findNode`/`StationResolveQuery`.
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn find_node(&self, id: &Identifier) -> Option<NodeAddr>;
}

/// A single decoded HTTP response from a peer, enough for the query layer
/// to branch on status and parse the body. Mirrors `HttpClientResponse`'s
/// role in the original's query phases without replicating its class
/// hierarchy (spec §9).
pub struct PeerResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PeerResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<serde_json::Value, crate::error::Error> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }
}

/// Speaks the `vlf::station` application protocol over an authenticated
/// stream to a resolved peer. Grounded on `query.hh`'s GET request pattern
/// against `/status`, `/list`, `/schedule`, `/data`, `/data/<id>`.
#[async_trait]
pub trait StationClient: Send + Sync {
    async fn get(&self, peer: &NodeAddr, path: &str) -> Result<PeerResponse, crate::error::Error>;
}

/// A `StationClient` that dials a peer's `NodeAddr` directly over plain
/// HTTP. This assumes the overlay has already turned the authenticated
/// stream into something reachable at `host:port` (a local tunnel or proxy
/// endpoint it maintains per peer) — the actual stream authentication is
/// the overlay's job, not this crate's (§1); this client only needs to
/// speak HTTP/1.1 to whatever address the overlay hands back from
/// `find_node`.
pub struct HttpStationClient {
    client: reqwest::Client,
}

impl Default for HttpStationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpStationClient {
    pub fn new() -> Self {
        HttpStationClient {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StationClient for HttpStationClient {
    async fn get(&self, peer: &NodeAddr, path: &str) -> Result<PeerResponse, crate::error::Error> {
        let url = format!("http://{}:{}{}", peer.host, peer.port, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| crate::error::Error::InvalidFormat(format!("request to {peer} failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| crate::error::Error::InvalidFormat(format!("reading body from {peer} failed: {e}")))?
            .to_vec();
        Ok(PeerResponse { status, body })
    }
}

/// A [`NodeResolver`] backed by a snapshot of this station's own
/// `StationRegistry`: it can resolve a peer only if this station has
/// already contacted it once and recorded its `NodeAddr`. True
/// identifier-to-address resolution for a peer never seen before is a DHT
/// search, which is the overlay transport's job and explicitly out of
/// scope here (spec §1) — so `find_node` on an unknown candidate simply
/// returns `None`, the same outcome a not-yet-reachable overlay lookup
/// would produce, rather than fabricating network behavior this crate
/// does not own.
pub struct KnownPeerResolver {
    known: HashMap<Identifier, NodeAddr>,
}

impl KnownPeerResolver {
    pub fn snapshot(registry: &crate::station_registry::StationRegistry) -> Self {
        KnownPeerResolver {
            known: registry
                .known()
                .iter()
                .map(|item| (item.id(), item.node().clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl NodeResolver for KnownPeerResolver {
    async fn find_node(&self, id: &Identifier) -> Option<NodeAddr> {
        self.known.get(id).cloned()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory `NodeResolver` + `StationClient` double for query-layer
    /// tests; never touches the network.
    #[derive(Default)]
    pub struct MockOverlay {
        pub nodes: Mutex<HashMap<Identifier, NodeAddr>>,
        pub responses: Mutex<HashMap<(Identifier, String), PeerResponse>>,
    }

    impl MockOverlay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register_node(&self, addr: NodeAddr) {
            self.nodes.lock().unwrap().insert(addr.id, addr);
        }

        pub fn register_response(&self, id: Identifier, path: &str, status: u16, body: Vec<u8>) {
            self.responses
                .lock()
                .unwrap()
                .insert((id, path.to_string()), PeerResponse { status, body });
        }
    }

    #[async_trait]
    impl NodeResolver for MockOverlay {
        async fn find_node(&self, id: &Identifier) -> Option<NodeAddr> {
            self.nodes.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl StationClient for MockOverlay {
        async fn get(&self, peer: &NodeAddr, path: &str) -> Result<PeerResponse, crate::error::Error> {
            self.responses
                .lock()
                .unwrap()
                .get(&(peer.id, path.to_string()))
                .map(|r| PeerResponse {
                    status: r.status,
                    body: r.body.clone(),
                })
                .ok_or(crate::error::Error::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockOverlay;
    use super::*;
    use crate::identifier::hash_bytes;

    #[tokio::test]
    async fn resolver_returns_registered_node() {
        let overlay = MockOverlay::new();
        let id = hash_bytes(b"peer-a");
        overlay.register_node(NodeAddr::new(id, "10.0.0.1", 7001));
        let found = overlay.find_node(&id).await;
        assert_eq!(found.unwrap().port, 7001);
    }

    #[tokio::test]
    async fn unregistered_node_resolves_to_none() {
        let overlay = MockOverlay::new();
        let id = hash_bytes(b"missing");
        assert!(overlay.find_node(&id).await.is_none());
    }

    #[tokio::test]
    async fn known_peer_resolver_resolves_only_already_known_peers() {
        use crate::geo::Geo;
        use crate::station_registry::{StationItem, StationRegistry};

        let mut registry = StationRegistry::new(hash_bytes(b"self"));
        let known_id = hash_bytes(b"known-peer");
        registry.update(StationItem::new(
            NodeAddr::new(known_id, "10.0.0.5", 7005),
            Geo::null(),
            "known",
        ));

        let resolver = KnownPeerResolver::snapshot(&registry);
        assert_eq!(resolver.find_node(&known_id).await.unwrap().port, 7005);
        assert!(resolver.find_node(&hash_bytes(b"never-contacted")).await.is_none());
    }

    #[tokio::test]
    async fn client_get_returns_registered_response() {
        let overlay = MockOverlay::new();
        let id = hash_bytes(b"peer-b");
        let addr = NodeAddr::new(id, "10.0.0.2", 7002);
        overlay.register_node(addr.clone());
        overlay.register_response(id, "/status", 200, b"{}".to_vec());
        let resp = overlay.get(&addr, "/status").await.unwrap();
        assert!(resp.is_ok());
    }
}
