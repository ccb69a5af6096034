//! The composition root: owns identity, location, dataset store, merged
//! schedule, and peer registry, and answers the `vlf::station` HTTP
//! surface. Grounded on `lib/station.hh`/`station.cc`'s `Station : Node,
//! HttpRequestHandler`.
//!
//! The original holds all of this state directly on the Qt event loop
//! thread and mutates it from slots. Axum's `State` extractor requires
//! `Send + Sync`, which rules out holding `Station` behind a bare
//! `Rc<RefCell<_>>` the way a single-threaded event loop normally would.
//! Rather than reach for `Arc<Mutex<_>>` (a real lock, which §5 rules out
//! for the core), this crate owns `Station` on a single dedicated task and
//! talks to it through an actor mailbox — the same `mpsc::Receiver`-driven
//! worker-task idiom the teacher already uses for `persist_worker`,
//! generalized from "one background consumer" to "the one task that is
//! ever allowed to mutate station state". `StationHandle` is the cheap,
//! `Clone + Send + Sync` mailbox end that axum handlers hold; it never
//! touches `Station` fields directly.

use crate::bootstrap;
use crate::config;
use crate::dataset_store::DatasetStore;
use crate::error::Error;
use crate::geo::Geo;
use crate::identifier::Identifier;
use crate::merged_schedule::MergedSchedule;
use crate::overlay::{KnownPeerResolver, NodeAddr, NodeResolver, StationClient};
use crate::query;
use crate::receiver::Receiver;
use crate::remote_catalog::RemoteCatalog;
use crate::schedule::{LocalSchedule, ScheduleView};
use crate::socks::SocksEgress;
use crate::station_registry::{RegistryTickAction, StationItem, StationRegistry};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Interval of the bootstrap timer, per §4.9/§5.
pub const BOOTSTRAP_INTERVAL_SECS: u64 = 60;
/// Interval of the registry maintenance tick, per §5.
pub const REGISTRY_TICK_INTERVAL_SECS: u64 = 600;

pub struct Station {
    id: Identifier,
    data_root: PathBuf,
    location: Geo,
    store: DatasetStore,
    schedule: MergedSchedule,
    registry: StationRegistry,
    remote_catalog: RemoteCatalog,
    receiver: Receiver,
    ctrl_whitelist: HashSet<Identifier>,
    socks: SocksEgress,
}

impl Station {
    pub fn open(data_root: impl Into<PathBuf>, max_cost: f64) -> Result<Self, Error> {
        let data_root = data_root.into();
        std::fs::create_dir_all(&data_root)?;

        let id = load_or_create_identity(&data_root)?;
        let location = config::load_location(&data_root);
        let store = DatasetStore::open(data_root.join("data"))?;
        let local = LocalSchedule::load(data_root.join("schedule.json"));
        let schedule = MergedSchedule::new(local, max_cost);
        let sample_rate_hz = config::load_sample_rate_hz(&data_root);
        let socks = SocksEgress::load(&data_root.join("sockswhitelist.json"));

        Ok(Station {
            id,
            data_root,
            location,
            store,
            schedule,
            registry: StationRegistry::new(id),
            remote_catalog: RemoteCatalog::new(),
            receiver: Receiver::new(location, sample_rate_hz),
            ctrl_whitelist: HashSet::new(),
            socks,
        })
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    /// `/status` response body, mirrors `Station::processRequest`'s
    /// `{id, location}` assembly.
    pub fn status_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id.to_base32(),
            "location": self.location.to_json(),
        })
    }

    /// `/list` response body.
    pub fn station_list_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.registry
                .known()
                .iter()
                .map(|s| serde_json::Value::String(s.id().to_base32()))
                .collect(),
        )
    }

    /// `/schedule` response body.
    pub fn schedule_json(&self) -> serde_json::Value {
        self.schedule.to_json()
    }

    /// `/data` response body: this station's own catalog.
    pub fn dataset_catalog_json(&self) -> serde_json::Value {
        self.store.catalog_json()
    }

    /// `/data/<id>` raw bytes, or `NotFound` if the id isn't held locally.
    pub fn dataset_bytes(&self, id: &Identifier) -> Result<Vec<u8>, Error> {
        let file = self.store.get(id).ok_or(Error::NotFound)?;
        std::fs::read(file.path()).map_err(Error::from)
    }

    /// Acceptance check for `POST /ctrl/<subpath>`, mirrors
    /// `Station::acceptReqest`'s whitelist gate.
    pub fn accepts_ctrl(&self, peer_id: &Identifier) -> bool {
        self.ctrl_whitelist.contains(peer_id)
    }

    pub fn allow_socks(&self, peer_id: &Identifier) -> bool {
        self.socks.allow(peer_id)
    }

    /// Reads `bootstrap.json` and returns the seeds to ping. Mirrors
    /// `Station::_onBootstrap`.
    pub fn bootstrap_seeds(&self) -> Vec<(String, u16)> {
        bootstrap::load(&self.data_root.join("bootstrap.json"))
    }

    /// One step of peer-registry maintenance: drains a candidate or picks
    /// a random known station to refresh, mirrors
    /// `StationList::_onUpdateNetwork`.
    pub fn registry_tick(&mut self) -> RegistryTickAction {
        self.registry.tick()
    }

    pub fn schedule_tick(&mut self) {
        self.schedule.tick(Utc::now());
    }

    pub fn add_candidates(&mut self, ids: impl IntoIterator<Item = Identifier>) {
        self.registry.add_candidates(ids);
    }

    pub async fn contact_station(
        &mut self,
        resolver: &dyn NodeResolver,
        client: &dyn StationClient,
        remote_id: Identifier,
    ) {
        let Ok(body) = query::station_info(resolver, client, &remote_id).await else {
            return;
        };
        let Some(node) = resolver.find_node(&remote_id).await else {
            return;
        };
        let Some(location) = body.get("location").and_then(|v| Geo::from_json(v).ok()) else {
            return;
        };
        self.registry.update(StationItem::new(node, location, String::new()));
    }

    /// Contacts a bootstrap seed directly by address, since seeds are given
    /// as `(host, port)` rather than identifiers — no [`NodeResolver`] lookup
    /// is needed to reach them. Learns the peer's real id and location from
    /// its `/status` response and folds it into the registry, mirroring
    /// `Node::bootstrap`'s use of `BootstrapList` entries.
    pub async fn contact_seed(&mut self, client: &dyn StationClient, host: &str, port: u16) {
        let placeholder = NodeAddr::new(Identifier::zero(), host, port);
        let Ok(response) = client.get(&placeholder, "/status").await else {
            return;
        };
        if !response.is_ok() {
            return;
        }
        let Ok(body) = response.json() else { return };
        let Some(id) = body
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| Identifier::from_base32(s).ok())
        else {
            return;
        };
        let Some(location) = body.get("location").and_then(|v| Geo::from_json(v).ok()) else {
            return;
        };
        self.registry
            .update(StationItem::new(NodeAddr::new(id, host, port), location, String::new()));
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    /// Subscribes to "station updated" so the caller can react by refreshing
    /// that peer's schedule and catalog, mirroring spec's "the aggregator
    /// subscribes to StationRegistry's 'station updated' signal".
    pub fn subscribe_station_updated(&mut self) -> mpsc::UnboundedReceiver<Identifier> {
        self.registry.station_updated.subscribe()
    }

    pub async fn refresh_remote_schedule(
        &mut self,
        resolver: &dyn NodeResolver,
        client: &dyn StationClient,
        remote_id: Identifier,
    ) {
        if let Ok(events) = query::station_schedule(resolver, client, &remote_id).await {
            for event in events {
                self.schedule.add_remote(remote_id, event);
            }
        }
    }

    pub async fn refresh_remote_catalog(
        &mut self,
        resolver: &dyn NodeResolver,
        client: &dyn StationClient,
        remote_id: Identifier,
    ) {
        if let Ok(catalog) = query::dataset_catalog(resolver, client, &remote_id).await {
            self.remote_catalog.ingest(remote_id, catalog);
        }
    }

    pub fn remote_catalog(&self) -> &RemoteCatalog {
        &self.remote_catalog
    }

    pub async fn fetch_dataset(
        &mut self,
        resolver: &dyn NodeResolver,
        client: &dyn StationClient,
        remote_id: Identifier,
        dataset_id: Identifier,
    ) -> Result<Identifier, Error> {
        query::download_dataset(resolver, client, &remote_id, dataset_id, &mut self.store).await
    }
}

fn load_or_create_identity(data_root: &Path) -> Result<Identifier, Error> {
    let path = data_root.join("identity.pem");
    if let Ok(bytes) = std::fs::read(&path) {
        if bytes.len() >= crate::identifier::HASH_SIZE {
            let mut buf = [0u8; crate::identifier::HASH_SIZE];
            buf.copy_from_slice(&bytes[..crate::identifier::HASH_SIZE]);
            return Ok(Identifier::from_bytes(buf));
        }
        warn!(path = %path.display(), "identity file is malformed, regenerating");
    }
    let fresh: [u8; crate::identifier::HASH_SIZE] = rand::random();
    std::fs::write(&path, fresh)?;
    info!(path = %path.display(), "created new station identity");
    Ok(Identifier::from_bytes(fresh))
}

/// Commands the actor mailbox accepts; each variant carries the reply
/// channel for the data the caller needs back.
pub enum StationCommand {
    Status(oneshot::Sender<serde_json::Value>),
    StationList(oneshot::Sender<serde_json::Value>),
    Schedule(oneshot::Sender<serde_json::Value>),
    DatasetCatalog(oneshot::Sender<serde_json::Value>),
    DatasetBytes(Identifier, oneshot::Sender<Result<Vec<u8>, Error>>),
    AcceptsCtrl(Identifier, oneshot::Sender<bool>),
    /// Fires `Station::bootstrap_seeds`, mirrors `_onBootstrap`.
    BootstrapTick(oneshot::Sender<Vec<(String, u16)>>),
    /// Fires `Station::registry_tick`, mirrors `_onUpdateNetwork`.
    RegistryTick(oneshot::Sender<RegistryTickAction>),
    /// Fires `Station::schedule_tick`; no reply data, just an ack.
    ScheduleTick(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct StationHandle {
    tx: mpsc::Sender<StationCommand>,
}

impl StationHandle {
    pub fn new(tx: mpsc::Sender<StationCommand>) -> Self {
        StationHandle { tx }
    }

    async fn call<T>(&self, make_cmd: impl FnOnce(oneshot::Sender<T>) -> StationCommand) -> Result<T, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make_cmd(reply_tx))
            .await
            .map_err(|_| Error::NotFound)?;
        reply_rx.await.map_err(|_| Error::NotFound)
    }

    pub async fn status(&self) -> Result<serde_json::Value, Error> {
        self.call(StationCommand::Status).await
    }

    pub async fn station_list(&self) -> Result<serde_json::Value, Error> {
        self.call(StationCommand::StationList).await
    }

    pub async fn schedule(&self) -> Result<serde_json::Value, Error> {
        self.call(StationCommand::Schedule).await
    }

    pub async fn dataset_catalog(&self) -> Result<serde_json::Value, Error> {
        self.call(StationCommand::DatasetCatalog).await
    }

    pub async fn dataset_bytes(&self, id: Identifier) -> Result<Vec<u8>, Error> {
        self.call(|tx| StationCommand::DatasetBytes(id, tx)).await?
    }

    pub async fn accepts_ctrl(&self, peer_id: Identifier) -> Result<bool, Error> {
        self.call(|tx| StationCommand::AcceptsCtrl(peer_id, tx)).await
    }

    pub async fn bootstrap_tick(&self) -> Result<Vec<(String, u16)>, Error> {
        self.call(StationCommand::BootstrapTick).await
    }

    pub async fn registry_tick(&self) -> Result<RegistryTickAction, Error> {
        self.call(StationCommand::RegistryTick).await
    }

    pub async fn schedule_tick(&self) -> Result<(), Error> {
        self.call(StationCommand::ScheduleTick).await
    }
}

/// The single task allowed to mutate `Station`. Owns it outright — no
/// `Arc`, no lock, because nothing else ever reaches in past the mailbox.
/// Reads commands off the mailbox until every `StationHandle` has been
/// dropped, and also drains `Station`'s own "station updated" signal so a
/// registry update immediately triggers schedule/catalog refresh for that
/// peer (spec: "the aggregator subscribes to StationRegistry's 'station
/// updated' signal"). `client` is the `vlf::station` transport used for all
/// outbound queries this task issues; resolution of a peer's address is
/// done per call from a fresh [`KnownPeerResolver`] snapshot of the
/// registry, since the registry only this task ever mutates.
pub async fn run_station_actor(
    mut station: Station,
    mut rx: mpsc::Receiver<StationCommand>,
    client: Arc<dyn StationClient>,
) {
    let mut station_updated = station.subscribe_station_updated();
    loop {
        tokio::select! {
            maybe_cmd = rx.recv() => {
                let Some(cmd) = maybe_cmd else { break };
                match cmd {
                    StationCommand::Status(reply) => {
                        let _ = reply.send(station.status_json());
                    }
                    StationCommand::StationList(reply) => {
                        let _ = reply.send(station.station_list_json());
                    }
                    StationCommand::Schedule(reply) => {
                        let _ = reply.send(station.schedule_json());
                    }
                    StationCommand::DatasetCatalog(reply) => {
                        let _ = reply.send(station.dataset_catalog_json());
                    }
                    StationCommand::DatasetBytes(id, reply) => {
                        let _ = reply.send(station.dataset_bytes(&id));
                    }
                    StationCommand::AcceptsCtrl(peer_id, reply) => {
                        let _ = reply.send(station.accepts_ctrl(&peer_id));
                    }
                    StationCommand::BootstrapTick(reply) => {
                        let seeds = station.bootstrap_seeds();
                        let _ = reply.send(seeds.clone());
                        for (host, port) in seeds {
                            station.contact_seed(client.as_ref(), &host, port).await;
                        }
                    }
                    StationCommand::RegistryTick(reply) => {
                        let action = station.registry_tick();
                        let _ = reply.send(action);
                        match action {
                            RegistryTickAction::ContactCandidate(id) => {
                                let resolver = KnownPeerResolver::snapshot(station.registry());
                                station.contact_station(&resolver, client.as_ref(), id).await;
                            }
                            RegistryTickAction::RefreshKnown(id) => {
                                let resolver = KnownPeerResolver::snapshot(station.registry());
                                station.contact_station(&resolver, client.as_ref(), id).await;
                                if let Ok(peer_ids) = query::station_list(&resolver, client.as_ref(), &id).await {
                                    station.add_candidates(peer_ids);
                                }
                            }
                            RegistryTickAction::Idle => {}
                        }
                    }
                    StationCommand::ScheduleTick(reply) => {
                        station.schedule_tick();
                        let _ = reply.send(());
                    }
                }
            }
            Some(peer_id) = station_updated.recv() => {
                let resolver = KnownPeerResolver::snapshot(station.registry());
                station.refresh_remote_schedule(&resolver, client.as_ref(), peer_id).await;
                station.refresh_remote_catalog(&resolver, client.as_ref(), peer_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_identity_and_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let station1 = Station::open(dir.path(), 28.0).unwrap();
        let id1 = station1.id();
        drop(station1);
        let station2 = Station::open(dir.path(), 28.0).unwrap();
        assert_eq!(id1, station2.id());
    }

    #[test]
    fn status_json_has_id_and_location() {
        let dir = tempfile::tempdir().unwrap();
        let station = Station::open(dir.path(), 28.0).unwrap();
        let status = station.status_json();
        assert!(status.get("id").is_some());
        assert!(status.get("location").is_some());
    }

    #[test]
    fn unknown_dataset_download_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let station = Station::open(dir.path(), 28.0).unwrap();
        let missing = Identifier::zero();
        assert!(matches!(station.dataset_bytes(&missing), Err(Error::NotFound)));
    }

    #[test]
    fn ctrl_whitelist_is_empty_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let station = Station::open(dir.path(), 28.0).unwrap();
        assert!(!station.accepts_ctrl(&Identifier::zero()));
    }

    #[tokio::test]
    async fn contact_seed_learns_real_id_and_updates_registry() {
        use crate::overlay::test_support::MockOverlay;

        let dir = tempfile::tempdir().unwrap();
        let mut station = Station::open(dir.path(), 28.0).unwrap();
        let seed_id = crate::identifier::hash_bytes(b"seed-station");

        let overlay = MockOverlay::new();
        overlay.register_response(
            Identifier::zero(),
            "/status",
            200,
            serde_json::to_vec(&serde_json::json!({
                "id": seed_id.to_base32(),
                "location": Geo::new(1.0, 2.0, 3.0).to_json(),
            }))
            .unwrap(),
        );

        station.contact_seed(&overlay, "10.0.0.9", 7009).await;

        assert_eq!(station.registry().known().len(), 1);
        assert_eq!(station.registry().known()[0].id(), seed_id);
        assert_eq!(station.registry().known()[0].node().port, 7009);
    }

    #[tokio::test]
    async fn actor_bootstrap_tick_contacts_seeds_and_updates_registry() {
        use crate::overlay::test_support::MockOverlay;
        use std::sync::Arc as StdArc;

        let dir = tempfile::tempdir().unwrap();
        let seed_id = crate::identifier::hash_bytes(b"bootstrapped-peer");
        bootstrap::append(&dir.path().join("bootstrap.json"), "10.0.0.10", 7010).unwrap();

        let station = Station::open(dir.path(), 28.0).unwrap();

        let overlay = StdArc::new(MockOverlay::new());
        overlay.register_response(
            Identifier::zero(),
            "/status",
            200,
            serde_json::to_vec(&serde_json::json!({
                "id": seed_id.to_base32(),
                "location": Geo::new(4.0, 5.0, 6.0).to_json(),
            }))
            .unwrap(),
        );

        let (tx, rx) = mpsc::channel(8);
        let handle = StationHandle::new(tx);
        let client: Arc<dyn StationClient> = overlay;
        let actor = tokio::spawn(run_station_actor(station, rx, client));

        let seeds = handle.bootstrap_tick().await.unwrap();
        assert_eq!(seeds, vec![("10.0.0.10".to_string(), 7010)]);

        // give the actor a chance to finish contacting the seed before asking
        // it anything else over the same mailbox.
        let list = handle.station_list().await.unwrap();
        let stations = list.as_array().unwrap();
        assert!(stations.iter().any(|s| s.as_str() == Some(seed_id.to_base32().as_str())));

        actor.abort();
    }
}
