//! Outbound queries against peer stations.
//!
//! Grounded on `lib/query.hh`'s `JsonQuery` family and `DownloadDataSetQuery`.
//! The original models each query as a self-destructing `QObject` that walks
//! resolve → connect → request → decode via callbacks firing into Qt's event
//! loop. Async/await collapses that phase machine into a single function per
//! query; each one still resolves the peer through [`NodeResolver`] before
//! issuing a request through [`StationClient`], so the phase boundaries the
//! original documents (resolution failure vs. transport failure vs. bad
//! body) are preserved as distinct [`Error`] variants.

use crate::dataset_store::DatasetStore;
use crate::error::Error;
use crate::identifier::Identifier;
use crate::overlay::{NodeResolver, StationClient};
use crate::schedule::ScheduledEvent;
use std::collections::HashMap;

async fn resolve_and_get(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
    path: &str,
) -> Result<serde_json::Value, Error> {
    let peer = resolver.find_node(remote).await.ok_or(Error::NotFound)?;
    let response = client.get(&peer, path).await?;
    if !response.is_ok() {
        return Err(Error::HttpNonOk {
            code: response.status,
        });
    }
    response.json()
}

/// `/status` — mirrors `StationInfoQuery`. Returns the raw JSON body; the
/// caller (typically `StationRegistry::update`) is responsible for turning
/// it into a `StationItem` once it has a `NodeAddr` to attach.
pub async fn station_info(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
) -> Result<serde_json::Value, Error> {
    resolve_and_get(resolver, client, remote, "/status").await
}

/// `/list` — mirrors `StationListQuery`.
pub async fn station_list(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
) -> Result<Vec<Identifier>, Error> {
    let body = resolve_and_get(resolver, client, remote, "/list").await?;
    let items = body
        .as_array()
        .ok_or_else(|| Error::InvalidFormat("station list body is not a JSON array".into()))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| Error::InvalidFormat("station list entry is not a string".into()))
                .and_then(|s| {
                    Identifier::from_base32(s)
                        .map_err(|_| Error::InvalidFormat(format!("invalid identifier in list: {s}")))
                })
        })
        .collect()
}

/// `/schedule` — mirrors `StationScheduleQuery`.
pub async fn station_schedule(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
) -> Result<Vec<ScheduledEvent>, Error> {
    let body = resolve_and_get(resolver, client, remote, "/schedule").await?;
    let items = body
        .as_array()
        .ok_or_else(|| Error::InvalidFormat("schedule body is not a JSON array".into()))?;
    items.iter().map(ScheduledEvent::from_json).collect()
}

/// `/data` — mirrors `DataSetListQuery`. Returns the advertised catalog as
/// `Identifier -> metadata`, the shape [`DatasetStore::catalog_json`]
/// produces on the serving side.
pub async fn dataset_catalog(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
) -> Result<HashMap<Identifier, serde_json::Value>, Error> {
    let body = resolve_and_get(resolver, client, remote, "/data").await?;
    let obj = body
        .as_object()
        .ok_or_else(|| Error::InvalidFormat("dataset catalog body is not a JSON object".into()))?;
    obj.iter()
        .map(|(key, value)| {
            Identifier::from_base32(key)
                .map(|id| (id, value.clone()))
                .map_err(|_| Error::InvalidFormat(format!("invalid identifier key in catalog: {key}")))
        })
        .collect()
}

/// `/data/<id>` — mirrors `DownloadDataSetQuery`. Streams the response body
/// and verifies it hashes to `dataset_id` before admitting it into `store`;
/// a hash mismatch is a tampered-or-corrupt transfer, not merely a bad body,
/// so it is surfaced through the same path as [`DatasetStore::insert`].
pub async fn download_dataset(
    resolver: &dyn NodeResolver,
    client: &dyn StationClient,
    remote: &Identifier,
    dataset_id: Identifier,
    store: &mut DatasetStore,
) -> Result<Identifier, Error> {
    let peer = resolver.find_node(remote).await.ok_or(Error::NotFound)?;
    let path = format!("/data/{}", dataset_id.to_base32());
    let response = client.get(&peer, &path).await?;
    if !response.is_ok() {
        return Err(Error::HttpNonOk {
            code: response.status,
        });
    }
    store.insert(dataset_id, &response.body)
}
