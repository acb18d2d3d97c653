//! Resource catalog and peer registry.
//!
//! Both are append-only interning tables. `get_or_create_*` locks the
//! uniqueness key first, so two writers interning the same text or key
//! serialize instead of inserting twice.

use crate::error::{Error, Result};
use crate::keys;
use crate::storage::{KvRead, WriteTxn};
use tagstore_core::{Peer, PeerId, PublicKey, Resource, ResourceId};

// --- Resources ---

/// Get the resource for `text`, creating it if needed.
pub fn get_or_create_resource(txn: &WriteTxn<'_>, text: &str) -> Result<Resource> {
    let by_text = keys::resource_by_text(text);
    if let Some(id) = txn.get_id_for_update(&by_text)? {
        return resource(txn, ResourceId(id));
    }

    let resource = Resource::new(ResourceId(txn.next_id(keys::RESOURCES)?), text);
    txn.put_json(&keys::resource(resource.id), &resource)?;
    txn.put_id(&by_text, resource.id.0)?;
    txn.put_raw(
        &keys::resource_by_lowercase(&resource.text_lowercase, resource.id),
        &[],
    )?;
    Ok(resource)
}

/// Load a resource that an index or statement points to.
pub fn resource<R: KvRead>(r: &R, id: ResourceId) -> Result<Resource> {
    r.get_json(&keys::resource(id))?
        .ok_or_else(|| Error::Corrupted(format!("resource {id} is referenced but missing")))
}

/// Exact lookup.
pub fn find_resource<R: KvRead>(r: &R, text: &str) -> Result<Option<Resource>> {
    match r.get_id(&keys::resource_by_text(text))? {
        Some(id) => resource(r, ResourceId(id)).map(Some),
        None => Ok(None),
    }
}

/// Every resource matching `text`, exactly or case-insensitively.
///
/// Case-insensitive results come back in creation order.
pub fn find_resources<R: KvRead>(r: &R, text: &str, case_sensitive: bool) -> Result<Vec<Resource>> {
    if case_sensitive {
        return Ok(find_resource(r, text)?.into_iter().collect());
    }
    r.scan_ids(&keys::resources_by_lowercase(&text.to_lowercase()))?
        .into_iter()
        .map(|id| resource(r, ResourceId(id)))
        .collect()
}

// --- Peers ---

/// Get the peer for `public_key`, creating it if needed.
pub fn get_or_create_peer(txn: &WriteTxn<'_>, public_key: &PublicKey) -> Result<Peer> {
    let by_key = keys::peer_by_key(public_key);
    if let Some(id) = txn.get_id_for_update(&by_key)? {
        return peer(txn, PeerId(id));
    }

    let peer = Peer {
        id: PeerId(txn.next_id(keys::PEERS)?),
        public_key: public_key.clone(),
    };
    txn.put_json(&keys::peer(peer.id), &peer)?;
    txn.put_id(&by_key, peer.id.0)?;
    Ok(peer)
}

pub fn peer<R: KvRead>(r: &R, id: PeerId) -> Result<Peer> {
    r.get_json(&keys::peer(id))?
        .ok_or_else(|| Error::Corrupted(format!("peer {id} is referenced but missing")))
}

pub fn find_peer<R: KvRead>(r: &R, public_key: &PublicKey) -> Result<Option<Peer>> {
    match r.get_id(&keys::peer_by_key(public_key))? {
        Some(id) => peer(r, PeerId(id)).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use tempfile::tempdir;

    #[test]
    fn get_or_create_peer_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let key = PublicKey::new(b"123".to_vec());

        assert_eq!(storage.read(|r| r.last_id(keys::PEERS)).unwrap(), 0);

        let created = storage.write(|txn| get_or_create_peer(txn, &key)).unwrap();
        assert_eq!(created.public_key, key);

        let fetched = storage.write(|txn| get_or_create_peer(txn, &key)).unwrap();
        assert_eq!(fetched, created);
        assert_eq!(storage.read(|r| r.last_id(keys::PEERS)).unwrap(), 1);
    }

    #[test]
    fn resources_intern_by_exact_text() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let (a, b, c) = storage
            .write(|txn| {
                Ok((
                    get_or_create_resource(txn, "ubuntu")?,
                    get_or_create_resource(txn, "Ubuntu")?,
                    get_or_create_resource(txn, "ubuntu")?,
                ))
            })
            .unwrap();

        assert_eq!(a, c);
        assert_ne!(a.id, b.id);
        assert_eq!(storage.read(|r| r.last_id(keys::RESOURCES)).unwrap(), 2);
    }

    #[test]
    fn case_insensitive_lookup() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        storage
            .write(|txn| {
                for text in ["ubuntu", "Ubuntu", "UBUNTU", "ubuntu-server"] {
                    get_or_create_resource(txn, text)?;
                }
                Ok(())
            })
            .unwrap();

        storage
            .read(|r| {
                let texts = |found: Vec<Resource>| found.into_iter().map(|res| res.text).collect::<Vec<_>>();

                assert_eq!(texts(find_resources(r, "uBuNtU", false)?), ["ubuntu", "Ubuntu", "UBUNTU"]);
                assert_eq!(texts(find_resources(r, "Ubuntu", true)?), ["Ubuntu"]);
                assert!(find_resources(r, "debian", false)?.is_empty());
                assert!(find_resource(r, "UBUNTU ")?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
