//! Storage collaborator
//!
//! Storage only ever sees hub-shaped JSON. [`MemoryStore`] and
//! [`StorageHandler`] are reference implementations used by the CLI and
//! tests; real backends implement [`HubStore`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::envelope::VersionedEnvelope;
use crate::error::{HubError, Result};
use crate::negotiate::{HubRequest, Operation, RequestContext, ResourceHandler};

/// Persistence of hub JSON records keyed by `(kind, uid)`
pub trait HubStore: Send + Sync {
    fn save(&self, ctx: &RequestContext, kind: &str, uid: &str, hub_json: &[u8]) -> Result<()>;

    /// Fails with [`HubError::NotFound`] for unknown records
    fn load(&self, ctx: &RequestContext, kind: &str, uid: &str) -> Result<Vec<u8>>;

    /// Fails with [`HubError::NotFound`] for unknown records
    fn delete(&self, ctx: &RequestContext, kind: &str, uid: &str) -> Result<()>;
}

type Records = HashMap<(String, String), Vec<u8>>;

/// In-memory store; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored bytes, bypassing any request context
    pub fn raw(&self, kind: &str, uid: &str) -> Option<Vec<u8>> {
        self.records
            .read()
            .ok()?
            .get(&(kind.to_string(), uid.to_string()))
            .cloned()
    }
}

fn poisoned<T>(_: T) -> HubError {
    HubError::Storage("memory store lock poisoned".to_string())
}

fn not_found(kind: &str, uid: &str) -> HubError {
    HubError::NotFound {
        kind: kind.to_string(),
        uid: uid.to_string(),
    }
}

impl HubStore for MemoryStore {
    fn save(&self, _ctx: &RequestContext, kind: &str, uid: &str, hub_json: &[u8]) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert((kind.to_string(), uid.to_string()), hub_json.to_vec());
        Ok(())
    }

    fn load(&self, _ctx: &RequestContext, kind: &str, uid: &str) -> Result<Vec<u8>> {
        let records = self.records.read().map_err(poisoned)?;
        records
            .get(&(kind.to_string(), uid.to_string()))
            .cloned()
            .ok_or_else(|| not_found(kind, uid))
    }

    fn delete(&self, _ctx: &RequestContext, kind: &str, uid: &str) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records
            .remove(&(kind.to_string(), uid.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found(kind, uid))
    }
}

/// CRUD handler over a [`HubStore`].
///
/// Assigns `metadata.uid` and the creation timestamp on create; updates keep
/// both and set the update timestamp.
#[derive(Debug, Clone)]
pub struct StorageHandler<S> {
    store: S,
}

impl<S: HubStore> StorageHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_object(&self, ctx: &RequestContext, kind: &str, uid: &str) -> Result<VersionedEnvelope> {
        let raw = self.store.load(ctx, kind, uid)?;
        serde_json::from_slice(&raw).map_err(|e| HubError::Storage(format!("stored {} '{}' is corrupt: {}", kind, uid, e)))
    }

    fn save_object(&self, ctx: &RequestContext, kind: &str, uid: &str, object: &VersionedEnvelope) -> Result<()> {
        let raw = serde_json::to_vec(object)?;
        self.store.save(ctx, kind, uid, &raw)
    }
}

fn require_object(request: HubRequest) -> Result<VersionedEnvelope> {
    request.object.ok_or_else(|| HubError::RequestDecode {
        api_version: request.gvk.api_version(),
        kind: request.gvk.kind.clone(),
        reason: "request carries no object".to_string(),
    })
}

impl<S: HubStore> ResourceHandler for StorageHandler<S> {
    fn dispatch(&self, ctx: &RequestContext, request: HubRequest) -> Result<Option<VersionedEnvelope>> {
        let kind = request.gvk.kind.clone();
        match request.operation.clone() {
            Operation::Create => {
                let mut object = require_object(request)?;
                let uid = Uuid::new_v4().to_string();
                object.metadata.uid = Some(uid.clone());
                object.metadata.creation_timestamp = Some(Utc::now());
                object.metadata.update_timestamp = None;
                self.save_object(ctx, &kind, &uid, &object)?;
                debug!(kind = %kind, uid = %uid, "created");
                Ok(Some(object))
            }
            Operation::Get { uid } => self.load_object(ctx, &kind, &uid).map(Some),
            Operation::Update { uid } => {
                let existing = self.load_object(ctx, &kind, &uid)?;
                let mut object = require_object(request)?;
                object.metadata.uid = Some(uid.clone());
                object.metadata.creation_timestamp = existing.metadata.creation_timestamp;
                object.metadata.update_timestamp = Some(Utc::now());
                self.save_object(ctx, &kind, &uid, &object)?;
                debug!(kind = %kind, uid = %uid, "updated");
                Ok(Some(object))
            }
            Operation::Delete { uid } => {
                self.store.delete(ctx, &kind, &uid)?;
                debug!(kind = %kind, uid = %uid, "deleted");
                Ok(None)
            }
        }
    }
}
