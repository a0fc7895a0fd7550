//! Reference-counted share handle cache
//!
//! Objects that address the same share with the same credentials share one
//! [`ShareHandle`]. Every attached object holds a [`ShareLease`]; the handle
//! is closed when its last lease is released.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::error::{VfsError, VfsResult};
use crate::protocols::smb::{
    establish, AuthenticationContext, DiskShare, ShareHandle, ShareTarget, SmbTransport,
};
use secrecy::ExposeSecret;

/// Pool key: endpoint plus the full credential set
///
/// Host, share and user compare case-insensitively; the password is part of
/// the key so that differing credentials never share a session.
#[derive(Clone)]
pub struct ShareKey {
    host: String,
    port: u16,
    share: String,
    username: String,
    domain: String,
    password: Zeroizing<String>,
}

impl ShareKey {
    pub fn new(target: &ShareTarget, auth: &AuthenticationContext) -> Self {
        Self {
            host: target.host.to_lowercase(),
            port: target.port,
            share: target.share.to_lowercase(),
            username: auth.username.to_lowercase(),
            domain: auth.domain.to_lowercase(),
            password: Zeroizing::new(auth.password.expose_secret().to_string()),
        }
    }
}

impl PartialEq for ShareKey {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.share == other.share
            && self.username == other.username
            && self.domain == other.domain
            && self.password.as_str() == other.password.as_str()
    }
}

impl Eq for ShareKey {}

impl Hash for ShareKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.share.hash(state);
        self.username.hash(state);
        self.domain.hash(state);
    }
}

impl fmt::Debug for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r"ShareKey({}\{}@{}:{}/{})",
            self.domain, self.username, self.host, self.port, self.share
        )
    }
}

/// One object's counted reference to a pooled share handle
#[derive(Debug)]
pub struct ShareLease {
    key: ShareKey,
    handle: Arc<ShareHandle>,
}

impl ShareLease {
    pub fn handle(&self) -> &ShareHandle {
        &self.handle
    }

    pub fn share(&self) -> &Arc<dyn DiskShare> {
        self.handle.share()
    }
}

struct PoolEntry {
    handle: Arc<ShareHandle>,
    leases: usize,
}

/// Per-key state; its lock is held while a handle is established
#[derive(Default)]
struct Slot {
    entry: Option<PoolEntry>,
    /// Removed from the map; acquirers holding a stale reference retry
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Keyed cache of established share handles
pub struct ShareHandleCache {
    transport: Arc<dyn SmbTransport>,
    slots: Mutex<HashMap<ShareKey, SlotRef>>,
}

impl fmt::Debug for ShareHandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareHandleCache").finish_non_exhaustive()
    }
}

impl ShareHandleCache {
    pub fn new(transport: Arc<dyn SmbTransport>) -> Self {
        Self {
            transport,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &ShareKey) -> SlotRef {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Drop `slot` from the map unless it was already replaced
    ///
    /// Called with the slot's own lock held; the map lock is never held
    /// while waiting for a slot.
    async fn retire(&self, key: &ShareKey, slot: &SlotRef, state: &mut Slot) {
        state.retired = true;
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Lease a handle for `target`, establishing one if none is pooled
    ///
    /// Establishment runs under the key's own lock: concurrent callers for
    /// one key never create two handles, and callers for other keys do not
    /// wait on it.
    #[tracing::instrument(skip(self, auth), fields(endpoint = %target.unc(), user = %auth.principal()))]
    pub async fn acquire(
        &self,
        target: &ShareTarget,
        auth: &AuthenticationContext,
    ) -> VfsResult<ShareLease> {
        let key = ShareKey::new(target, auth);

        loop {
            let slot = self.slot(&key).await;
            let mut state = slot.lock().await;
            if state.retired {
                continue;
            }

            if let Some(entry) = state.entry.as_mut() {
                if !entry.handle.is_closed() {
                    entry.leases += 1;
                    tracing::debug!("Reusing share handle ({} leases)", entry.leases);
                    return Ok(ShareLease {
                        key,
                        handle: Arc::clone(&entry.handle),
                    });
                }
                // A closed handle left behind is replaced
                state.entry = None;
            }

            let handle = match establish(self.transport.as_ref(), target, auth).await {
                Ok(handle) => Arc::new(handle),
                Err(e) => {
                    self.retire(&key, &slot, &mut state).await;
                    return Err(VfsError::from_establish(e, &target.unc()));
                }
            };
            state.entry = Some(PoolEntry {
                handle: Arc::clone(&handle),
                leases: 1,
            });

            return Ok(ShareLease { key, handle });
        }
    }

    /// Give a lease back; the last lease closes the handle
    pub async fn release(&self, lease: ShareLease) -> VfsResult<()> {
        let slot = {
            let slots = self.slots.lock().await;
            match slots.get(&lease.key) {
                Some(slot) => Arc::clone(slot),
                // Pool was closed under this lease
                None => return Ok(()),
            }
        };

        let last = {
            let mut state = slot.lock().await;
            let remaining = match state.entry.as_mut() {
                Some(entry) if Arc::ptr_eq(&entry.handle, &lease.handle) => {
                    entry.leases -= 1;
                    Some(entry.leases)
                }
                // Entry replaced under this lease
                _ => None,
            };
            if remaining == Some(0) {
                state.entry = None;
                self.retire(&lease.key, &slot, &mut state).await;
                true
            } else {
                false
            }
        };

        if last {
            let unc = lease.handle.target().unc();
            tracing::debug!("Last lease released, closing {}", unc);
            lease
                .handle
                .close()
                .await
                .map_err(|e| VfsError::from_establish(e, &unc))?;
        }
        Ok(())
    }

    /// Number of pooled handles
    pub async fn len(&self) -> usize {
        let slots: Vec<SlotRef> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.entry.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every pooled handle regardless of outstanding leases
    ///
    /// Every handle is closed; the first failure is returned.
    pub async fn close_all(&self) -> VfsResult<()> {
        let drained: Vec<SlotRef> = {
            let mut slots = self.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };

        let mut first_error = None;
        for slot in drained {
            let entry = {
                let mut state = slot.lock().await;
                state.retired = true;
                state.entry.take()
            };
            let Some(entry) = entry else {
                continue;
            };
            let unc = entry.handle.target().unc();
            if entry.leases > 0 {
                tracing::warn!("Closing {} with {} outstanding leases", unc, entry.leases);
            }
            if let Err(e) = entry.handle.close().await {
                tracing::warn!("Failed to close {}: {}", unc, e);
                first_error.get_or_insert(VfsError::from_establish(e, &unc));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
