//! Bond enumeration
//!
//! Bonds are owned by the platform. The advertiser only walks them; the wipe
//! request is the one place that removes any.

use crate::error::StackError;
use crate::gap::{BdAddr, BondedPeer, LocalIdentity};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{PoisonError, RwLock};

/// Access to persisted bonds
pub trait BondStore: Send + Sync {
    /// Calls `visit` once per bond of `identity`, stopping early on `Break`
    fn for_each_bond(
        &self,
        identity: LocalIdentity,
        visit: &mut dyn FnMut(&BondedPeer) -> ControlFlow<()>,
    ) -> Result<(), StackError>;

    /// Records a new bond, replacing an existing one for the same address
    fn add_bond(&self, identity: LocalIdentity, peer: BondedPeer) -> Result<(), StackError>;

    /// Removes one bond, or every bond of `identity` when `peer` is `None`.
    /// Returns how many were removed.
    fn unpair(&self, identity: LocalIdentity, peer: Option<&BdAddr>) -> Result<usize, StackError>;

    /// Number of bonds held for `identity`
    fn bond_count(&self, identity: LocalIdentity) -> Result<usize, StackError> {
        let mut count = 0;
        self.for_each_bond(identity, &mut |_| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }
}

/// In-memory implementation of BondStore
#[derive(Debug, Default)]
pub struct MemoryBondStore {
    bonds: RwLock<HashMap<LocalIdentity, Vec<BondedPeer>>>,
}

impl MemoryBondStore {
    /// Create a new empty in-memory bond store
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with bonds for one identity
    pub fn with_bonds(identity: LocalIdentity, peers: impl IntoIterator<Item = BondedPeer>) -> Self {
        let store = Self::new();
        {
            let mut bonds = store.bonds.write().unwrap_or_else(PoisonError::into_inner);
            bonds.entry(identity).or_default().extend(peers);
        }
        store
    }
}

impl BondStore for MemoryBondStore {
    fn for_each_bond(
        &self,
        identity: LocalIdentity,
        visit: &mut dyn FnMut(&BondedPeer) -> ControlFlow<()>,
    ) -> Result<(), StackError> {
        // Snapshot so the visitor may call back into the store
        let peers = {
            let bonds = self.bonds.read().unwrap_or_else(PoisonError::into_inner);
            bonds.get(&identity).cloned().unwrap_or_default()
        };

        for peer in &peers {
            if visit(peer).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn add_bond(&self, identity: LocalIdentity, peer: BondedPeer) -> Result<(), StackError> {
        let mut bonds = self.bonds.write().unwrap_or_else(PoisonError::into_inner);
        let peers = bonds.entry(identity).or_default();
        match peers.iter_mut().find(|p| p.address == peer.address) {
            Some(existing) => *existing = peer,
            None => peers.push(peer),
        }
        Ok(())
    }

    fn unpair(&self, identity: LocalIdentity, peer: Option<&BdAddr>) -> Result<usize, StackError> {
        let mut bonds = self.bonds.write().unwrap_or_else(PoisonError::into_inner);
        let Some(peers) = bonds.get_mut(&identity) else {
            return Ok(0);
        };

        let before = peers.len();
        match peer {
            Some(addr) => peers.retain(|p| p.address != *addr),
            None => peers.clear(),
        }
        Ok(before - peers.len())
    }
}
