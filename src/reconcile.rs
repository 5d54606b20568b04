//! Claims of price records by map entities, and the end-of-run diff.

use crate::model::EntityKind;
use crate::store::ScratchStore;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// A map entity that referenced a price record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub kind: EntityKind,
    pub entity_id: String,
}

impl Claim {
    pub fn label(&self) -> String {
        format!("{}/{}", self.kind, self.entity_id)
    }
}

/// Price record id → every map entity that claimed it.
///
/// Only ids validated against the scratch store are inserted. Every claim is
/// kept, so records claimed several times remain visible.
#[derive(Debug, Default, Clone)]
pub struct MatchIndex {
    claims: BTreeMap<String, Vec<Claim>>,
}

impl MatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, price_id: &str, kind: EntityKind, entity_id: &str) {
        self.claims
            .entry(price_id.to_string())
            .or_default()
            .push(Claim {
                kind,
                entity_id: entity_id.to_string(),
            });
    }

    pub fn is_claimed(&self, price_id: &str) -> bool {
        self.claims.contains_key(price_id)
    }

    pub fn claims(&self, price_id: &str) -> &[Claim] {
        self.claims.get(price_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct claimed price ids.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Price ids claimed by more than one entity, in id order.
    pub fn shared(&self) -> impl Iterator<Item = (&str, &[Claim])> {
        self.claims
            .iter()
            .filter(|(_, claims)| claims.len() > 1)
            .map(|(id, claims)| (id.as_str(), claims.as_slice()))
    }
}

/// Outcome of the end-of-run diff.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciliation {
    /// Price ids no map entity claimed, sorted.
    pub unclaimed: Vec<String>,
    /// Price ids claimed several times with their claimants.
    pub shared: Vec<(String, Vec<Claim>)>,
}

/// Reports every price record of `scratch` that `index` never claimed.
///
/// Diagnostic only: this never fails. When the scratch store cannot be
/// listed the error is logged and no unclaimed record is reported.
#[tracing::instrument(skip_all)]
pub fn reconcile(index: &MatchIndex, scratch: &ScratchStore) -> Reconciliation {
    let shared: Vec<_> = index
        .shared()
        .map(|(id, claims)| (id.to_string(), claims.to_vec()))
        .collect();
    for (price_id, claims) in &shared {
        let entities: Vec<_> = claims.iter().map(Claim::label).collect();
        info!(
            price_id = %price_id,
            claimants = claims.len(),
            entities = %entities.join(","),
            "Price station referenced by several openstreetmap objects"
        );
    }

    let ids = match scratch.ids() {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "Failed to list prices files");
            return Reconciliation {
                unclaimed: Vec::new(),
                shared,
            };
        }
    };

    let unclaimed: Vec<_> = ids
        .into_iter()
        .filter(|id| !index.is_claimed(id))
        .collect();
    for price_id in &unclaimed {
        warn!(price_id = %price_id, "Price station not found on openstreetmap");
    }

    info!(
        claimed = index.len(),
        unclaimed = unclaimed.len(),
        shared = shared.len(),
        "Reconciliation complete"
    );

    Reconciliation { unclaimed, shared }
}
