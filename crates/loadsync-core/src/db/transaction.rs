//! Transactions and the metadata-log trait.

use std::collections::HashMap;

use super::{Attribute, Db, EntityId, TxId, Value};
use crate::error::StoreError;

/// A single pending change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    /// Set an attribute, replacing any previous value.
    Add {
        entity: EntityId,
        attribute: Attribute,
        value: Value,
    },
    /// Remove an attribute if it currently holds `value`.
    Retract {
        entity: EntityId,
        attribute: Attribute,
        value: Value,
    },
    /// Remove an entity, and with `recursive` every entity that is a
    /// component of it.
    Delete { entity: EntityId, recursive: bool },
}

/// A batch of changes committed atomically.
///
/// New entities are referenced through temporary ids from [`temp_id`]; the
/// log assigns permanent ids on commit and reports the mapping in
/// [`CommitResult`]. Values may refer to the transaction being committed
/// through [`this_tx`].
///
/// [`temp_id`]: Transaction::temp_id
/// [`this_tx`]: Transaction::this_tx
#[derive(Debug, Default)]
pub struct Transaction {
    ops: Vec<TxOp>,
    next_temp: u64,
}

impl Transaction {
    /// Create an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a temporary id for a new entity.
    pub fn temp_id(&mut self) -> EntityId {
        let id = EntityId(EntityId::TEMP_BIT | self.next_temp);
        self.next_temp += 1;
        id
    }

    /// Placeholder for the id of this transaction once committed.
    pub fn this_tx(&self) -> TxId {
        TxId::PENDING
    }

    pub fn add(&mut self, entity: EntityId, attribute: Attribute, value: impl Into<Value>) {
        self.ops.push(TxOp::Add {
            entity,
            attribute,
            value: value.into(),
        });
    }

    pub fn retract(&mut self, entity: EntityId, attribute: Attribute, value: impl Into<Value>) {
        self.ops.push(TxOp::Retract {
            entity,
            attribute,
            value: value.into(),
        });
    }

    pub fn delete(&mut self, entity: EntityId, recursive: bool) {
        self.ops.push(TxOp::Delete { entity, recursive });
    }

    /// Pending operations in insertion order.
    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Replace temporary ids and pending transaction references.
    ///
    /// `allocate` is called once per distinct temporary id, in first-use
    /// order.
    pub fn resolve(
        self,
        tx: TxId,
        mut allocate: impl FnMut() -> EntityId,
    ) -> (Vec<TxOp>, HashMap<EntityId, EntityId>) {
        let mut remap: HashMap<EntityId, EntityId> = HashMap::new();
        let mut resolve_id = |id: EntityId| -> EntityId {
            if id.is_temp() {
                *remap.entry(id).or_insert_with(&mut allocate)
            } else {
                id
            }
        };
        let resolve_value = |value: Value, resolve_id: &mut dyn FnMut(EntityId) -> EntityId| {
            match value {
                Value::Ref(id) => Value::Ref(resolve_id(id)),
                Value::Tx(TxId::PENDING) => Value::Tx(tx),
                other => other,
            }
        };

        let ops = self
            .ops
            .into_iter()
            .map(|op| match op {
                TxOp::Add {
                    entity,
                    attribute,
                    value,
                } => TxOp::Add {
                    entity: resolve_id(entity),
                    attribute,
                    value: resolve_value(value, &mut resolve_id),
                },
                TxOp::Retract {
                    entity,
                    attribute,
                    value,
                } => TxOp::Retract {
                    entity: resolve_id(entity),
                    attribute,
                    value: resolve_value(value, &mut resolve_id),
                },
                TxOp::Delete { entity, recursive } => TxOp::Delete {
                    entity: resolve_id(entity),
                    recursive,
                },
            })
            .collect();

        (ops, remap)
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    /// Id of the committed transaction.
    pub tx: TxId,
    /// Snapshot after the commit.
    pub db: Db,
    remap: HashMap<EntityId, EntityId>,
}

impl CommitResult {
    pub fn new(tx: TxId, db: Db, remap: HashMap<EntityId, EntityId>) -> Self {
        Self { tx, db, remap }
    }

    /// Map a temporary id to its permanent id. Permanent ids map to themselves.
    pub fn remap(&self, id: EntityId) -> EntityId {
        self.remap.get(&id).copied().unwrap_or(id)
    }
}

/// An append-only transactional store of versioned entities.
pub trait MetadataLog: Send + Sync {
    /// The latest snapshot.
    fn db(&self) -> Db;

    /// The snapshot as of a past transaction.
    fn db_as_of(&self, tx: TxId) -> Db;

    /// Start a new transaction.
    fn begin_transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Commit a transaction atomically. On error nothing is applied.
    fn commit(&self, tx: Transaction) -> Result<CommitResult, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_assigns_ids_once() {
        let mut tx = Transaction::new();
        let a = tx.temp_id();
        let b = tx.temp_id();
        tx.add(a, Attribute::ItemName, "a");
        tx.add(b, Attribute::ItemParent, a);
        tx.add(a, Attribute::LastSyncedLoadoutTx, tx.this_tx());

        let mut next = 100;
        let (ops, remap) = tx.resolve(TxId(7), || {
            next += 1;
            EntityId(next)
        });

        assert_eq!(remap[&a], EntityId(101));
        assert_eq!(remap[&b], EntityId(102));
        assert_eq!(
            ops[1],
            TxOp::Add {
                entity: EntityId(102),
                attribute: Attribute::ItemParent,
                value: Value::Ref(EntityId(101)),
            }
        );
        assert_eq!(
            ops[2],
            TxOp::Add {
                entity: EntityId(101),
                attribute: Attribute::LastSyncedLoadoutTx,
                value: Value::Tx(TxId(7)),
            }
        );
    }
}
