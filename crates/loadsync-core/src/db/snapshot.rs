//! Immutable database snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use super::transaction::TxOp;
use super::{Attribute, EntityId, TxId, Value};
use crate::hash::ContentHash;
use crate::path::GamePath;

/// The attributes of one entity. Every attribute has at most one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entity {
    attributes: BTreeMap<Attribute, Value>,
}

impl Entity {
    /// Get the value of an attribute.
    pub fn get(&self, attr: Attribute) -> Option<&Value> {
        self.attributes.get(&attr)
    }

    /// Whether the entity carries an attribute.
    pub fn has(&self, attr: Attribute) -> bool {
        self.attributes.contains_key(&attr)
    }

    /// Iterate over all attribute values.
    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &Value)> {
        self.attributes.iter().map(|(a, v)| (*a, v))
    }

    pub fn get_ref(&self, attr: Attribute) -> Option<EntityId> {
        self.get(attr).and_then(Value::as_ref_id)
    }

    pub fn get_tx(&self, attr: Attribute) -> Option<TxId> {
        self.get(attr).and_then(Value::as_tx)
    }

    pub fn get_str(&self, attr: Attribute) -> Option<&str> {
        self.get(attr).and_then(Value::as_str)
    }

    pub fn get_u64(&self, attr: Attribute) -> Option<u64> {
        self.get(attr).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, attr: Attribute) -> Option<bool> {
        self.get(attr).and_then(Value::as_bool)
    }

    pub fn get_hash(&self, attr: Attribute) -> Option<ContentHash> {
        self.get(attr).and_then(Value::as_hash)
    }

    pub fn get_path(&self, attr: Attribute) -> Option<&GamePath> {
        self.get(attr).and_then(Value::as_path)
    }

    pub fn get_time(&self, attr: Attribute) -> Option<DateTime<Utc>> {
        self.get(attr).and_then(Value::as_time)
    }

    fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// An immutable, cheaply clonable view of the log as of one transaction.
#[derive(Debug, Clone)]
pub struct Db {
    basis: TxId,
    entities: Arc<BTreeMap<EntityId, Entity>>,
    touched: Arc<HashMap<EntityId, TxId>>,
}

impl Db {
    /// An empty database before any transaction.
    pub fn empty() -> Self {
        Self {
            basis: TxId(0),
            entities: Arc::default(),
            touched: Arc::default(),
        }
    }

    /// The transaction this snapshot reflects.
    pub fn basis_tx(&self) -> TxId {
        self.basis
    }

    /// Get an entity.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Whether an entity exists.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// All entities whose `attr` equals `value`, in id order.
    pub fn entities_with(&self, attr: Attribute, value: &Value) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.get(attr) == Some(value))
            .map(|(id, _)| *id)
            .collect()
    }

    /// All entities carrying `attr`, in id order.
    pub fn entities_having(&self, attr: Attribute) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.has(attr))
            .map(|(id, _)| *id)
            .collect()
    }

    /// The last transaction that modified an entity.
    pub fn last_touched(&self, id: EntityId) -> Option<TxId> {
        self.touched.get(&id).copied()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Produce the snapshot that results from applying resolved operations.
    ///
    /// Adds replace any previous value of the attribute. Retracts only take
    /// effect when the stored value matches. Entities left without
    /// attributes disappear.
    pub fn apply(&self, tx: TxId, ops: &[TxOp]) -> Db {
        let mut entities = (*self.entities).clone();
        let mut touched = (*self.touched).clone();

        for op in ops {
            match op {
                TxOp::Add {
                    entity,
                    attribute,
                    value,
                } => {
                    entities
                        .entry(*entity)
                        .or_default()
                        .attributes
                        .insert(*attribute, value.clone());
                    touched.insert(*entity, tx);
                }
                TxOp::Retract {
                    entity,
                    attribute,
                    value,
                } => {
                    let Some(existing) = entities.get_mut(entity) else {
                        continue;
                    };
                    if existing.get(*attribute) == Some(value) {
                        existing.attributes.remove(attribute);
                        touched.insert(*entity, tx);
                    }
                    if existing.is_empty() {
                        entities.remove(entity);
                    }
                }
                TxOp::Delete { entity, recursive } => {
                    let mut stack = vec![*entity];
                    while let Some(id) = stack.pop() {
                        if entities.remove(&id).is_none() {
                            continue;
                        }
                        touched.insert(id, tx);
                        if *recursive {
                            stack.extend(
                                entities
                                    .iter()
                                    .filter(|(_, e)| {
                                        e.iter().any(|(a, v)| {
                                            a.is_component_ref() && v.as_ref_id() == Some(id)
                                        })
                                    })
                                    .map(|(child, _)| *child),
                            );
                        }
                    }
                }
            }
        }

        trace!(%tx, ops = ops.len(), entities = entities.len(), "Applied transaction");

        Db {
            basis: tx,
            entities: Arc::new(entities),
            touched: Arc::new(touched),
        }
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(entity: u64, attribute: Attribute, value: impl Into<Value>) -> TxOp {
        TxOp::Add {
            entity: EntityId(entity),
            attribute,
            value: value.into(),
        }
    }

    #[test]
    fn test_add_replaces_value() {
        let db = Db::empty()
            .apply(TxId(1), &[add(1, Attribute::ItemName, "a")])
            .apply(TxId(2), &[add(1, Attribute::ItemName, "b")]);

        let entity = db.get(EntityId(1)).unwrap();
        assert_eq!(entity.get_str(Attribute::ItemName), Some("b"));
        assert_eq!(db.last_touched(EntityId(1)), Some(TxId(2)));
        assert_eq!(db.basis_tx(), TxId(2));
    }

    #[test]
    fn test_retract_requires_matching_value() {
        let db = Db::empty().apply(TxId(1), &[add(1, Attribute::ItemName, "a")]);
        let unchanged = db.apply(
            TxId(2),
            &[TxOp::Retract {
                entity: EntityId(1),
                attribute: Attribute::ItemName,
                value: "other".into(),
            }],
        );
        assert!(unchanged.contains(EntityId(1)));

        let removed = db.apply(
            TxId(2),
            &[TxOp::Retract {
                entity: EntityId(1),
                attribute: Attribute::ItemName,
                value: "a".into(),
            }],
        );
        assert!(!removed.contains(EntityId(1)));
    }

    #[test]
    fn test_recursive_delete_follows_components() {
        let db = Db::empty().apply(
            TxId(1),
            &[
                add(1, Attribute::LoadoutName, "loadout"),
                add(2, Attribute::ItemLoadout, EntityId(1)),
                add(3, Attribute::ItemParent, EntityId(2)),
                add(4, Attribute::ItemName, "unrelated"),
            ],
        );

        let shallow = db.apply(
            TxId(2),
            &[TxOp::Delete {
                entity: EntityId(1),
                recursive: false,
            }],
        );
        assert_eq!(shallow.len(), 3);

        let deep = db.apply(
            TxId(2),
            &[TxOp::Delete {
                entity: EntityId(1),
                recursive: true,
            }],
        );
        assert_eq!(deep.len(), 1);
        assert!(deep.contains(EntityId(4)));
    }

    #[test]
    fn test_old_snapshot_is_unaffected() {
        let first = Db::empty().apply(TxId(1), &[add(1, Attribute::ItemName, "a")]);
        let second = first.apply(TxId(2), &[add(2, Attribute::ItemName, "b")]);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(
            second.entities_with(Attribute::ItemName, &"b".into()),
            vec![EntityId(2)]
        );
    }
}
