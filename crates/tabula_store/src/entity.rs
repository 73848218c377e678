use std::collections::{BTreeMap, HashMap};

use tabula_core::{
    Column, FromValue, ResultRow, SqlEnum, TabulaError, TabulaResult, Table, Value,
};

use crate::query::Query;
use crate::sized::LazySizedCollection;

/// Identity of a cached row: table name plus id value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub table: String,
    pub id: Value,
}

impl EntityKey {
    pub fn new(table: &Table, id: impl Into<Value>) -> Self {
        Self {
            table: table.name().to_string(),
            id: id.into(),
        }
    }
}

/// One materialized row plus the writes not yet flushed to the database.
#[derive(Clone, Debug)]
pub struct Entity {
    table: Table,
    id_column: Column,
    key: EntityKey,
    row: ResultRow,
    writes: Vec<(Column, Value)>,
}

impl Entity {
    pub fn new(table: &Table, id_column: &Column, row: ResultRow) -> TabulaResult<Self> {
        let id = row.get_value(id_column)?.clone();
        if id.is_null() {
            return Err(TabulaError::invalid(format!(
                "row of {} without an id",
                table.name()
            )));
        }
        Ok(Self {
            table: table.clone(),
            id_column: id_column.clone(),
            key: EntityKey::new(table, id),
            row,
            writes: Vec::new(),
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn id_column(&self) -> &Column {
        &self.id_column
    }

    pub fn id(&self) -> &Value {
        &self.key.id
    }

    /// Current value of `column`; a pending write shadows the loaded value.
    pub fn get(&self, column: &Column) -> TabulaResult<Value> {
        if let Some((_, value)) = self.writes.iter().find(|(written, _)| written == column) {
            return Ok(value.clone());
        }
        Ok(self.row.get_value(column)?.clone())
    }

    pub fn get_as<T: FromValue>(&self, column: &Column) -> TabulaResult<T> {
        T::from_value(self.get(column)?)
    }

    pub fn get_enum<E: SqlEnum>(&self, column: &Column) -> TabulaResult<E> {
        self.get(column)?.to_enum()
    }

    /// Records a write; setting the current value again records nothing.
    pub fn set(&mut self, column: &Column, value: impl Into<Value>) -> TabulaResult<()> {
        if !self.table.contains(column) {
            return Err(TabulaError::no_target_table(format!(
                "{column:?} is not a column of {}",
                self.table.name()
            )));
        }
        if *column == self.id_column {
            return Err(TabulaError::invalid(format!(
                "the id of {:?} cannot change",
                self.key
            )));
        }
        let value = column.column_type().validate(&value.into())?;
        let loaded = self.row.get_value(column)?;
        self.writes.retain(|(written, _)| written != column);
        if *loaded != value {
            self.writes.push((column.clone(), value));
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn pending_writes(&self) -> &[(Column, Value)] {
        &self.writes
    }

    /// Folds the pending writes into the loaded row once they are stored.
    pub fn mark_flushed(&mut self) -> TabulaResult<()> {
        for (column, value) in self.writes.drain(..) {
            self.row.set(&column, value)?;
        }
        Ok(())
    }
}

/// Per-transaction identity map: at most one [`Entity`] per key, plus the
/// lazily loaded referrer collections of cached entities.
#[derive(Default)]
pub struct EntityCache {
    tables: BTreeMap<String, HashMap<Value, Entity>>,
    referrers: HashMap<(EntityKey, Column), LazySizedCollection<Query>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, key: &EntityKey) -> Option<&Entity> {
        self.tables.get(&key.table)?.get(&key.id)
    }

    pub fn find_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.tables.get_mut(&key.table)?.get_mut(&key.id)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.find(key).is_some()
    }

    /// Caches `entity` unless its key is already cached; the first stored
    /// instance always wins.
    pub fn store(&mut self, entity: Entity) -> EntityKey {
        let key = entity.key().clone();
        self.tables
            .entry(key.table.clone())
            .or_default()
            .entry(key.id.clone())
            .or_insert(entity);
        key
    }

    /// Cached referrer collection of `key` through `column`, created by
    /// `supplier` on first use.
    pub fn get_or_put_referrers<F>(
        &mut self,
        key: &EntityKey,
        column: &Column,
        supplier: F,
    ) -> TabulaResult<&mut LazySizedCollection<Query>>
    where
        F: FnOnce() -> TabulaResult<LazySizedCollection<Query>>,
    {
        let slot = (key.clone(), column.clone());
        if !self.referrers.contains_key(&slot) {
            let collection = supplier()?;
            self.referrers.insert(slot.clone(), collection);
        }
        self.referrers
            .get_mut(&slot)
            .ok_or_else(|| TabulaError::invalid("referrer collection vanished"))
    }

    pub fn dirty(&self) -> Vec<&Entity> {
        self.tables
            .values()
            .flat_map(|entities| entities.values())
            .filter(|entity| entity.is_dirty())
            .collect()
    }

    pub fn dirty_mut(&mut self) -> impl Iterator<Item = &mut Entity> + '_ {
        self.tables
            .values_mut()
            .flat_map(|entities| entities.values_mut())
            .filter(|entity| entity.is_dirty())
    }

    /// Drops the entity and every referrer collection owned by it.
    pub fn remove(&mut self, key: &EntityKey) -> Option<Entity> {
        self.referrers.retain(|(owner, _), _| owner != key);
        self.tables.get_mut(&key.table)?.remove(&key.id)
    }

    /// Forgets every referrer collection; cached entities stay.
    pub fn clear_referrers(&mut self) {
        self.referrers.clear();
    }

    /// Forgets the referrer collections keyed on `column`.
    pub fn drop_referrers_through(&mut self, column: &Column) {
        self.referrers.retain(|(_, through), _| through != column);
    }

    /// Forgets every referrer collection whose query reads `table`.
    pub fn drop_referrers_reading(&mut self, table: &Table) {
        self.referrers
            .retain(|_, collection| !collection.source().select().source().contains_table(table));
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.referrers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tabula_core::Expr;

    fn users() -> (Table, Column, Column) {
        let mut users = Table::builder("users");
        let id = users.varchar("id", 10).primary_key().column();
        let name = users.varchar("name", 50).column();
        (users.build().unwrap(), id, name)
    }

    fn entity(table: &Table, id: &Column, name: &Column, key: &str, value: &str) -> Entity {
        let fields: Arc<Vec<Expr>> = Arc::new(vec![id.expr(), name.expr()]);
        let row = ResultRow::new(fields, vec![key.into(), value.into()]).unwrap();
        Entity::new(table, id, row).unwrap()
    }

    #[test]
    fn first_stored_instance_wins() {
        let (table, id, name) = users();
        let mut cache = EntityCache::new();
        let key = cache.store(entity(&table, &id, &name, "andrey", "Andrey"));
        let again = cache.store(entity(&table, &id, &name, "andrey", "Somebody else"));
        assert_eq!(key, again);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.find(&key).unwrap().get(&name).unwrap(),
            Value::from("Andrey")
        );
    }

    #[test]
    fn writes_shadow_loaded_values_until_flushed() {
        let (table, id, name) = users();
        let mut entity = entity(&table, &id, &name, "sergey", "Sergey");
        entity.set(&name, "Sergey").unwrap();
        assert!(!entity.is_dirty());
        entity.set(&name, "Serge").unwrap();
        assert!(entity.is_dirty());
        assert_eq!(entity.get_as::<String>(&name).unwrap(), "Serge");
        assert!(entity.set(&id, "other").is_err());
        entity.mark_flushed().unwrap();
        assert!(!entity.is_dirty());
        assert_eq!(entity.get_as::<String>(&name).unwrap(), "Serge");
        entity.set(&name, "Sergey").unwrap();
        entity.set(&name, "Serge").unwrap();
        assert!(!entity.is_dirty());
    }

    #[test]
    fn referrer_supplier_runs_once() {
        let (table, id, name) = users();
        let mut cache = EntityCache::new();
        let key = cache.store(entity(&table, &id, &name, "eugene", "Eugene"));
        let mut calls = 0;
        for _ in 0..3 {
            cache
                .get_or_put_referrers(&key, &name, || {
                    calls += 1;
                    Ok(LazySizedCollection::new(Query::new(table.select_all())))
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        cache.remove(&key);
        assert!(cache.is_empty());
        cache
            .get_or_put_referrers(&key, &name, || {
                calls += 1;
                Ok(LazySizedCollection::new(Query::new(table.select_all())))
            })
            .unwrap();
        assert_eq!(calls, 2);
    }

    /// Whether the cache had to build a fresh collection.
    fn rebuilt(cache: &mut EntityCache, key: &EntityKey, table: &Table, column: &Column) -> bool {
        let mut fresh = false;
        cache
            .get_or_put_referrers(key, column, || {
                fresh = true;
                Ok(LazySizedCollection::new(Query::new(table.select_all())))
            })
            .unwrap();
        fresh
    }

    #[test]
    fn referrer_collections_can_be_forgotten() {
        let (table, id, name) = users();
        let mut cache = EntityCache::new();
        let key = cache.store(entity(&table, &id, &name, "eugene", "Eugene"));
        assert!(rebuilt(&mut cache, &key, &table, &name));
        assert!(rebuilt(&mut cache, &key, &table, &id));
        cache.drop_referrers_through(&name);
        assert!(rebuilt(&mut cache, &key, &table, &name));
        assert!(!rebuilt(&mut cache, &key, &table, &id));

        cache.clear_referrers();
        assert_eq!(cache.len(), 1);
        assert!(rebuilt(&mut cache, &key, &table, &id));
        cache.drop_referrers_reading(&table);
        assert!(rebuilt(&mut cache, &key, &table, &id));
    }
}
