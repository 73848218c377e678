use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ops::{Deref, DerefMut};

use tabula_core::{Column, TabulaError, TabulaResult, Table, Value};

use crate::entity::{Entity, EntityCache, EntityKey};
use crate::session::Session;
use crate::statements::{BatchUpdate, DeleteStatement};

/// A session that owns an entity cache. The cache lives exactly as long as
/// the transaction: commit flushes it, rollback discards it.
pub struct Transaction {
    session: Session,
    cache: EntityCache,
}

impl Deref for Transaction {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Transaction {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            cache: EntityCache::new(),
        }
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut EntityCache {
        &mut self.cache
    }

    /// Both halves at once, for code that executes while holding cached data.
    pub fn parts(&mut self) -> (&mut Session, &mut EntityCache) {
        (&mut self.session, &mut self.cache)
    }

    pub fn entity(&self, key: &EntityKey) -> TabulaResult<&Entity> {
        self.cache
            .find(key)
            .ok_or_else(|| TabulaError::invalid(format!("{key:?} is not cached")))
    }

    pub fn entity_mut(&mut self, key: &EntityKey) -> TabulaResult<&mut Entity> {
        self.cache
            .find_mut(key)
            .ok_or_else(|| TabulaError::invalid(format!("{key:?} is not cached")))
    }

    /// Writes every dirty cached entity, one batch per table and column set.
    /// Referrer collections keyed on a written column are forgotten.
    pub async fn flush(&mut self) -> TabulaResult<u64> {
        let mut batches: BTreeMap<String, BatchUpdate> = BTreeMap::new();
        let mut written: Vec<Column> = Vec::new();
        for entity in self.cache.dirty() {
            let batch = match batches.entry(entity.table().name().to_string()) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => slot.insert(BatchUpdate::new(
                    entity.table(),
                    &[entity.id_column().clone()],
                )?),
            };
            let mut values: Vec<(Column, Value)> =
                vec![(entity.id_column().clone(), entity.id().clone())];
            values.extend(entity.pending_writes().iter().cloned());
            for (column, _) in entity.pending_writes() {
                if !written.contains(column) {
                    written.push(column.clone());
                }
            }
            batch.add(values)?;
        }
        if batches.is_empty() {
            return Ok(0);
        }
        let mut total = 0;
        for (_, batch) in batches {
            total += batch.execute(&mut self.session).await?;
        }
        for entity in self.cache.dirty_mut() {
            entity.mark_flushed()?;
        }
        for column in &written {
            self.cache.drop_referrers_through(column);
        }
        Ok(total)
    }

    pub async fn commit(mut self) -> TabulaResult<()> {
        self.flush().await?;
        self.cache.clear();
        self.session.commit().await
    }

    pub async fn rollback(self) -> TabulaResult<()> {
        self.session.rollback().await
    }

    pub async fn create_tables(&mut self, tables: &[&Table]) -> TabulaResult<()> {
        for table in tables {
            let statements = table.create_statements(self.session.dialect())?;
            for sql in statements {
                self.session.execute(&sql).await?;
            }
        }
        Ok(())
    }

    /// Drops in reverse order so referencing tables go first.
    pub async fn drop_tables(&mut self, tables: &[&Table]) -> TabulaResult<()> {
        for table in tables.iter().rev() {
            let sql = table.drop_statement(self.session.dialect());
            self.session.execute(&sql).await?;
        }
        Ok(())
    }

    /// Deletes the row of a cached entity and evicts it, along with every
    /// referrer collection that could list it.
    pub async fn delete_entity(&mut self, key: &EntityKey) -> TabulaResult<u64> {
        let (table, id_column) = {
            let entity = self.entity(key)?;
            (entity.table().clone(), entity.id_column().clone())
        };
        let mut delete = DeleteStatement::new(&table);
        delete.filter(id_column.eq(key.id.clone())?)?;
        let count = delete.execute(&mut self.session).await?;
        self.cache.remove(key);
        self.cache.drop_referrers_reading(&table);
        Ok(count)
    }
}
