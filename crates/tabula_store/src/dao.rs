//! Entity-level access on top of the identity cache: classes of entities
//! keyed on their id column, and the references between them.

use tabula_core::{Column, Expr, JoinType, ResultRow, TabulaError, TabulaResult, Table, Value};

use crate::entity::{Entity, EntityCache, EntityKey};
use crate::query::Query;
use crate::sized::{LazySizedCollection, SizedIterable};
use crate::statements::InsertStatement;
use crate::transaction::Transaction;

/// All rows of one table, identified by its first primary key.
#[derive(Clone, Debug)]
pub struct EntityClass {
    table: Table,
    id: Column,
}

impl EntityClass {
    pub fn new(table: &Table) -> TabulaResult<Self> {
        Ok(Self {
            table: table.clone(),
            id: table.id_column()?.clone(),
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn id_column(&self) -> &Column {
        &self.id
    }

    pub fn key(&self, id: impl Into<Value>) -> EntityKey {
        EntityKey::new(&self.table, id)
    }

    /// A query over every column of the table.
    pub fn query(&self, condition: Option<Expr>) -> Query {
        let select = match condition {
            Some(condition) => self.table.select(condition),
            None => self.table.select_all(),
        };
        Query::new(select)
    }

    /// The entities matching `condition`, queried afresh on every call.
    pub fn view(&self, condition: Expr) -> View {
        View {
            class: self.clone(),
            condition,
        }
    }

    /// Entities of this class reached from an owner through `link`.
    pub fn via(&self, link: &Table) -> TabulaResult<InnerTableLink> {
        InnerTableLink::new(link, self)
    }

    /// Caches the entity for `row` unless its key is already cached, and
    /// returns the key.
    pub fn wrap_row(&self, cache: &mut EntityCache, row: ResultRow) -> TabulaResult<EntityKey> {
        let id = row.get_value(&self.id)?.clone();
        let key = self.key(id);
        if cache.contains(&key) {
            return Ok(key);
        }
        Ok(cache.store(Entity::new(&self.table, &self.id, row)?))
    }

    fn wrap_rows(&self, cache: &mut EntityCache, rows: Vec<ResultRow>) -> TabulaResult<Vec<EntityKey>> {
        rows.into_iter().map(|row| self.wrap_row(cache, row)).collect()
    }

    async fn fetch(&self, tx: &mut Transaction, mut query: Query) -> TabulaResult<Vec<EntityKey>> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        let rows = query.rows(session).await?;
        self.wrap_rows(cache, rows)
    }

    pub async fn find_by_id(
        &self,
        tx: &mut Transaction,
        id: impl Into<Value>,
    ) -> TabulaResult<Option<EntityKey>> {
        let key = self.key(id);
        if tx.cache().contains(&key) {
            return Ok(Some(key));
        }
        let query = self.query(Some(self.id.eq(key.id.clone())?));
        Ok(self.fetch(tx, query).await?.into_iter().next())
    }

    /// Like [`EntityClass::find_by_id`] but a missing row is an error.
    pub async fn get(&self, tx: &mut Transaction, id: impl Into<Value>) -> TabulaResult<EntityKey> {
        let id = id.into();
        self.find_by_id(tx, id.clone()).await?.ok_or_else(|| {
            TabulaError::invalid(format!("no {} with id {id}", self.table.name()))
        })
    }

    pub async fn find(&self, tx: &mut Transaction, condition: Expr) -> TabulaResult<Vec<EntityKey>> {
        self.fetch(tx, self.query(Some(condition))).await
    }

    pub async fn all(&self, tx: &mut Transaction) -> TabulaResult<Vec<EntityKey>> {
        self.fetch(tx, self.query(None)).await
    }

    pub async fn count(&self, tx: &mut Transaction, condition: Option<Expr>) -> TabulaResult<u64> {
        tx.flush().await?;
        self.query(condition).count(tx.session()).await
    }

    /// Entities for `ids` in the given order; ids without a row are skipped.
    /// Only ids missing from the cache are queried.
    pub async fn for_ids(&self, tx: &mut Transaction, ids: Vec<Value>) -> TabulaResult<Vec<EntityKey>> {
        let missing: Vec<Value> = ids
            .iter()
            .filter(|id| !tx.cache().contains(&self.key((*id).clone())))
            .cloned()
            .collect();
        if !missing.is_empty() {
            let query = self.query(Some(self.id.in_list(missing)?));
            self.fetch(tx, query).await?;
        }
        Ok(ids
            .into_iter()
            .map(|id| self.key(id))
            .filter(|key| tx.cache().contains(key))
            .collect())
    }

    /// Inserts a row and returns the cached entity read back from it. Every
    /// column that is not nullable, has no default and is not generated must
    /// be given.
    pub async fn create(
        &self,
        tx: &mut Transaction,
        values: Vec<(Column, Value)>,
    ) -> TabulaResult<EntityKey> {
        let mut insert = InsertStatement::new(&self.table);
        let mut explicit_id = None;
        let mut given = Vec::with_capacity(values.len());
        for (column, value) in values {
            if column == self.id {
                explicit_id = Some(value.clone());
            }
            insert.set(&column, value)?;
            given.push(column);
        }
        if let Some(missing) = self.table.columns().iter().find(|column| {
            !given.contains(column)
                && !column.is_nullable()
                && column.default_value().is_none()
                && !column.column_type().is_autoincrement()
        }) {
            return Err(TabulaError::invalid(format!(
                "required column {missing:?} is missing from insert into {}",
                self.table.name()
            )));
        }
        insert.execute(tx.session()).await?;
        tx.cache_mut().drop_referrers_reading(&self.table);
        let id = match explicit_id {
            Some(id) => id,
            None => Value::Int(insert.generated_key()?),
        };
        self.get(tx, id).await
    }

    pub async fn delete(&self, tx: &mut Transaction, key: &EntityKey) -> TabulaResult<u64> {
        if key.table != self.table.name() {
            return Err(TabulaError::no_target_table(format!(
                "{key:?} does not belong to {}",
                self.table.name()
            )));
        }
        tx.delete_entity(key).await
    }
}

/// Many-to-one: the entity a foreign key column points at.
#[derive(Clone, Debug)]
pub struct Reference {
    column: Column,
    target: EntityClass,
}

impl Reference {
    pub fn new(column: &Column, target: &EntityClass) -> TabulaResult<Self> {
        if column.referee() != Some(target.id_column()) {
            return Err(TabulaError::invalid(format!(
                "{column:?} does not reference {:?}",
                target.id_column()
            )));
        }
        Ok(Self {
            column: column.clone(),
            target: target.clone(),
        })
    }

    pub async fn get(&self, tx: &mut Transaction, source: &EntityKey) -> TabulaResult<Option<EntityKey>> {
        let value = tx.entity(source)?.get(&self.column)?;
        if value.is_null() {
            return Ok(None);
        }
        self.target.find_by_id(tx, value).await
    }

    pub fn set(
        &self,
        tx: &mut Transaction,
        source: &EntityKey,
        target: Option<&EntityKey>,
    ) -> TabulaResult<()> {
        let value = match target {
            Some(target) => target.id.clone(),
            None => Value::Null,
        };
        tx.entity_mut(source)?.set(&self.column, value)
    }
}

/// One-to-many: the entities whose foreign key points at an owner. Each
/// owner's collection is cached for the rest of the transaction.
#[derive(Clone, Debug)]
pub struct Referrers {
    class: EntityClass,
    column: Column,
}

impl Referrers {
    pub fn new(class: &EntityClass, column: &Column) -> TabulaResult<Self> {
        if !class.table().contains(column) || column.referee().is_none() {
            return Err(TabulaError::invalid(format!(
                "{column:?} is not a foreign key of {}",
                class.table().name()
            )));
        }
        Ok(Self {
            class: class.clone(),
            column: column.clone(),
        })
    }

    fn collection<'a>(
        &self,
        cache: &'a mut EntityCache,
        owner: &EntityKey,
    ) -> TabulaResult<&'a mut LazySizedCollection<Query>> {
        cache.get_or_put_referrers(owner, &self.column, || {
            let condition = self.column.eq(owner.id.clone())?;
            Ok(LazySizedCollection::new(self.class.query(Some(condition))))
        })
    }

    pub async fn load(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<Vec<EntityKey>> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        let rows = self.collection(cache, owner)?.load(session).await?;
        self.class.wrap_rows(cache, rows)
    }

    pub async fn count(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<u64> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        self.collection(cache, owner)?.count(session).await
    }

    pub async fn empty(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<bool> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        self.collection(cache, owner)?.empty(session).await
    }
}

/// A fixed condition over one entity class. Nothing is cached besides the
/// entities themselves.
#[derive(Clone, Debug)]
pub struct View {
    class: EntityClass,
    condition: Expr,
}

impl View {
    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub async fn load(&self, tx: &mut Transaction) -> TabulaResult<Vec<EntityKey>> {
        self.class.find(tx, self.condition.clone()).await
    }

    pub async fn count(&self, tx: &mut Transaction) -> TabulaResult<u64> {
        self.class.count(tx, Some(self.condition.clone())).await
    }

    pub async fn empty(&self, tx: &mut Transaction) -> TabulaResult<bool> {
        tx.flush().await?;
        let mut query = self.class.query(Some(self.condition.clone()));
        query.empty(tx.session()).await
    }
}

/// Many-to-many through a link table holding foreign keys to both sides.
/// Collections are cached per owner like [`Referrers`], keyed on the link
/// column that points back at the owner.
#[derive(Clone, Debug)]
pub struct InnerTableLink {
    link: Table,
    target: EntityClass,
    target_column: Column,
}

impl InnerTableLink {
    pub fn new(link: &Table, target: &EntityClass) -> TabulaResult<Self> {
        let target_column = link
            .columns()
            .iter()
            .find(|column| column.referee() == Some(target.id_column()))
            .cloned()
            .ok_or_else(|| {
                TabulaError::invalid(format!(
                    "{} does not reference {}",
                    link.name(),
                    target.table().name()
                ))
            })?;
        Ok(Self {
            link: link.clone(),
            target: target.clone(),
            target_column,
        })
    }

    pub fn link_table(&self) -> &Table {
        &self.link
    }

    /// The link column pointing at the owner's id.
    fn source_column(&self, owner_id: &Column) -> TabulaResult<Column> {
        self.link
            .columns()
            .iter()
            .find(|column| column.referee() == Some(owner_id) && **column != self.target_column)
            .cloned()
            .ok_or_else(|| {
                TabulaError::invalid(format!(
                    "{} does not reference {}",
                    self.link.name(),
                    owner_id.table_name()
                ))
            })
    }

    fn collection<'a>(
        &self,
        cache: &'a mut EntityCache,
        owner: &EntityKey,
    ) -> TabulaResult<&'a mut LazySizedCollection<Query>> {
        let owner_id = match cache.find(owner) {
            Some(entity) => entity.id_column().clone(),
            None => return Err(TabulaError::invalid(format!("{owner:?} is not cached"))),
        };
        let source = self.source_column(&owner_id)?;
        cache.get_or_put_referrers(owner, &source, || {
            let target = self.target.table();
            let select = target
                .join_on(
                    &self.link,
                    JoinType::Inner,
                    Some((self.target.id_column().clone(), self.target_column.clone())),
                    None,
                )?
                .slice(target.columns())
                .select(source.eq(owner.id.clone())?);
            Ok(LazySizedCollection::new(Query::new(select)))
        })
    }

    pub async fn load(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<Vec<EntityKey>> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        let rows = self.collection(cache, owner)?.load(session).await?;
        self.target.wrap_rows(cache, rows)
    }

    pub async fn count(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<u64> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        self.collection(cache, owner)?.count(session).await
    }

    pub async fn empty(&self, tx: &mut Transaction, owner: &EntityKey) -> TabulaResult<bool> {
        tx.flush().await?;
        let (session, cache) = tx.parts();
        self.collection(cache, owner)?.empty(session).await
    }
}
