use async_trait::async_trait;

use tabula_core::{TabulaError, TabulaResult};

use crate::session::Session;

/// A lazy sequence that can report its size without being loaded.
#[async_trait]
pub trait SizedIterable: Send {
    type Item: Clone + Send + Sync;

    async fn count(&mut self, session: &mut Session) -> TabulaResult<u64>;

    async fn empty(&mut self, session: &mut Session) -> TabulaResult<bool> {
        Ok(self.count(session).await? == 0)
    }

    async fn load(&mut self, session: &mut Session) -> TabulaResult<Vec<Self::Item>>;

    fn is_for_update(&self) -> bool;

    fn for_update(&mut self) -> TabulaResult<()>;

    fn not_for_update(&mut self) -> TabulaResult<()>;
}

/// Memoizes a [`SizedIterable`]: `count` and `empty` ask the source once and
/// remember the answer until the first load, after which everything is
/// answered from the loaded items.
#[derive(Clone)]
pub struct LazySizedCollection<S: SizedIterable> {
    source: S,
    size: Option<u64>,
    empty: Option<bool>,
    loaded: Option<(Vec<S::Item>, bool)>,
}

impl<S: SizedIterable> LazySizedCollection<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            size: None,
            empty: None,
            loaded: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn set_locking(&mut self, for_update: bool) -> TabulaResult<()> {
        match &self.loaded {
            Some((_, loaded)) if *loaded != for_update => Err(TabulaError::frozen(format!(
                "collection was loaded with for_update = {loaded}"
            ))),
            Some(_) => Ok(()),
            None if for_update => self.source.for_update(),
            None => self.source.not_for_update(),
        }
    }
}

#[async_trait]
impl<S: SizedIterable> SizedIterable for LazySizedCollection<S> {
    type Item = S::Item;

    async fn count(&mut self, session: &mut Session) -> TabulaResult<u64> {
        if let Some((items, _)) = &self.loaded {
            return Ok(items.len() as u64);
        }
        if let Some(size) = self.size {
            return Ok(size);
        }
        let size = self.source.count(session).await?;
        self.size = Some(size);
        self.empty = Some(size == 0);
        Ok(size)
    }

    async fn empty(&mut self, session: &mut Session) -> TabulaResult<bool> {
        if let Some((items, _)) = &self.loaded {
            return Ok(items.is_empty());
        }
        if let Some(empty) = self.empty {
            return Ok(empty);
        }
        let empty = self.source.empty(session).await?;
        self.empty = Some(empty);
        if empty {
            self.size = Some(0);
        }
        Ok(empty)
    }

    async fn load(&mut self, session: &mut Session) -> TabulaResult<Vec<S::Item>> {
        if let Some((items, _)) = &self.loaded {
            return Ok(items.clone());
        }
        let items = self.source.load(session).await?;
        self.loaded = Some((items.clone(), self.source.is_for_update()));
        Ok(items)
    }

    fn is_for_update(&self) -> bool {
        match &self.loaded {
            Some((_, for_update)) => *for_update,
            None => self.source.is_for_update(),
        }
    }

    fn for_update(&mut self) -> TabulaResult<()> {
        self.set_locking(true)
    }

    fn not_for_update(&mut self) -> TabulaResult<()> {
        self.set_locking(false)
    }
}
