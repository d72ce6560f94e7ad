//! Entity store, its JSON persistence and the raw snapshot archive.

use std::ops::{Deref, DerefMut};

use thiserror::Error;

mod data;
mod entities;
mod persist;

pub use data::{EntityCounts, NewMatchDate, Outcome, StoreData};
pub use entities::*;
pub use persist::{SnapshotArchive, StoreFile, StoredSnapshot};

pub const CRATE_NAME: &str = "mada-storage";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate {entity}: {key}")]
    UniqueViolation { entity: &'static str, key: String },
    #[error("reference to missing {entity} id {id}")]
    DanglingReference { entity: &'static str, id: u32 },
    #[error("unknown {entity} id {id}")]
    UnknownId { entity: &'static str, id: u32 },
    #[error("doubles pair needs two distinct players, got {player} twice")]
    InvalidPair { player: PlayerId },
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Reclassifies a failed lookup as a foreign-key violation of the row being written.
    pub(crate) fn dangling(self) -> Self {
        match self {
            StoreError::UnknownId { entity, id } => StoreError::DanglingReference { entity, id },
            other => other,
        }
    }
}

/// Owns the committed graph. All writes go through a [`Transaction`].
#[derive(Debug, Default)]
pub struct EntityStore {
    data: StoreData,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(mut data: StoreData) -> Result<Self, StoreError> {
        data.rebuild_indexes()?;
        Ok(Self { data })
    }

    pub fn data(&self) -> &StoreData {
        &self.data
    }

    pub fn into_data(self) -> StoreData {
        self.data
    }

    /// Starts a unit of work on a staged copy. Dropping it without `commit` discards every write.
    pub fn transaction(&mut self) -> Transaction<'_> {
        let staged = self.data.clone();
        Transaction {
            target: &mut self.data,
            staged,
        }
    }
}

impl Deref for EntityStore {
    type Target = StoreData;

    fn deref(&self) -> &StoreData {
        &self.data
    }
}

pub struct Transaction<'a> {
    target: &'a mut StoreData,
    staged: StoreData,
}

impl Transaction<'_> {
    pub fn commit(self) {
        *self.target = self.staged;
    }
}

impl Deref for Transaction<'_> {
    type Target = StoreData;

    fn deref(&self) -> &StoreData {
        &self.staged
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut StoreData {
        &mut self.staged
    }
}
