use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{AppError, Result};

/// True when a write bounced off a unique index (E11000).
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

/// Data access seam for catalog-style collections. The update document is
/// passed through as-is, so callers supply the `$set` wrapper themselves.
#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>>;
    async fn find(&self, filter: Document) -> Result<Vec<T>>;
    async fn create(&self, item: &T) -> Result<ObjectId>;
    async fn update(&self, id: ObjectId, update: Document) -> Result<Option<T>>;
    async fn delete(&self, id: ObjectId) -> Result<bool>;
}

#[derive(Clone)]
pub struct MongoRepository<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> MongoRepository<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(db: &Database, name: &str) -> Self {
        MongoRepository {
            collection: db.collection::<T>(name),
        }
    }

    // Escape hatch for queries the generic contract does not cover
    // (sorted listings, counts, field lookups).
    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }
}

#[async_trait]
impl<T> Repository<T> for MongoRepository<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<T>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find(&self, filter: Document) -> Result<Vec<T>> {
        let cursor = self.collection.find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn create(&self, item: &T) -> Result<ObjectId> {
        let result = self.collection.insert_one(item).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| AppError::service("Inserted document has a non-ObjectId _id"))
    }

    async fn update(&self, id: ObjectId, update: Document) -> Result<Option<T>> {
        Ok(self
            .collection
            .find_one_and_update(doc! { "_id": id }, update)
            .return_document(ReturnDocument::After)
            .await?)
    }

    async fn delete(&self, id: ObjectId) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}
