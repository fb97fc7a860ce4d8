//! The data client seam the interception layer sits in front of.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientError;
use crate::operation::Operation;

/// Executes operations against the underlying store and returns the raw result tree.
///
/// Single-record operations return the record as a JSON object, or `null`
/// when a lookup finds nothing.
#[async_trait]
pub trait DataClient: Send + Sync {
    async fn execute(&self, operation: Operation) -> Result<Value, ClientError>;
}

#[async_trait]
impl<T: DataClient + ?Sized> DataClient for Arc<T> {
    async fn execute(&self, operation: Operation) -> Result<Value, ClientError> {
        (**self).execute(operation).await
    }
}
