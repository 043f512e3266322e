use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
	error::RemoteError,
	intent::{ChangeIntent, EntityKind, OperationKind, Payload},
};

/// Remote acknowledgement of an applied operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
	/// Server-side row version, when the backend tracks one.
	pub version: Option<u64>,
}

/// The backend the queue is replayed against. Transport, schema and timeouts are the
/// implementor's concern; a timeout should surface as [`RemoteError::Timeout`].
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
	/// Idempotent upsert by primary key, used for both creates and updates.
	async fn upsert(&self, entity_id: Uuid, payload: &Payload) -> Result<Ack, RemoteError>;

	async fn delete(&self, kind: EntityKind, entity_id: Uuid) -> Result<Ack, RemoteError>;

	async fn apply(&self, intent: &ChangeIntent) -> Result<Ack, RemoteError> {
		match intent.operation {
			OperationKind::Create | OperationKind::Update => {
				self.upsert(intent.entity_id, &intent.payload).await
			}
			OperationKind::Delete => self.delete(intent.entity_kind(), intent.entity_id).await,
		}
	}
}
