use std::sync::Arc;

use anyhow::anyhow;
use lexis_db::Database;
use tracing::error;

use crate::error::{AuthError, AuthResult};

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> AuthResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AuthError::Store(anyhow!("blocking task failed: {}", e))
        })?
        .map_err(AuthError::Store)
}
