use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use lexis_db::Database;

use crate::error::AuthResult;
use crate::store::blocking;

/// Returns the trimmed (device_key, platform) pair when both are present.
pub(crate) fn device_pair(
    device_key: Option<&str>,
    platform: Option<&str>,
) -> Option<(String, String)> {
    let device_key = device_key.map(str::trim).filter(|k| !k.is_empty())?;
    let platform = platform.map(str::trim).filter(|p| !p.is_empty())?;
    Some((device_key.to_string(), platform.to_string()))
}

/// Maps client-supplied device keys to device rows and links them to users.
#[derive(Clone)]
pub struct DeviceRegistry {
    db: Arc<Database>,
}

impl DeviceRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Resolves the device for a session. Without both a key and a platform the
    /// session is not device-bound and nothing is written.
    ///
    /// Every step is idempotent, so a retry after a partial failure converges on
    /// the same device row and link.
    pub async fn resolve(
        &self,
        user_id: i64,
        device_key: Option<&str>,
        platform: Option<&str>,
    ) -> AuthResult<Option<i64>> {
        let Some((device_key, platform)) = device_pair(device_key, platform) else {
            return Ok(None);
        };

        let device_id = blocking(&self.db, move |db| {
            let now = Utc::now();
            let (device, created) = db.insert_device_if_absent(&device_key, &platform, now)?;

            // Last writer wins on the platform label.
            if !created && device.platform.to_lowercase() != platform.to_lowercase() {
                debug!(
                    "Device {} platform changed from '{}' to '{}'",
                    device.id, device.platform, platform
                );
                db.set_device_platform(device.id, &platform)?;
            }

            if db.link_user_device(user_id, device.id, now)? {
                debug!("Linked device {} to user {}", device.id, user_id);
            }

            Ok(device.id)
        })
        .await?;

        Ok(Some(device_id))
    }
}
