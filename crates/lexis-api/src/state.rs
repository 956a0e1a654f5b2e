use std::sync::Arc;

use lexis_auth::{AuthConfig, AuthResult, EmailSender, PasswordResetService, SessionService};
use lexis_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub sessions: SessionService,
    pub resets: PasswordResetService,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        config: &AuthConfig,
        mailer: Arc<dyn EmailSender>,
    ) -> AuthResult<AppState> {
        let sessions = SessionService::new(db.clone(), config)?;
        let resets = PasswordResetService::new(
            db,
            sessions.credentials().clone(),
            mailer,
            config.reset_code_lifetime(),
        );
        Ok(Arc::new(Self { sessions, resets }))
    }
}
