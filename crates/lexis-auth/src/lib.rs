//! Account sessions: credentials, device binding, access tokens, refresh-token
//! rotation, federated sign-in and password-reset codes.

pub mod config;
pub mod credentials;
pub mod devices;
pub mod email;
pub mod error;
pub mod federated;
pub mod password_reset;
pub mod refresh;
pub mod session;
pub mod tokens;

mod store;

pub use config::{AuthConfig, GoogleOptions, JwtOptions};
pub use credentials::CredentialStore;
pub use devices::DeviceRegistry;
pub use email::{EmailSender, LogEmailSender};
pub use error::{AuthError, AuthResult, RefreshRejection};
pub use federated::{FederatedIdentityBridge, FederatedIdentityProvider, IdentityAssertion};
pub use password_reset::PasswordResetService;
pub use refresh::RefreshLedger;
pub use session::{DeviceHint, FederatedSession, Session, SessionService};
pub use tokens::TokenIssuer;
