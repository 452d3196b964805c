pub mod auth_service;
pub use auth_service::{AuthError, AuthService, Registration, UserProfile};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod user_service;
pub use user_service::{PermissionDto, UserDetail, UserService};

pub mod user_service_impl;
pub use user_service_impl::SeaOrmUserService;

pub mod mail;
pub use mail::{LettreMailer, Mailer, RecordingMailer};

pub mod oauth;
pub use oauth::GoogleOAuthClient;

pub mod password;
pub use password::PasswordHasher;

pub mod strategy;
pub use strategy::{AuthStrategy, Credentials, FederatedProfile, StrategyRegistry};

pub mod tokens;
