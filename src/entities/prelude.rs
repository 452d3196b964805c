pub use super::blood_pressure::Entity as BloodPressure;
pub use super::feature_flags::Entity as FeatureFlags;
pub use super::music::Entity as Music;
pub use super::permissions::Entity as Permissions;
pub use super::user_permissions::Entity as UserPermissions;
pub use super::users::Entity as Users;
