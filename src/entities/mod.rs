pub mod prelude;

pub mod blood_pressure;
pub mod feature_flags;
pub mod music;
pub mod permissions;
pub mod user_permissions;
pub mod users;
