pub mod blood_pressure;
pub mod feature_flag;
pub mod music;
pub mod permission;
pub mod user;
