pub mod environments;
pub mod organizations;
pub mod permissions;
pub mod providers;
pub mod secret_groups;
pub mod secrets;
pub mod user_groups;
