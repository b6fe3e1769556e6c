pub mod events;
pub mod serve;
pub mod status;
pub mod validate;
