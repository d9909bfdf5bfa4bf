pub mod conversation;
pub mod entity;
pub mod intent;
pub mod query;
pub mod response;
