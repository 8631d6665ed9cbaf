pub mod auth;
pub mod videos;
