pub mod analysis;
pub mod chat;
pub mod data_uri;
pub mod notice;
pub mod visitor;
