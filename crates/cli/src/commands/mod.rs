pub mod chat;
pub mod serve;
pub mod setup;
pub mod tools;
