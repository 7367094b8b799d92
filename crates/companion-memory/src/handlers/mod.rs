pub mod chat;
pub mod companion;
pub mod health;
