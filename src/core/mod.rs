pub mod analysis;
pub mod battle;
pub mod chat;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod memory;
pub mod stream;
pub mod terminal;
