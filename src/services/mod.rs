pub mod assembler;
pub mod auth;
pub mod image;
pub mod llm;
pub mod store;
