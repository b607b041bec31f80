pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod llm;
pub mod rag;
pub mod split;
pub mod tracker;
pub mod transform;
pub mod workflow;
