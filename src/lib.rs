//! Natural-language questions over relational databases and data files.
//!
//! A question is answered by [`orchestrator::QueryOrchestrator`]: it picks
//! the schema context for the question, asks an LLM what kind of answer is
//! needed, and runs the generated query through [`db::DataAccessManager`].

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod schema;
pub mod search;
pub mod store;
pub mod util;
