//! docsift: local hybrid keyword + semantic retrieval over markdown and text
//! documents, with a summary-first search surface for agents.

pub mod cli;
pub mod config;
pub mod error;
pub mod scan;
pub mod search;

pub use config::Config;
pub use error::{Error, Result};
