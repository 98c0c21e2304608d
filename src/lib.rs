//! Archives unread Gmail messages as Notion pages, with a language model
//! summary, category and sentiment for each.

pub mod archive;
pub mod auth;
pub mod body;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gmail;
pub mod mail;
pub mod models;
pub mod pipeline;

pub use error::Error;
