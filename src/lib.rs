pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod lookup;
pub mod matcher;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod reconcile;
pub mod stats;
pub mod store;
