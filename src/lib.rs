pub mod config;
pub mod coords;
pub mod error;
pub mod fetch;
pub mod fetcher;
pub mod gaps;
pub mod ledger;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod table;
pub mod zone;
