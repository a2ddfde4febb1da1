pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod github;
pub mod inspect;
pub mod logging;
pub mod model;
pub mod report;
pub mod util;
