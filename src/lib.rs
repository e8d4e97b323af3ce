#![forbid(unsafe_code)]

pub mod archive;
pub mod cache;
pub mod cli;
pub mod corpus;
pub mod dataset;
pub mod download;
pub mod enumerate;
pub mod extract;
pub mod formats;
pub mod logging;
pub mod media;
pub mod pool;
pub mod repair;
pub mod session;
pub mod site;
pub mod stats;
pub mod store;
pub mod tier;
