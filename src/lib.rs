pub mod config;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod html_table;
pub mod http_client;
pub mod logging;
pub mod match_stats;
pub mod model;
pub mod normalize;
pub mod page_fetch;
pub mod persist;
pub mod pipeline;
pub mod record;
pub mod runner;
pub mod session;
pub mod site;
pub mod teams;
pub mod text;
pub mod wages;
