pub mod backtest;
pub mod catalog;
pub mod cli;
pub mod edge;
pub mod error;
pub mod features;
pub mod http_client;
pub mod market;
pub mod market_fetch;
pub mod model_config;
pub mod predictions;
pub mod scoring;
