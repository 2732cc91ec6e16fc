pub mod aggregator;
pub mod app;
pub mod config;
pub mod cx;
pub mod cyrest;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod events;
pub mod http;
pub mod monitor;
pub mod mygene;
pub mod network;
pub mod output;
pub mod search_service;
pub mod style;
