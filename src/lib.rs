pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod intercept;
pub mod logging;
pub mod proxy;
pub mod state;
pub mod web;
