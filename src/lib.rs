pub mod app;
pub mod auth;
pub mod classify;
pub mod cli;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod registry;
pub mod types;
