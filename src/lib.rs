pub mod access;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod push;
pub mod services;
pub mod workflow;

#[cfg(test)]
pub mod testing;
