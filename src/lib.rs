pub mod backup;
pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod manage;
pub mod models;
pub mod platform;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod storage;
