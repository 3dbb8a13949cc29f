pub mod audit;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod grpc;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod proto;
pub mod rest;
pub mod revocation;
pub mod service;
pub mod shadow;
pub mod telemetry;
