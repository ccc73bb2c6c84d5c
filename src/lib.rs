pub mod cli;
pub mod config;
pub mod harvest;
pub mod notify;
pub mod pipeline;
pub mod service;
pub mod staging;
