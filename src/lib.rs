pub mod access;
pub mod account;
pub mod booking;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod message;
pub mod order;
pub mod payment;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;
