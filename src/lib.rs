// src/lib.rs
pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod quote;
pub mod settings;
