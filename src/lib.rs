//! Dermolo - Administrative backend for the Desa Dermolo village office
//!
//! This library provides sessions, the request authorization gate and
//! certificate document numbering for the Dermolo admin application.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
