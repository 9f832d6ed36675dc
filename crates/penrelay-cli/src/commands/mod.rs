//! Command handlers

pub mod config;
pub mod drain;
pub mod push;
pub mod run;
pub mod status;
