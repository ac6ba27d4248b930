//! Command handlers

pub mod config;
pub mod play;
pub mod show;
