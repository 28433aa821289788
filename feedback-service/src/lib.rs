//! Preceptor feedback service: interviews a preceptor about a student through
//! a chat model, then generates and refines structured feedback.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
