//! BeCash Service - personal and family finance: cards, statements, entries, goals and points.

pub mod calendar;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod money;
pub mod services;
pub mod startup;
