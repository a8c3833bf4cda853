//! Tablescout - reservation platform detection and venue coverage auditing.
//!
//! Background subsystem of a restaurant tracker: figures out where a venue
//! takes reservations (and how far ahead it can be booked), and keeps rating
//! coverage fresh through scheduled, rate-limited audit sweeps.

pub mod adapters;
pub mod audit;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod detection;
pub mod models;
pub mod repository;
pub mod utils;
