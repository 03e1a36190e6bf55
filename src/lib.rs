//! Builds normalized weather-location tables (NEXRAD radar sites, METAR
//! observation stations and NWS forecast zones) from the upstream listings,
//! and finds the closest entry of each table to a point.

pub mod artifact;
pub mod build;
pub mod cli;
pub mod config;
pub mod constants;
pub mod coords;
pub mod error;
pub mod nearest;
pub mod normalize;
pub mod record;
pub mod resolver;
pub mod retrieve;
pub mod storage;
