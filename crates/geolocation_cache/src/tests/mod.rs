//! Scenario and property tests for the geolocation cache
//!
//! - Cache scenarios (full rebuild, location changes, parent filtering)
//! - Projection properties (round trips, latitude clamp, map sizes)
//! - Index correctness against brute force for both backends

#[cfg(test)]
pub mod cache_scenarios;
