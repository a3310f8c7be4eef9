//! vrp-bridge core
//!
//! Turns planning entities into solver requests and solver responses back
//! into route results.

pub mod traits;
pub mod model;
pub mod error;
pub mod units;
pub mod id_map;
pub mod request;
pub mod client;
pub mod response;
pub mod pipeline;
