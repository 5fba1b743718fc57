//! Source module - Where gas prices come from
//!
//! `PriceSource` is the seam the refresh agent fetches through; `GasNowSource`
//! is the HTTP implementation.

mod base;
mod gasnow;

pub use base::*;
pub use gasnow::{GasNowConfig, GasNowSource, DEFAULT_GASNOW_URL, DEFAULT_REQUEST_TIMEOUT};
