//! Utilities for telepwn.
//!
//! Submodules:
//! - `interpolation`: `{placeholder}` substitution and trigger parameter parsing.
//! - `text`: message chunking and quote stripping.

pub mod interpolation;
pub mod text;
