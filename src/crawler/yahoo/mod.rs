//! # Yahoo Finance
//!
//! Two keyless JSON endpoints on `query1.finance.yahoo.com`:
//!
//! - **quote (`quote`)**: `v7/finance/quote?symbols=`, one object per symbol.
//! - **chart (`chart`)**: `v8/finance/chart/{symbol}`, metadata plus a candle series.
//!
//! Both are keyless, so 401/403 only means this upstream refuses us today.

/// Candle endpoint
pub mod chart;
/// Market-quote endpoint
pub mod quote;
