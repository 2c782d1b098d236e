#![allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

pub mod bridge;
pub mod data;
pub mod engine;
pub mod error;
pub mod fund;
pub mod indicators;
pub mod paper;
pub mod registry;
pub mod stats;
pub mod strategies;
