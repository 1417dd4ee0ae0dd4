//! CLI subcommands.

pub mod check_price;
pub mod predictions;
pub mod setup;
pub mod train;
