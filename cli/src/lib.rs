//! ccert CLI - container image certification.

pub mod commands;
pub mod logging;
pub mod output;
