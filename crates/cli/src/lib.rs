pub mod cli;
pub mod commands;
pub mod console;
pub mod error;
pub mod logging;
pub mod output;
