//! Structured output envelope.

#[cfg(test)]
mod tests;

mod format;
mod model;
mod result_builder;

pub use format::OutputFormat;
pub use model::*;
pub use result_builder::{ResultBuilder, print_result, write_result};
