/// Logging utilities
pub mod logging;

#[cfg(test)]
mod logging_test;
