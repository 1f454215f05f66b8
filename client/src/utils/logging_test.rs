#[cfg(test)]
mod tests {
    use super::super::logging::{init_logging, init_test_logging};

    #[test]
    fn test_logging_initialization_is_idempotent() {
        init_logging();
        // a second installation must not panic
        init_logging();
        init_test_logging();

        tracing::debug!("logging still usable");
    }
}
