//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of operations accepted in one push.
    pub max_push_operations: usize,
    /// Length of issued node secrets, in random bytes (before encoding).
    pub secret_bytes: usize,
}

impl ServerConfig {
    /// Sets the push batch limit.
    pub fn with_max_push_operations(mut self, limit: usize) -> Self {
        self.max_push_operations = limit;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_push_operations: 1000,
            secret_bytes: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_builder() {
        let config = ServerConfig::default();
        assert_eq!(config.max_push_operations, 1000);

        let config = ServerConfig::default().with_max_push_operations(10);
        assert_eq!(config.max_push_operations, 10);
    }
}
