//! Database configuration.

/// Configuration for creating a database.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Engine-level hint that transactions should be treated as durable.
    ///
    /// The engine modeled here is memory-resident, so this changes no
    /// observable behavior; it is carried on every snapshot root for
    /// engine layers that care.
    pub durable_transactions: bool,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the durable-transactions hint.
    #[must_use]
    pub const fn durable_transactions(mut self, value: bool) -> Self {
        self.durable_transactions = value;
        self
    }
}
