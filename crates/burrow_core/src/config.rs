//! Environment and database configuration.

use crate::types::{KeyType, KEY_SIZE_UNLIMITED, RECORD_SIZE_UNLIMITED};

/// Configuration for opening an environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Whether transactions are enabled.
    pub enable_transactions: bool,
    /// Whether recovery (journalling) is enabled.
    pub enable_recovery: bool,
    /// Page size used to lay out B-tree leaves.
    pub page_size: usize,
    /// Whether the journal syncs after every append.
    pub sync_journal: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            enable_transactions: true,
            enable_recovery: false,
            page_size: 16 * 1024,
            sync_journal: false,
        }
    }
}

impl EnvConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables transactions.
    #[must_use]
    pub const fn enable_transactions(mut self, value: bool) -> Self {
        self.enable_transactions = value;
        self
    }

    /// Enables or disables recovery journalling.
    #[must_use]
    pub const fn enable_recovery(mut self, value: bool) -> Self {
        self.enable_recovery = value;
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, value: usize) -> Self {
        self.page_size = value;
        self
    }

    /// Enables or disables journal sync on append.
    #[must_use]
    pub const fn sync_journal(mut self, value: bool) -> Self {
        self.sync_journal = value;
        self
    }
}

/// Configuration for creating a database within an environment.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Numeric database name, unique within the environment.
    pub name: u16,
    /// Key type; fixed-width types pin the key size.
    pub key_type: KeyType,
    /// Key size in bytes, or [`KEY_SIZE_UNLIMITED`].
    pub key_size: usize,
    /// Record size in bytes, or [`RECORD_SIZE_UNLIMITED`].
    pub record_size: usize,
    /// Whether the database stores duplicate keys.
    pub enable_duplicates: bool,
    /// Whether fixed-size records are stored inline in the leaf.
    ///
    /// Derived at creation from the record size and page fit; not settable.
    pub records_inline: bool,
}

impl DatabaseConfig {
    /// Creates a configuration for the database `name`.
    #[must_use]
    pub fn new(name: u16) -> Self {
        Self {
            name,
            key_type: KeyType::Binary,
            key_size: KEY_SIZE_UNLIMITED,
            record_size: RECORD_SIZE_UNLIMITED,
            enable_duplicates: false,
            records_inline: false,
        }
    }

    /// Sets the key type.
    #[must_use]
    pub const fn key_type(mut self, value: KeyType) -> Self {
        self.key_type = value;
        self
    }

    /// Sets a fixed key size for binary keys.
    #[must_use]
    pub const fn key_size(mut self, value: usize) -> Self {
        self.key_size = value;
        self
    }

    /// Sets a fixed record size.
    #[must_use]
    pub const fn record_size(mut self, value: usize) -> Self {
        self.record_size = value;
        self
    }

    /// Enables duplicate keys.
    #[must_use]
    pub const fn enable_duplicates(mut self, value: bool) -> Self {
        self.enable_duplicates = value;
        self
    }
}
