//! Store adapters behind the [`RegistryStore`](crate::domain::ports::RegistryStore) port.

pub mod in_memory;
pub mod sqlite;

use crate::domain::ports::RegistryStoreBox;
use crate::error::Result;

/// Which backend holds the registry.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Process-local store, lost on restart.
    Memory,
    /// Durable store on a sqlite database file.
    Sqlite {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn label(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// Builds the configured store, creating the sqlite schema when needed.
pub async fn bootstrap(config: &StorageConfig) -> Result<RegistryStoreBox> {
    match config {
        StorageConfig::Memory => Ok(Box::new(in_memory::InMemoryRegistry::default())),
        StorageConfig::Sqlite {
            database_url,
            max_connections,
        } => {
            let store = sqlite::SqliteRegistry::connect(database_url, *max_connections).await?;
            Ok(Box::new(store))
        }
    }
}
