mod settings;

pub use settings::{LoggingConfig, ProviderConfig, Settings, StorageConfig, SystemConfig};
