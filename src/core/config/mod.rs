pub mod credentials;
pub mod data;
pub mod io;
pub mod printing;

pub use credentials::{resolve_settings, CredentialStore, KeyringAccessError, SystemKeyring};
pub use data::Config;
pub use io::ConfigError;
