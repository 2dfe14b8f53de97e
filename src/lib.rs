pub mod types;
pub mod commands;
pub mod error;
pub mod host;
pub mod config;
pub mod logging;
pub mod reload;

pub use types::*;
pub use commands::{BuilderMap, CommandBuilder, CommandKind, CommandOption, DeclareScope};
pub use error::{
    DeclareError, LoadModuleError, RegisterError, ReloadModuleError, ReloaderError, ResolveError,
    UnloadModuleError,
};
pub use host::{NoopReloadObserver, ReloadObserver, ReloaderHost};
pub use config::{LoggingConfig, ReloadConfig, Settings};
pub use reload::{HotReloader, ReloaderStats};
