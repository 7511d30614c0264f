//! Service configuration.
//!
//! Two layers: static settings read once at startup (server binding, file
//! locations, limits) and the hot-reloadable generation settings held by the
//! [`ConfigStore`].

mod dynamic_config;
mod handles;
mod loader;
mod static_config;
mod store;

pub use dynamic_config::Patch;
pub use loader::load_static_config;
pub use static_config::StaticConfig;
pub use store::{ConfigState, ConfigStore};
