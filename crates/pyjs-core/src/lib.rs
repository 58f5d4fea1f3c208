//! Builds custom Python distributions and the py-js externals that embed them.

pub mod builder;
pub mod config;
pub mod error;
pub mod factory;
pub mod io;
pub mod product;
pub mod project;
pub mod recipe;
pub mod relocate;
pub mod shell;

pub use builder::{Builder, Stage, Variant};
pub use config::Settings;
pub use error::{BuildError, Result};
pub use factory::Factory;
pub use product::Product;
pub use project::{HostPython, Project};
pub use recipe::Recipe;
pub use shell::Shell;

/// User Agent string for archive downloads
pub const USER_AGENT: &str = concat!("pyjs-core/", env!("CARGO_PKG_VERSION"));
