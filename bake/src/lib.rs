pub(crate) mod args;
pub(crate) mod buildx;
pub(crate) mod definition;
pub(crate) mod input;
pub(crate) mod metadata;
pub(crate) mod process;
pub(crate) mod temp_path;

pub mod cli;
pub mod github;

pub(crate) type Result<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
