//! Configuration file handling for `~/.flightstream/config.ini`.
//!
//! Settings structs live in [`settings`], INI parsing in `parser`, and
//! serialization of the commented default file in `writer`.
//! [`ConfigFile::to_pipeline_config`] turns the file into the component
//! configs the pipeline runs with.

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    BroadcastSettings, CacheSettings, ConfigFile, FeedSettings, InterpolationSettings,
    LoggingSettings, ServerSettings,
};
