//! Logs lifecycle transitions of `project=ng-voice` pods across all namespaces.

pub mod config;
pub mod error;
pub mod utils;
pub mod watcher;

pub use error::Error;
pub use watcher::{PodEvent, PodWatcher};
