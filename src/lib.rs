#![forbid(unsafe_code)]

pub mod book;
pub mod cli;
pub mod config;
pub mod content;
pub mod events;
pub mod fragment;
pub mod location;
pub mod logging;
pub mod navigation;
pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod snapshot;
pub mod xapi;
