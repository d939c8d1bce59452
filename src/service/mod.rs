pub mod download;
pub mod prompt;
pub mod setup;
