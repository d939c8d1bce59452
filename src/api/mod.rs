pub mod archive_api;

pub use archive_api::ArchiveApi;
