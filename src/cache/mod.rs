pub mod processed_files;

pub use processed_files::ProcessedFileCache;
