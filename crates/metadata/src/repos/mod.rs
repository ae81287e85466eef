//! Repository traits for metadata operations.

pub mod files;
pub mod uploads;

pub use files::FileRepo;
pub use uploads::UploadSessionRepo;
