pub mod photo_status;
pub mod storage;

pub use photo_status::PhotoStatus;
