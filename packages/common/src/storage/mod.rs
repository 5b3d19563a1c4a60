mod error;
mod key;
mod signer;
mod traits;

pub mod filesystem;
#[cfg(feature = "object-storage")]
pub mod s3;

pub use error::StorageError;
pub use key::ObjectKey;
pub use signer::{SignatureError, SignedMethod, SignedQuery, UrlSigner};
pub use traits::{BoxReader, ObjectMeta, ObjectStore};
