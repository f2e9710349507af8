pub mod error;
pub mod types;

pub use error::{ResolverError, TransportError};
pub use types::{
    ExtractedFields, FetchedPage, LanguageCode, SearchCandidate, TagHandle, TagKind, VideoRecord,
};
