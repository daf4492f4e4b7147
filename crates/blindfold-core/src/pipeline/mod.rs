//! The single-image de-identification pipeline.
//!
//! Stages, in the order [`Scrubber`] runs them:
//! - **validate**: confirm the buffer is a decodable raster image
//! - **strip**: re-encode without EXIF, XMP, ICC, thumbnails, or comments
//! - **detect**: find frontal faces with a Haar cascade
//! - **blur**: Gaussian-blur every face and re-encode as JPEG
//!
//! Supporting modules handle decoding, read-only metadata inspection,
//! content hashing, and file discovery for bulk runs.

pub mod blur;
pub mod cascade;
pub mod decode;
pub mod detect;
pub mod discovery;
pub mod hash;
pub mod metadata;
pub mod processor;
pub mod strip;
pub mod validate;

pub use blur::FaceBlurrer;
pub use cascade::Cascade;
pub use decode::{guess_extension, DecodedImage};
pub use detect::FaceDetector;
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use hash::{Hasher, IdentityCheck};
pub use metadata::MetadataInspector;
pub use processor::{Scrubber, ScrubberConfig};
pub use strip::MetadataStripper;
pub use validate::Validator;
