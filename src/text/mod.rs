//! Turning raw OCR lines into a canonical plate signature.

pub mod canonical;
pub mod normalizer;
pub mod translation;
pub mod watermark;

pub use canonical::{canonicalize, PlateSignature};
pub use normalizer::{NormalizedText, TextNormalizer};
pub use translation::CharTable;
pub use watermark::{Watermark, WatermarkConfig};
