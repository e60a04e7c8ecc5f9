//! Unit image format for the Reweave redefinition engine
//!
//! A unit image is the byte-exact executable form of one loadable unit.
//! This crate owns the binary layout (header, checksum, payload encoding),
//! decoding into [`UnitImage`], and structural verification of decoded
//! images. It knows nothing about stores, transformers or batches.

mod encoder;
mod image;
mod verify;

pub use encoder::{DecodeError, ImageReader, ImageWriter};
pub use image::{ImageError, MethodDef, UnitImage, MAGIC, VERSION};
pub use verify::{verify_image, VerifyError};
