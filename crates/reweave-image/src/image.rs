//! Unit image format

use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use thiserror::Error;

/// Magic number for unit images: "RWUV"
pub const MAGIC: [u8; 4] = *b"RWUV";

/// Current image format version
pub const VERSION: u32 = 1;

/// Image encoding/decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected RWUV, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum stored in the image header
        expected: u32,
        /// Checksum computed over the payload
        actual: u32,
    },

    /// Image shorter than the fixed header
    #[error("Image truncated: {0} bytes, header needs 16")]
    TruncatedHeader(usize),
}

/// A method declared by a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Number of parameters
    pub param_count: u16,
    /// Opaque executable body
    pub code: Vec<u8>,
}

impl MethodDef {
    fn encode(&self, writer: &mut ImageWriter) {
        writer.emit_string(&self.name);
        writer.emit_u16(self.param_count);
        writer.emit_u32(self.code.len() as u32);
        writer.emit_raw(&self.code);
    }

    fn decode(reader: &mut ImageReader) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let param_count = reader.read_u16()?;
        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;
        Ok(Self {
            name,
            param_count,
            code,
        })
    }
}

/// Decoded executable form of one loadable unit
///
/// Binary layout:
/// - Header: magic (4 bytes) + version (u32) + flags (u32) + checksum (u32)
/// - Payload: unit name, optional supertype, interface list, field list,
///   method list
///
/// The checksum is a CRC32 of everything after the 16-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitImage {
    /// Image flags (reserved, currently always 0)
    pub flags: u32,
    /// Dotted unit name the image declares for itself
    pub name: String,
    /// Declared supertype, if any
    pub supertype: Option<String>,
    /// Declared interfaces
    pub interfaces: Vec<String>,
    /// Declared field names
    pub fields: Vec<String>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
}

impl UnitImage {
    /// Create a new empty image declaring `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            flags: 0,
            name: name.into(),
            supertype: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// All type names this unit declares a relationship to
    /// (supertype first, then interfaces in declaration order)
    pub fn declared_supertypes(&self) -> impl Iterator<Item = &str> {
        self.supertype
            .as_deref()
            .into_iter()
            .chain(self.interfaces.iter().map(String::as_str))
    }

    /// Encode the image to its binary form
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ImageWriter::new();

        // Header; the checksum is patched in once the payload is known
        writer.emit_raw(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_string(&self.name);

        match &self.supertype {
            Some(supertype) => {
                writer.emit_u8(1);
                writer.emit_string(supertype);
            }
            None => writer.emit_u8(0),
        }

        writer.emit_u32(self.interfaces.len() as u32);
        for interface in &self.interfaces {
            writer.emit_string(interface);
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_string(field);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        let checksum = crc32fast::hash(&writer.bytes()[16..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode an image from its binary form
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        if data.len() < 16 {
            return Err(ImageError::TruncatedHeader(data.len()));
        }

        let mut reader = ImageReader::new(data);

        let magic: [u8; 4] = reader
            .read_bytes(4)?
            .try_into()
            .map_err(|_| ImageError::TruncatedHeader(data.len()))?;
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;

        let actual = crc32fast::hash(&data[16..]);
        if stored_checksum != actual {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_checksum,
                actual,
            });
        }

        let name = reader.read_string()?;

        let supertype = if reader.read_u8()? != 0 {
            Some(reader.read_string()?)
        } else {
            None
        };

        let interface_count = reader.read_u32()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count.min(1024));
        for _ in 0..interface_count {
            interfaces.push(reader.read_string()?);
        }

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(1024));
        for _ in 0..field_count {
            fields.push(reader.read_string()?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(1024));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        Ok(Self {
            flags,
            name,
            supertype,
            interfaces,
            fields,
            methods,
        })
    }
}
