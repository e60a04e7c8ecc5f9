//! Structural verification of decoded images
//!
//! Decoding only checks that an image is readable; verification checks that
//! what it declares is coherent. Both run before any image is installed.

use crate::image::UnitImage;
use std::collections::HashSet;
use thiserror::Error;

/// Structural verification errors
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Empty or malformed unit name
    #[error("Invalid unit name: {0:?}")]
    InvalidName(String),

    /// Two fields share a name
    #[error("Duplicate field {field:?} in unit {unit}")]
    DuplicateField {
        /// Unit declaring the duplicate
        unit: String,
        /// The repeated field name
        field: String,
    },

    /// Two methods share a name
    #[error("Duplicate method {method:?} in unit {unit}")]
    DuplicateMethod {
        /// Unit declaring the duplicate
        unit: String,
        /// The repeated method name
        method: String,
    },

    /// Unit declares itself as its own supertype or interface
    #[error("Unit {0} declares itself as its own supertype")]
    SelfInheritance(String),
}

/// Verify a decoded image's structure
pub fn verify_image(image: &UnitImage) -> Result<(), VerifyError> {
    verify_name(&image.name)?;

    for declared in image.declared_supertypes() {
        verify_name(declared)?;
        if declared == image.name {
            return Err(VerifyError::SelfInheritance(image.name.clone()));
        }
    }

    let mut seen_fields = HashSet::new();
    for field in &image.fields {
        if !seen_fields.insert(field.as_str()) {
            return Err(VerifyError::DuplicateField {
                unit: image.name.clone(),
                field: field.clone(),
            });
        }
    }

    let mut seen_methods = HashSet::new();
    for method in &image.methods {
        if !seen_methods.insert(method.name.as_str()) {
            return Err(VerifyError::DuplicateMethod {
                unit: image.name.clone(),
                method: method.name.clone(),
            });
        }
    }

    Ok(())
}

/// A unit name is one or more identifier segments joined by '.'
fn verify_name(name: &str) -> Result<(), VerifyError> {
    if name.is_empty() {
        return Err(VerifyError::InvalidName(name.to_string()));
    }
    for segment in name.split('.') {
        let mut chars = segment.chars();
        let valid = match chars.next() {
            Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
                chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
            }
            _ => false,
        };
        if !valid {
            return Err(VerifyError::InvalidName(name.to_string()));
        }
    }
    Ok(())
}
