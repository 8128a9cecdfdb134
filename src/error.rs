// =============================================================================
// MESSAGES MAP — Error Types
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    /// Every MessageType value must carry the namespace prefix; the short
    /// name cannot be derived otherwise.
    #[error("message {name} does not start with the MessageType_ prefix")]
    SchemaViolation { name: String },

    #[error("enum {name} not found in descriptor set")]
    UnknownEnum { name: String },

    #[error("EnumValueOptions extension {name} not declared in descriptor set")]
    MissingExtension { name: String },

    #[error("invalid descriptor set: {0}")]
    Descriptor(#[from] prost_reflect::DescriptorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = GenError> = std::result::Result<T, E>;
