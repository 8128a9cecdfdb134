// =============================================================================
// MESSAGES MAP — Schema Loader
// =============================================================================
// Reads a protoc descriptor set (protoc --include_imports -o messages.pb) and
// turns the MessageType enum into typed message descriptors. The wire_* flags
// live as custom EnumValueOptions extensions, so the set is decoded with
// prost-reflect which keeps extension data that prost-types would drop.
// =============================================================================

use prost_reflect::{DescriptorPool, DynamicMessage, ExtensionDescriptor};
use tracing::{debug, warn};

use crate::error::{GenError, Result};

/// Namespace tag every MessageType value name starts with.
pub const NAME_PREFIX: &str = "MessageType_";

const OPTIONS_MESSAGE: &str = "google.protobuf.EnumValueOptions";

/// Annotations read from one MessageType value's options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageOptions {
    pub wire_in: bool,
    pub wire_out: bool,
    pub wire_debug_in: bool,
    pub wire_debug_out: bool,
    pub bootloader: bool,
    pub no_fsm: bool,
    pub deprecated: bool,
    pub factory: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub name: String,
    pub options: MessageOptions,
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>, options: MessageOptions) -> Self {
        Self { name: name.into(), options }
    }

    /// Name with the `MessageType_` prefix removed.
    pub fn short_name(&self) -> Result<&str> {
        self.name
            .strip_prefix(NAME_PREFIX)
            .ok_or_else(|| GenError::SchemaViolation { name: self.name.clone() })
    }
}

// Extensions are matched by simple name so the tool does not care which
// package the schema declares them in.
struct WireExtensions {
    wire_in: ExtensionDescriptor,
    wire_out: ExtensionDescriptor,
    wire_debug_in: ExtensionDescriptor,
    wire_debug_out: ExtensionDescriptor,
    bootloader: Option<ExtensionDescriptor>,
    no_fsm: Option<ExtensionDescriptor>,
    factory: Option<ExtensionDescriptor>,
}

fn find_extension(pool: &DescriptorPool, name: &str) -> Option<ExtensionDescriptor> {
    pool.all_extensions()
        .find(|ext| ext.name() == name && ext.containing_message().full_name() == OPTIONS_MESSAGE)
}

impl WireExtensions {
    fn resolve(pool: &DescriptorPool) -> Result<Self> {
        let required = |name: &str| {
            find_extension(pool, name).ok_or_else(|| GenError::MissingExtension { name: name.to_owned() })
        };
        let optional = |name: &str| {
            let ext = find_extension(pool, name);
            if ext.is_none() {
                warn!(extension = name, "optional extension not declared, treating as unset");
            }
            ext
        };

        Ok(Self {
            wire_in: required("wire_in")?,
            wire_out: required("wire_out")?,
            wire_debug_in: required("wire_debug_in")?,
            wire_debug_out: required("wire_debug_out")?,
            bootloader: optional("wire_bootloader"),
            no_fsm: optional("wire_no_fsm"),
            factory: optional("factory"),
        })
    }

    fn read(&self, options: &DynamicMessage) -> MessageOptions {
        let deprecated = options
            .get_field_by_name("deprecated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        MessageOptions {
            wire_in: flag(options, Some(&self.wire_in)),
            wire_out: flag(options, Some(&self.wire_out)),
            wire_debug_in: flag(options, Some(&self.wire_debug_in)),
            wire_debug_out: flag(options, Some(&self.wire_debug_out)),
            bootloader: flag(options, self.bootloader.as_ref()),
            no_fsm: flag(options, self.no_fsm.as_ref()),
            deprecated,
            factory: flag(options, self.factory.as_ref()),
        }
    }
}

fn flag(options: &DynamicMessage, ext: Option<&ExtensionDescriptor>) -> bool {
    match ext {
        Some(ext) => options.get_extension(ext).as_bool().unwrap_or(false),
        None => false,
    }
}

/// Decode a serialized FileDescriptorSet and list the values of `enum_name`
/// in declaration order. `enum_name` may be fully qualified or a simple name.
pub fn load_messages(bytes: &[u8], enum_name: &str) -> Result<Vec<MessageDescriptor>> {
    let pool = DescriptorPool::decode(bytes)?;

    let message_type = pool
        .get_enum_by_name(enum_name)
        .or_else(|| pool.all_enums().find(|e| e.name() == enum_name))
        .ok_or_else(|| GenError::UnknownEnum { name: enum_name.to_owned() })?;
    debug!(enum_name = message_type.full_name(), "resolved message enum");

    let extensions = WireExtensions::resolve(&pool)?;

    Ok(message_type
        .values()
        .map(|value| MessageDescriptor::new(value.name(), extensions.read(&value.options())))
        .collect())
}
