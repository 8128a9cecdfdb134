// =============================================================================
// MESSAGES MAP — Dispatch Table Generator
// =============================================================================
// Walks the wire categories in fixed order (in, out, debug in, debug out) and
// for every message flagged for a category writes either one dispatch table
// row or a comment saying why it was left out. Rows for in/out/debug-out also
// get _Static_assert lines checking the fixed message buffers are big enough.
//
// Row order is category-major, declaration-order-minor. Firmware dispatch
// looks rows up in table order, so this order must not change.
// =============================================================================

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::error::Result;
use crate::schema::{MessageDescriptor, MessageOptions, NAME_PREFIX};

pub const BANNER: &str = "// This file is automatically generated by messages-map -- DO NOT EDIT!";

/// Messages whose rows get their own DEBUG_LINK guard wherever they appear.
/// Matched by exact name; the schema has no flag for this.
pub const SPECIAL_DEBUG_MESSAGES: &[&str] = &["MessageType_LoadDevice"];

const FIELDS_SUFFIX: &str = "_fields";
const HANDLER_PREFIX: &str = "fsm_msg";
const HANDLER_CAST: &str = "(void (*)(const void *))";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interface {
    Normal,
    Debug,
}

impl Interface {
    pub const fn tag(self) -> char {
        match self {
            Interface::Normal => 'n',
            Interface::Debug => 'd',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub const fn tag(self) -> char {
        match self {
            Direction::In => 'i',
            Direction::Out => 'o',
        }
    }
}

/// Buffer size macros a message must fit into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeBounds {
    pub encoded: &'static str,
    pub decoded: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WireCategory {
    In,
    Out,
    DebugIn,
    DebugOut,
}

impl WireCategory {
    /// Emission order.
    pub const ALL: [WireCategory; 4] =
        [WireCategory::In, WireCategory::Out, WireCategory::DebugIn, WireCategory::DebugOut];

    pub const fn label(self) -> &'static str {
        match self {
            WireCategory::In => "in messages",
            WireCategory::Out => "out messages",
            WireCategory::DebugIn => "debug in messages",
            WireCategory::DebugOut => "debug out messages",
        }
    }

    pub const fn interface(self) -> Interface {
        match self {
            WireCategory::In | WireCategory::Out => Interface::Normal,
            WireCategory::DebugIn | WireCategory::DebugOut => Interface::Debug,
        }
    }

    pub const fn direction(self) -> Direction {
        match self {
            WireCategory::In | WireCategory::DebugIn => Direction::In,
            WireCategory::Out | WireCategory::DebugOut => Direction::Out,
        }
    }

    pub const fn size_bounds(self) -> Option<SizeBounds> {
        match self {
            WireCategory::In => Some(SizeBounds {
                encoded: "MSG_IN_ENCODED_SIZE",
                decoded: "MSG_IN_DECODED_SIZE",
            }),
            WireCategory::Out => Some(SizeBounds {
                encoded: "MSG_OUT_ENCODED_SIZE",
                decoded: "MSG_OUT_DECODED_SIZE",
            }),
            WireCategory::DebugOut => Some(SizeBounds {
                encoded: "MSG_DEBUG_OUT_ENCODED_SIZE",
                decoded: "MSG_OUT_DECODED_SIZE",
            }),
            WireCategory::DebugIn => None,
        }
    }

    fn flagged(self, options: &MessageOptions) -> bool {
        match self {
            WireCategory::In => options.wire_in,
            WireCategory::Out => options.wire_out,
            WireCategory::DebugIn => options.wire_debug_in,
            WireCategory::DebugOut => options.wire_debug_out,
        }
    }
}

/// Categories whose wire flag is set on `message`, in emission order.
pub fn classify(message: &MessageDescriptor) -> Vec<WireCategory> {
    WireCategory::ALL
        .into_iter()
        .filter(|c| c.flagged(&message.options))
        .collect()
}

/// Short-name prefixes excluded from generation altogether.
#[derive(Clone, Debug, Default)]
pub struct SkipList(Vec<String>);

impl SkipList {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self(prefixes)
    }

    pub fn matches(&self, short_name: &str) -> bool {
        self.0.iter().any(|p| short_name.starts_with(p.as_str()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandFlags {
    Default,
    FactoryOnly,
}

impl CommandFlags {
    pub const fn symbol(self) -> &'static str {
        match self {
            CommandFlags::Default => "CommandFlags_Default",
            CommandFlags::FactoryOnly => "CommandFlags_Factory_Only",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exclusion {
    Deprecated,
    Bootloader,
    NoFsm,
}

impl Exclusion {
    fn reason(self) -> &'static str {
        match self {
            Exclusion::Deprecated => "is deprecated",
            Exclusion::Bootloader => "is used in bootloader mode only",
            Exclusion::NoFsm => "is not used in FSM",
        }
    }
}

/// One dispatch table initializer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedRow {
    pub interface: Interface,
    pub direction: Direction,
    pub command_flags: CommandFlags,
    pub message_id: String,
    pub fields: String,
    /// Handler name; `None` writes a literal 0.
    pub handler: Option<String>,
}

impl fmt::Display for GeneratedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Column widths keep the output diffable against older tables.
        let message_id = format!("{},", self.message_id);
        let fields = format!("{},", self.fields);
        write!(
            f,
            "{{ '{}', '{}', {}, {:<46} {:<29} ",
            self.interface.tag(),
            self.direction.tag(),
            self.command_flags.symbol(),
            message_id,
            fields,
        )?;
        match &self.handler {
            Some(handler) => write!(f, "{HANDLER_CAST}{handler} }},"),
            None => write!(f, "0 }},"),
        }
    }
}

/// Compile time checks that `short_name` fits the category's buffers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeAssertion {
    pub bounds: SizeBounds,
    pub short_name: String,
}

impl fmt::Display for SizeAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "_Static_assert({} >= {}_size, \"msg buffer too small\");",
            self.bounds.encoded, self.short_name
        )?;
        writeln!(
            f,
            "_Static_assert({} >= sizeof({}), \"msg buffer too small\");",
            self.bounds.decoded, self.short_name
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Matched the skip list; nothing is written.
    Skipped,
    Excluded { short_name: String, reason: Exclusion },
    Row { row: GeneratedRow, assertion: Option<SizeAssertion> },
}

/// Decide what one (message, category) pair turns into.
pub fn handle_message(
    message: &MessageDescriptor,
    category: WireCategory,
    skip: &SkipList,
) -> Result<Disposition> {
    let short_name = message.short_name()?;

    if skip.matches(short_name) {
        return Ok(Disposition::Skipped);
    }

    let options = &message.options;
    let excluded = if options.deprecated {
        Some(Exclusion::Deprecated)
    } else if options.bootloader {
        Some(Exclusion::Bootloader)
    } else if options.no_fsm {
        Some(Exclusion::NoFsm)
    } else {
        None
    };
    if let Some(reason) = excluded {
        return Ok(Disposition::Excluded { short_name: short_name.to_owned(), reason });
    }

    let handler = match category.direction() {
        Direction::In => Some(format!("{HANDLER_PREFIX}{short_name}")),
        Direction::Out => None,
    };
    let command_flags = if options.factory {
        CommandFlags::FactoryOnly
    } else {
        CommandFlags::Default
    };

    let row = GeneratedRow {
        interface: category.interface(),
        direction: category.direction(),
        command_flags,
        message_id: format!("{NAME_PREFIX}{}", message.name),
        fields: format!("{short_name}{FIELDS_SUFFIX}"),
        handler,
    };
    let assertion = category
        .size_bounds()
        .map(|bounds| SizeAssertion { bounds, short_name: short_name.to_owned() });

    Ok(Disposition::Row { row, assertion })
}

/// Counts reported after a generation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub rows: usize,
    pub excluded: usize,
    pub skipped: usize,
    pub assertions: usize,
}

/// Write the dispatch table to `table` and the size assertions to `limits`.
pub fn generate<T: Write, L: Write>(
    messages: &[MessageDescriptor],
    skip: &SkipList,
    table: &mut T,
    limits: &mut L,
) -> Result<Summary> {
    let mut summary = Summary::default();

    // Deprecated MessageType values never reach the table.
    let mut grouped: HashMap<WireCategory, Vec<&MessageDescriptor>> = HashMap::new();
    for message in messages.iter().filter(|m| !m.options.deprecated) {
        for category in classify(message) {
            grouped.entry(category).or_default().push(message);
        }
    }

    writeln!(table, "\t{BANNER}")?;
    writeln!(limits, "{BANNER}\n")?;

    for category in WireCategory::ALL {
        if category == WireCategory::DebugIn {
            write!(table, "\n#if DEBUG_LINK\n")?;
            write!(limits, "\n#if DEBUG_LINK\n")?;
        }

        write!(table, "\n\t// {}\n\n", category.label())?;

        let members = grouped.get(&category).map(Vec::as_slice).unwrap_or_default();
        for message in members {
            let special = SPECIAL_DEBUG_MESSAGES.contains(&message.name.as_str());
            if special {
                writeln!(table, "#if DEBUG_LINK")?;
            }

            match handle_message(message, category, skip)? {
                Disposition::Skipped => {
                    debug!(message = %message.name, "skipped by prefix");
                    summary.skipped += 1;
                }
                Disposition::Excluded { short_name, reason } => {
                    debug!(message = %message.name, category = category.label(), reason = reason.reason(), "excluded");
                    writeln!(table, "\t// Message {short_name} {}", reason.reason())?;
                    summary.excluded += 1;
                }
                Disposition::Row { row, assertion } => {
                    writeln!(table, "\t{row}")?;
                    summary.rows += 1;
                    if let Some(assertion) = assertion {
                        write!(limits, "{assertion}")?;
                        summary.assertions += 2;
                    }
                }
            }

            if special {
                writeln!(table, "#endif")?;
            }
        }

        if category == WireCategory::DebugOut {
            write!(table, "\n#endif\n")?;
            writeln!(limits, "#endif")?;
        }
    }

    Ok(summary)
}
