// =============================================================================
// MESSAGES MAP — Dispatch Table Generator
// =============================================================================
// Build-time tool. Reads the compiled message schema (protoc descriptor set)
// and writes two C headers for the firmware:
//   messages_map.h         rows for the message dispatch table
//   messages_map_limits.h  _Static_assert checks on message buffer sizes
// Positional arguments are short-name prefixes to leave out of both files.
// =============================================================================

mod error;
mod generator;
mod schema;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::generator::{SkipList, Summary};
use crate::schema::MessageDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "messages-map")]
#[command(about = "Generate the firmware message dispatch table and buffer limit headers")]
#[command(version)]
struct Args {
    /// Short-name prefixes of messages to leave out entirely
    skip: Vec<String>,

    /// Descriptor set written by `protoc --include_imports -o`
    #[arg(long, env = "MESSAGES_MAP_DESCRIPTOR_SET", default_value = "messages.pb")]
    descriptor_set: PathBuf,

    /// Enum listing the wire messages
    #[arg(long, default_value = "MessageType")]
    enum_name: String,

    /// Directory the headers are written to
    #[arg(long, env = "MESSAGES_MAP_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Dispatch table header name
    #[arg(long, default_value = "messages_map.h")]
    table_file: String,

    /// Size assertion header name
    #[arg(long, default_value = "messages_map_limits.h")]
    limits_file: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("messages_map=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Generate both headers. The files stay open only for the duration of the
/// pass and are dropped (closed) on every exit path.
fn write_headers(
    messages: &[MessageDescriptor],
    skip: &SkipList,
    table_path: &Path,
    limits_path: &Path,
) -> anyhow::Result<Summary> {
    let table = File::create(table_path).with_context(|| format!("creating {}", table_path.display()))?;
    let limits = File::create(limits_path).with_context(|| format!("creating {}", limits_path.display()))?;
    let mut table = BufWriter::new(table);
    let mut limits = BufWriter::new(limits);

    let summary = generator::generate(messages, skip, &mut table, &mut limits)?;

    table.flush().with_context(|| format!("writing {}", table_path.display()))?;
    limits.flush().with_context(|| format!("writing {}", limits_path.display()))?;
    Ok(summary)
}

fn run(args: Args) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.descriptor_set)
        .with_context(|| format!("reading descriptor set {}", args.descriptor_set.display()))?;
    let messages = schema::load_messages(&bytes, &args.enum_name)
        .with_context(|| format!("loading {} from {}", args.enum_name, args.descriptor_set.display()))?;
    info!(path = %args.descriptor_set.display(), messages = messages.len(), "schema loaded");

    let skip = SkipList::new(args.skip);
    let table_path = args.out_dir.join(&args.table_file);
    let limits_path = args.out_dir.join(&args.limits_file);

    let summary = write_headers(&messages, &skip, &table_path, &limits_path)?;
    info!(
        rows = summary.rows,
        excluded = summary.excluded,
        skipped = summary.skipped,
        assertions = summary.assertions,
        table = %table_path.display(),
        limits = %limits_path.display(),
        "headers written"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::{descriptor_set, flags, WIRE_DEBUG_OUT, WIRE_IN, WIRE_OUT, WIRE_BOOTLOADER};

    fn args_for(dir: &Path, descriptor: PathBuf, skip: &[&str]) -> Args {
        let mut argv = vec!["messages-map".to_string()];
        argv.extend(skip.iter().map(|s| s.to_string()));
        argv.push("--descriptor-set".into());
        argv.push(descriptor.display().to_string());
        argv.push("--out-dir".into());
        argv.push(dir.display().to_string());
        Args::parse_from(argv)
    }

    fn write_schema(dir: &Path) -> PathBuf {
        let path = dir.join("messages.pb");
        let bytes = descriptor_set(&[
            ("MessageType_Initialize", flags(&[WIRE_IN])),
            ("MessageType_Features", flags(&[WIRE_OUT])),
            ("MessageType_FirmwareErase", flags(&[WIRE_IN, WIRE_BOOTLOADER])),
            ("MessageType_BarBaz", flags(&[WIRE_IN])),
            ("MessageType_LoadDevice", flags(&[WIRE_DEBUG_OUT])),
        ]);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["messages-map", "Bar", "Ethereum"]);
        assert_eq!(args.skip, ["Bar", "Ethereum"]);
        assert_eq!(args.table_file, "messages_map.h");
        assert_eq!(args.limits_file, "messages_map_limits.h");
        assert_eq!(args.enum_name, "MessageType");
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_run_writes_both_headers() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_schema(dir.path());

        run(args_for(dir.path(), descriptor, &["Bar"])).unwrap();

        let table = std::fs::read_to_string(dir.path().join("messages_map.h")).unwrap();
        let limits = std::fs::read_to_string(dir.path().join("messages_map_limits.h")).unwrap();

        assert!(table.contains("(void (*)(const void *))fsm_msgInitialize"));
        assert!(table.contains("Features_fields"));
        assert!(table.contains("\t// Message FirmwareErase is used in bootloader mode only\n"));
        assert!(table.contains("#if DEBUG_LINK\n\t{ 'd', 'o', CommandFlags_Default, MessageType_MessageType_LoadDevice,"));
        assert!(!table.contains("BarBaz"));
        assert!(!limits.contains("BarBaz"));
        assert!(limits.contains("MSG_DEBUG_OUT_ENCODED_SIZE >= LoadDevice_size"));
    }

    #[test]
    fn test_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_schema(dir.path());
        let table_path = dir.path().join("messages_map.h");
        let limits_path = dir.path().join("messages_map_limits.h");

        run(args_for(dir.path(), descriptor.clone(), &[])).unwrap();
        let first = (std::fs::read(&table_path).unwrap(), std::fs::read(&limits_path).unwrap());
        run(args_for(dir.path(), descriptor, &[])).unwrap();
        let second = (std::fs::read(&table_path).unwrap(), std::fs::read(&limits_path).unwrap());

        assert_eq!(first, second);
    }

    #[test]
    fn test_run_missing_descriptor_set() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(args_for(dir.path(), dir.path().join("absent.pb"), &[])).unwrap_err();
        assert!(err.to_string().contains("reading descriptor set"));
    }

    #[test]
    fn test_run_missing_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = write_schema(dir.path());
        let missing = dir.path().join("nope");
        let err = run(args_for(&missing, descriptor, &[])).unwrap_err();
        assert!(err.to_string().contains("creating"));
    }
}
