//! `envguard decode` — Decode a dump of raw event records.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use envguard_ebpf::codec;

use crate::output;

/// Arguments for the `decode` command.
#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding back-to-back event records.
    pub file: PathBuf,
}

/// Executes the `decode` command.
///
/// Prints each decoded record as a JSON line on stdout. Malformed frames
/// are reported on stderr and skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn execute(args: &DecodeArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    let mut malformed = 0_usize;
    for (index, frame) in codec::decode_stream(&bytes).enumerate() {
        match frame {
            Ok(event) => println!("{}", output::json_line(&event)?),
            Err(e) => {
                malformed += 1;
                eprintln!("record {index}: {e}");
            }
        }
    }

    tracing::debug!(path = %args.file.display(), malformed, "dump decoded");
    Ok(())
}
