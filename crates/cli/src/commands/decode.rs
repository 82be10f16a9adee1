//! Header decoding.
//!
//! Turns canonical header bytes back into a readable header and reports the
//! hash the next header must link to.

use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::utils::{decode_hex, format_vc_header, CliResult, OutputFormat};
use vigil_types::{ChainHeader, HeaderCodec, TxBlockHeader, VcBlockHeader};

/// Which encoding the input bytes use
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum HeaderEncoding {
    /// Bare view-change header
    #[default]
    ViewChange,
    /// Bare primary block header
    Tx,
    /// Kind-tagged envelope of either header
    Tagged,
}

/// Arguments for the decode command
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Header bytes as hex, with or without 0x
    pub hex: String,

    /// Encoding of the input
    #[arg(long, value_enum, default_value = "view-change")]
    pub kind: HeaderEncoding,
}

/// JSON view of a decoded header.
#[derive(Debug, Serialize)]
struct DecodedHeader<'a> {
    hash: String,
    header: &'a ChainHeader,
}

/// Decode bytes into a header of the requested encoding.
pub fn decode_header(bytes: &[u8], kind: HeaderEncoding) -> CliResult<ChainHeader> {
    let header = match kind {
        HeaderEncoding::ViewChange => ChainHeader::ViewChange(VcBlockHeader::deserialize(bytes, 0)?),
        HeaderEncoding::Tx => ChainHeader::Tx(TxBlockHeader::deserialize(bytes, 0)?),
        HeaderEncoding::Tagged => ChainHeader::deserialize(bytes, 0)?,
    };
    Ok(header)
}

/// Execute the decode command
pub fn execute(args: DecodeArgs, output_format: OutputFormat) -> CliResult<()> {
    let bytes = decode_hex(&args.hex)?;
    let header = decode_header(&bytes, args.kind)?;
    tracing::debug!(kind = ?header.kind(), len = bytes.len(), "decoded header");

    match output_format {
        OutputFormat::Json => {
            let out = DecodedHeader {
                hash: header.hash().to_string(),
                header: &header,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => match &header {
            ChainHeader::ViewChange(vc) => {
                if vc.is_placeholder() {
                    println!("View-change header (placeholder)");
                } else {
                    println!("View-change header");
                }
                println!("{}", format_vc_header(vc));
            }
            ChainHeader::Tx(tx) => {
                println!("Primary block header");
                println!("  Hash:            {}", tx.compute_hash());
                println!("  DS epoch:        {}", tx.ds_epoch_number());
                println!("  Epoch:           {}", tx.epoch_number());
                println!("  Timestamp:       {}", tx.timestamp());
                println!("  Proposer:        {}", tx.proposer_key().short_hex());
                println!("  State root:      {}", tx.state_root());
                println!("  Committee hash:  {}", tx.committee_hash());
                println!("  Prev hash:       {}", tx.prev_hash());
            }
        },
    }

    Ok(())
}
