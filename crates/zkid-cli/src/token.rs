//! # Token Subcommand
//!
//! Decodes an iden3comm envelope for inspection. Nothing is verified:
//! signatures and proofs are reported as present, not as valid.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;
use zkid_comm::{MediaType, PackageManager, Token};

/// Arguments for the `zkid token` subcommand.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Decode an envelope and print its header and payload as JSON.
    Inspect {
        /// File holding the envelope, or `-` for stdin.
        path: PathBuf,
    },
}

/// A decoded envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Value>,
    pub payload: Value,
    /// Signature or proof segment, undecoded for JWS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protection: Option<Value>,
}

pub fn run_token(args: &TokenArgs) -> Result<u8> {
    match &args.command {
        TokenCommand::Inspect { path } => {
            let envelope = read_input(path)?;
            let inspection = inspect(&envelope)?;
            println!("{}", serde_json::to_string_pretty(&inspection)?);
            Ok(0)
        }
    }
}

/// Decode `envelope` without verifying it.
pub fn inspect(envelope: &[u8]) -> Result<Inspection> {
    let media_type = PackageManager::media_type_of(envelope).context("unrecognised envelope")?;
    let text = std::str::from_utf8(envelope)?.trim();
    match media_type {
        MediaType::Plain => Ok(Inspection {
            media_type,
            header: None,
            payload: serde_json::from_str(text)?,
            protection: None,
        }),
        MediaType::Signed => {
            let segments: Vec<&str> = text.split('.').collect();
            if segments.len() != 3 {
                bail!("JWS must have 3 segments, found {}", segments.len());
            }
            Ok(Inspection {
                media_type,
                header: Some(decode_json(segments[0], "header")?),
                payload: decode_json(segments[1], "payload")?,
                protection: Some(Value::String(segments[2].to_string())),
            })
        }
        MediaType::Zkp => {
            let token = Token::parse(text)?;
            Ok(Inspection {
                media_type,
                header: Some(serde_json::to_value(token.header())?),
                payload: serde_json::from_slice(token.payload()).context("payload is not JSON")?,
                protection: token.zk_proof().map(serde_json::to_value).transpose()?,
            })
        }
    }
}

fn decode_json(segment: &str, what: &str) -> Result<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .with_context(|| format!("{what} is not base64url"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{what} is not JSON"))
}

fn read_input(path: &PathBuf) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}
