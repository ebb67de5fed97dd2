//! cgate-enarmor
//!
//! Reads bytes from stdin and writes them as an ASCII armored block.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::{anyhow, Context, Result};
use cgate_logging::init_console_logging;
use cgate_pgp::armor::{enarmor, MESSAGE_MARKER};
use clap::Parser;
use std::io::{Read, Write};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "cgate-enarmor", version, about = "Wrap binary data in ASCII armor")]
struct Args {
    /// Treat stdin as hex text (as the gateway sends ciphertext)
    #[arg(long)]
    hex: bool,

    /// Label used in the BEGIN/END lines
    #[arg(long, default_value = MESSAGE_MARKER)]
    marker: String,

    /// Armor header, repeatable
    #[arg(long = "header", value_name = "KEY=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("header key must not be empty".to_string());
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn main() -> Result<()> {
    init_console_logging("cgate-enarmor", "warn");
    let args = Args::parse();

    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("failed to read stdin")?;

    let data = if args.hex {
        let text = String::from_utf8(input).map_err(|_| anyhow!("hex input is not UTF-8"))?;
        hex::decode(text.trim()).context("invalid hex input")?
    } else {
        input
    };

    debug!(bytes = data.len(), marker = %args.marker, "Armoring input");

    let headers: Vec<(&str, &str)> = args
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let armored = enarmor(&data, &args.marker, &headers);

    std::io::stdout()
        .write_all(armored.as_bytes())
        .context("failed to write armored output")?;
    Ok(())
}
