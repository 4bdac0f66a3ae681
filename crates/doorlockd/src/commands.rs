//! Line commands accepted on stdin

use anyhow::{anyhow, bail, Context};
use doorlock::{BdAddr, ConnHandle, IoCapability, Passkey};
use std::str::FromStr;

/// HCI reason "remote user terminated connection"
const DEFAULT_DISCONNECT_REASON: u8 = 0x13;

pub const HELP: &str = "\
commands:
  keys <chars>                             press keypad keys, e.g. keys 123456#
  connect <handle> <addr>                  a peer connects
  pair <handle> <addr> <io-cap> [passkey]  the peer starts passkey-entry pairing
  cancel <handle> <addr>                   the peer aborts pairing
  disconnect <handle> [reason]             the link goes down
  bond <addr>                              store a bond directly
  wipe                                     delete every bond
  state                                    show lock and advertiser state
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Keys(String),
    Connect {
        conn: ConnHandle,
        peer: BdAddr,
    },
    Pair {
        conn: ConnHandle,
        peer: BdAddr,
        io_capability: IoCapability,
        /// What the peer displays; `None` accepts any entry
        passkey: Option<Passkey>,
    },
    Cancel {
        conn: ConnHandle,
        peer: BdAddr,
    },
    Disconnect {
        conn: ConnHandle,
        reason: u8,
    },
    Bond(BdAddr),
    Wipe,
    State,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            bail!("empty command");
        };
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("keys", [keys]) => Command::Keys(keys.to_string()),
            ("connect", [conn, peer]) => Command::Connect {
                conn: parse_handle(conn)?,
                peer: parse_addr(peer)?,
            },
            ("pair", [conn, peer, io, rest @ ..]) if rest.len() <= 1 => Command::Pair {
                conn: parse_handle(conn)?,
                peer: parse_addr(peer)?,
                io_capability: io.parse().map_err(|e: String| anyhow!(e))?,
                passkey: rest.first().map(|p| parse_passkey(p)).transpose()?,
            },
            ("cancel", [conn, peer]) => Command::Cancel {
                conn: parse_handle(conn)?,
                peer: parse_addr(peer)?,
            },
            ("disconnect", [conn]) => Command::Disconnect {
                conn: parse_handle(conn)?,
                reason: DEFAULT_DISCONNECT_REASON,
            },
            ("disconnect", [conn, reason]) => Command::Disconnect {
                conn: parse_handle(conn)?,
                reason: parse_number(reason)
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| anyhow!("invalid reason code: {}", reason))?,
            },
            ("bond", [peer]) => Command::Bond(parse_addr(peer)?),
            ("wipe", []) => Command::Wipe,
            ("state", []) => Command::State,
            ("help", []) => Command::Help,
            ("quit" | "exit", []) => Command::Quit,
            _ => bail!("cannot parse '{}', try 'help'", line.trim()),
        };
        Ok(command)
    }
}

/// Decimal or `0x`-prefixed hex
fn parse_number(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn parse_handle(text: &str) -> anyhow::Result<ConnHandle> {
    parse_number(text)
        .and_then(|v| u16::try_from(v).ok())
        .map(ConnHandle)
        .ok_or_else(|| anyhow!("invalid connection handle: {}", text))
}

fn parse_addr(text: &str) -> anyhow::Result<BdAddr> {
    text.parse()
        .with_context(|| format!("invalid address: {}", text))
}

fn parse_passkey(text: &str) -> anyhow::Result<Passkey> {
    text.parse::<u32>()
        .ok()
        .and_then(Passkey::new)
        .ok_or_else(|| anyhow!("passkey must be 0..=999999: {}", text))
}
