//! Symi Mesh Gateway Protocol
//!
//! This crate provides types and utilities for talking to a Symi Bluetooth
//! mesh gateway over its serial/TCP link. Every frame starts with `0x53` and
//! ends with an XOR checksum.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → gateway): `[0x53][opcode][len][payload][chk]`
//! - **Responses** (gateway → host): `[0x53][opcode|0x80][status][len][payload][chk]`
//! - **Events** (gateway → host): response-shaped frames whose status marks
//!   them as unsolicited (scan discovery, pairing, node status)
//!
//! # Example
//!
//! ```rust
//! use symi_protocol::{Command, FrameReassembler, Message};
//!
//! let bytes = Command::ReadDeviceList.encode().unwrap();
//! assert_eq!(bytes, [0x53, 0x12, 0x00, 0x41]);
//!
//! let mut reassembler = FrameReassembler::new();
//! let reply = [0x53, 0x92, 0x00, 0x00, 0xC1];
//! let frames = reassembler.feed(&reply);
//! assert_eq!(Message::decode(&frames[0]).unwrap(), Message::DeviceList(vec![]));
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod messages;
mod reassembler;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use messages::*;
pub use reassembler::*;
pub use types::*;
