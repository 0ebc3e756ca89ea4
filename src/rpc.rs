// Copyright 2023 sinodump contributors
//
// SPDX-License-Identifier: Apache-2.0
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

//! Line-oriented RPC dispatcher over the debug engine.
//!
//! The transport (typically a UART at 115 200 8-N-1) lives in the embedding
//! firmware: it pushes every received byte through [`Rpc::feed`] and sends
//! the returned response line back, terminated however it likes. One command
//! per line, space-separated arguments, numbers in decimal or `0x` hex,
//! booleans as `0`/`1`. Responses are `OK`, `OK <value>` or `ERR <reason>`.
//!
//! Dump traffic goes through the 256-byte read buffer: `read16ICP`/
//! `read16JTAG` fill it from the target and `getBufferByte` pages it out,
//! so a host can re-read bytes without touching the target again.

use core::fmt::Write as _;

use crate::bitbang::{BitBangDebugIo, Console};
use crate::cursor::BufferCursor;
use crate::target::{Error, Target};

/// Size of the dump read buffer.
pub const BUFFER_SIZE: usize = 256;

const LINE_MAX: usize = 64;

enum RpcError {
    UnknownCommand,
    MissingArgument,
    BadArgument,
    LineTooLong,
    Malformed,
    ResponseOverflow,
    Engine(Error),
}

impl RpcError {
    fn reason(&self) -> &'static str {
        match self {
            RpcError::UnknownCommand => "unknown command",
            RpcError::MissingArgument => "missing argument",
            RpcError::BadArgument => "bad argument",
            RpcError::LineTooLong => "line too long",
            RpcError::Malformed => "malformed line",
            RpcError::ResponseOverflow => "response overflow",
            RpcError::Engine(Error::NotConnected) => "not connected",
            RpcError::Engine(Error::Unsupported) => "unsupported",
            RpcError::Engine(Error::InvalidConfig) => "invalid config",
        }
    }
}

impl From<Error> for RpcError {
    fn from(e: Error) -> Self {
        RpcError::Engine(e)
    }
}

type Out<'a> = BufferCursor<&'a mut [u8]>;

pub struct Rpc<Io: BitBangDebugIo, C: Console> {
    target: Target<Io>,
    console: C,
    buffer: [u8; BUFFER_SIZE],
    line: heapless::Vec<u8, LINE_MAX>,
    line_overflow: bool,
}

impl<Io: BitBangDebugIo, C: Console> Rpc<Io, C> {
    pub fn new(target: Target<Io>, console: C) -> Self {
        Self {
            target,
            console,
            buffer: [0; BUFFER_SIZE],
            line: heapless::Vec::new(),
            line_overflow: false,
        }
    }

    pub fn target(&self) -> &Target<Io> {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut Target<Io> {
        &mut self.target
    }

    /// Feed one received byte. Completing a line dispatches it and writes
    /// the response into `response`, returning its length; blank lines
    /// produce no response.
    pub fn feed(&mut self, byte: u8, response: &mut [u8]) -> Option<usize> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let overflow = self.line_overflow;
                self.line_overflow = false;
                let line = core::mem::take(&mut self.line);

                if overflow {
                    return Some(error_response(RpcError::LineTooLong, response));
                }
                if line.is_empty() {
                    return None;
                }
                match core::str::from_utf8(&line) {
                    Ok(line) => Some(self.dispatch(line, response)),
                    Err(_) => Some(error_response(RpcError::Malformed, response)),
                }
            }
            _ => {
                if self.line.push(byte).is_err() {
                    self.line_overflow = true;
                }
                None
            }
        }
    }

    /// Dispatch one command line, writing the response into `response` and
    /// returning its length.
    pub fn dispatch(&mut self, line: &str, response: &mut [u8]) -> usize {
        let mut out = BufferCursor::new(response);
        if let Err(e) = self.dispatch_inner(line, &mut out) {
            out.reset();
            let _ = write!(out, "ERR {}", e.reason());
        }
        out.position()
    }

    fn dispatch_inner(&mut self, line: &str, out: &mut Out) -> Result<(), RpcError> {
        let mut args = line.split_ascii_whitespace();
        let command = match args.next() {
            Some(c) => c,
            None => return Ok(()),
        };

        match command {
            "connect" => {
                self.target.connect(&mut self.console);
                respond_bool(out, true)
            }
            "disconnect" => {
                self.target.disconnect();
                respond_ok(out)
            }
            "checkICP" => {
                let alive = self.target.check_icp()?;
                respond_bool(out, alive)
            }
            "checkJTAG" => {
                let alive = self.target.check_jtag()?;
                respond_bool(out, alive)
            }
            "getID" => {
                let id = self.target.get_id()?;
                write!(out, "OK 0x{:04X}", id).map_err(|_| RpcError::ResponseOverflow)
            }
            "pingICP" => {
                self.target.ping_icp();
                respond_ok(out)
            }
            "readByteICP" | "readByteJTAG" => {
                let address = parse_u32(args.next().ok_or(RpcError::MissingArgument)?)?;
                let custom_block = parse_bool(args.next().ok_or(RpcError::MissingArgument)?)?;

                let mut byte = [0xFF];
                let result = if command == "readByteICP" {
                    self.target.read_flash_icp(&mut byte, address, custom_block)
                } else {
                    self.target.read_flash_jtag(&mut byte, address, custom_block)
                };
                if result.is_err() {
                    byte[0] = 0xFF;
                }
                respond_byte(out, byte[0])
            }
            "read16ICP" | "read16JTAG" => {
                let address = parse_u32(args.next().ok_or(RpcError::MissingArgument)?)?;
                let custom_block = parse_bool(args.next().ok_or(RpcError::MissingArgument)?)?;

                if command == "read16ICP" {
                    self.target
                        .read_flash_icp(&mut self.buffer[..16], address, custom_block)?;
                } else {
                    self.target
                        .read_flash_jtag(&mut self.buffer[..16], address, custom_block)?;
                }
                respond_ok(out)
            }
            "getBufferByte" => {
                let index = parse_u32(args.next().ok_or(RpcError::MissingArgument)?)? as usize;
                let byte = self.buffer.get(index).copied().unwrap_or(0xFF);
                respond_byte(out, byte)
            }
            "detectReadMethod" => {
                let method = self.detect_read_method();
                respond_uint(out, u32::from(method))
            }
            "getProductBlockAddress" => {
                respond_address(out, u32::from(self.target.chip().product_block_address()))
            }
            "getCodeOptionsAddress" => respond_address(out, self.target.chip().code_options_address()),
            "getCodeOptionsSize" => respond_uint(out, u32::from(self.target.chip().code_options_size())),
            "getCodeOptionsInFlash" => respond_bool(out, self.target.chip().code_options_in_flash()),
            "getChipType" => respond_uint(out, u32::from(self.target.chip().chip_type)),
            "getFlashSize" => respond_uint(out, self.target.chip().flash_size),
            "getProductBlock" => respond_uint(out, u32::from(self.target.chip().product_block)),
            "getCustomBlock" => respond_uint(out, u32::from(self.target.chip().custom_block)),
            _ => Err(RpcError::UnknownCommand),
        }
    }

    /// Probe which read path works: 1 for ICP, 2 for JTAG, 0 for neither.
    /// A path counts as working when the first word of flash reads nonzero.
    fn detect_read_method(&mut self) -> u8 {
        if self
            .target
            .read_flash_icp(&mut self.buffer[..4], 0, false)
            .is_ok()
            && self.buffer[..4].iter().any(|&b| b != 0)
        {
            return 1;
        }

        if self
            .target
            .read_flash_jtag(&mut self.buffer[..4], 0, false)
            .is_ok()
            && self.buffer[..4].iter().any(|&b| b != 0)
        {
            return 2;
        }

        0
    }
}

fn error_response(error: RpcError, response: &mut [u8]) -> usize {
    let mut out = BufferCursor::new(response);
    let _ = write!(out, "ERR {}", error.reason());
    out.position()
}

fn respond_ok(out: &mut Out) -> Result<(), RpcError> {
    out.write(b"OK").map_err(|_| RpcError::ResponseOverflow)
}

fn respond_bool(out: &mut Out, value: bool) -> Result<(), RpcError> {
    write!(out, "OK {}", u8::from(value)).map_err(|_| RpcError::ResponseOverflow)
}

fn respond_byte(out: &mut Out, value: u8) -> Result<(), RpcError> {
    write!(out, "OK 0x{:02X}", value).map_err(|_| RpcError::ResponseOverflow)
}

fn respond_address(out: &mut Out, value: u32) -> Result<(), RpcError> {
    write!(out, "OK 0x{:04X}", value).map_err(|_| RpcError::ResponseOverflow)
}

fn respond_uint(out: &mut Out, value: u32) -> Result<(), RpcError> {
    write!(out, "OK {}", value).map_err(|_| RpcError::ResponseOverflow)
}

fn parse_u32(token: &str) -> Result<u32, RpcError> {
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        token.parse()
    };
    parsed.map_err(|_| RpcError::BadArgument)
}

fn parse_bool(token: &str) -> Result<bool, RpcError> {
    match token {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(RpcError::BadArgument),
    }
}
