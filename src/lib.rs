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

//! Flash dumper engine for SinoWealth 8051-based microcontrollers.
//!
//! The engine bit-bangs the target's four-wire debug interface (TDO, TMS,
//! TDI, TCK plus a Vref sense line), wakes the target into its debug block
//! with a timed power-up handshake, and reads code flash or the custom
//! information block through either the ICP framed-byte channel or the
//! JTAG-like scan chain.
//!
//! The crate is `no_std`; the embedding firmware supplies the pins (any
//! `embedded-hal` HAL), a microsecond delay and a console line sink, and
//! pumps received serial bytes through [`Rpc::feed`].

#![cfg_attr(not(test), no_std)]

mod bitbang;
mod chip;
mod cursor;
mod rpc;
mod target;

#[cfg(test)]
mod sim;

pub use crate::bitbang::{BitBangDebugIo, Console, DebugIoSet, DelayFunc, PrimitiveDebugIo};
pub use crate::chip::ChipConfig;
pub use crate::cursor::{BufferCursor, CursorError};
pub use crate::rpc::{Rpc, BUFFER_SIZE};
pub use crate::target::{Error, Mode, Target};
