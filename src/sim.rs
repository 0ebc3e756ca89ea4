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

//! Scripted pin harness for the engine tests.
//!
//! Records every output transition with a microsecond timestamp, captures
//! the (TMS, TDI) levels at each TCK rising edge, and plays a scripted bit
//! queue back on TDO (one bit consumed per rising edge, low once the script
//! runs out).

use std::cell::Cell;
use std::collections::VecDeque;

use crate::bitbang::{BitBangDebugIo, Console};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pin {
    Tms,
    Tdi,
    Tck,
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub pin: Pin,
    pub level: bool,
    pub t: u64,
}

/// Levels latched by the target at one TCK rising edge.
#[derive(Debug, Clone, Copy)]
pub struct Cycle {
    pub tms: bool,
    pub tdi: bool,
}

pub struct SimIo {
    time: Cell<u64>,
    tms: bool,
    tdi: bool,
    tck: bool,
    vref_low_polls: usize,
    tdo_script: VecDeque<bool>,
    tdo_level: bool,
    pub trace: Vec<Event>,
    pub cycles: Vec<Cycle>,
}

impl SimIo {
    pub fn new() -> Self {
        Self {
            time: Cell::new(0),
            tms: false,
            tdi: false,
            tck: false,
            vref_low_polls: 0,
            tdo_script: VecDeque::new(),
            tdo_level: false,
            trace: Vec::new(),
            cycles: Vec::new(),
        }
    }

    /// Make the next `polls` Vref reads report an unpowered target.
    pub fn vref_low_for(&mut self, polls: usize) {
        self.vref_low_polls = polls;
    }

    pub fn script_tdo<I: IntoIterator<Item = bool>>(&mut self, bits: I) {
        self.tdo_script.extend(bits);
    }

    /// Pad the TDO script with `edges` low bits.
    pub fn script_silence(&mut self, edges: usize) {
        self.script_tdo(std::iter::repeat(false).take(edges));
    }

    /// Queue one ICP response frame: 8 data bits LSB-first plus the filler.
    pub fn script_tdo_icp_byte(&mut self, value: u8) {
        self.script_tdo((0..8).map(|i| value & (1 << i) != 0));
        self.script_tdo([false]);
    }

    pub fn now(&self) -> u64 {
        self.time.get()
    }

    pub fn level(&self, pin: Pin) -> bool {
        match pin {
            Pin::Tms => self.tms,
            Pin::Tdi => self.tdi,
            Pin::Tck => self.tck,
        }
    }

    /// Total TCK rising edges seen so far.
    pub fn tck_pulses(&self) -> usize {
        self.cycles.len()
    }

    /// Rising transitions recorded on `pin`.
    pub fn rising_count(&self, pin: Pin) -> usize {
        let mut level = false;
        let mut count = 0;
        for e in self.trace.iter().filter(|e| e.pin == pin) {
            if e.level && !level {
                count += 1;
            }
            level = e.level;
        }
        count
    }

    /// Decode ICP frames (9 edges each) from the captured cycles, starting
    /// at rising edge `skip`. Incomplete trailing frames are dropped.
    pub fn decode_icp_frames(&self, skip: usize) -> Vec<u8> {
        self.cycles[skip..]
            .chunks_exact(9)
            .map(|frame| {
                frame[..8]
                    .iter()
                    .fold(0u8, |byte, c| (byte << 1) | u8::from(c.tdi))
            })
            .collect()
    }

    /// TDI levels latched during rising edges `start..start + len`.
    pub fn tdi_bits(&self, start: usize, len: usize) -> Vec<bool> {
        self.cycles[start..start + len].iter().map(|c| c.tdi).collect()
    }

    fn set(&mut self, pin: Pin, level: bool) {
        match pin {
            Pin::Tms => self.tms = level,
            Pin::Tdi => self.tdi = level,
            Pin::Tck => {
                if level && !self.tck {
                    self.cycles.push(Cycle {
                        tms: self.tms,
                        tdi: self.tdi,
                    });
                    self.tdo_level = self.tdo_script.pop_front().unwrap_or(false);
                }
                self.tck = level;
            }
        }
        self.trace.push(Event {
            pin,
            level,
            t: self.time.get(),
        });
    }
}

impl BitBangDebugIo for SimIo {
    fn to_tms_in(&mut self) {}
    fn to_tms_out(&mut self, output: bool) {
        self.set(Pin::Tms, output);
    }
    fn set_tms_output(&mut self, output: bool) {
        self.set(Pin::Tms, output);
    }

    fn to_tdi_in(&mut self) {}
    fn to_tdi_out(&mut self, output: bool) {
        self.set(Pin::Tdi, output);
    }
    fn set_tdi_output(&mut self, output: bool) {
        self.set(Pin::Tdi, output);
    }

    fn to_tck_in(&mut self) {}
    fn to_tck_out(&mut self, output: bool) {
        self.set(Pin::Tck, output);
    }
    fn set_tck_output(&mut self, output: bool) {
        self.set(Pin::Tck, output);
    }

    fn get_tdo_input(&mut self) -> bool {
        self.tdo_level
    }

    fn get_vref_input(&mut self) -> bool {
        if self.vref_low_polls > 0 {
            self.vref_low_polls -= 1;
            false
        } else {
            true
        }
    }

    fn delay_us(&self, us: u32) {
        self.time.set(self.time.get() + u64::from(us));
    }
}

/// Console fake collecting the prompt lines.
pub struct TestConsole {
    pub lines: Vec<String>,
}

impl TestConsole {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }
}

impl Console for TestConsole {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
