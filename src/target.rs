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

//! The target-side debug engine.
//!
//! Owns the five debug pins for its lifetime and drives the SinoWealth
//! debug block through two proprietary channels: the ICP framed-byte serial
//! mode and a JTAG-like scan chain. Every output edge is timed; the mode
//! transitions have no acknowledgement beyond observable TDO bits, so the
//! calibration counts and delays below are part of the protocol contract
//! and must not be altered.

use num_enum::IntoPrimitive;

use crate::bitbang::{BitBangDebugIo, Console, PrimitiveDebugIo};
use crate::chip::ChipConfig;

/// Debug-channel state. The `Icp` and `Jtag` discriminants double as the
/// 8-bit magic codes the target expects on TDI during mode entry, sent
/// MSB-first by `start_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    Disconnected = 0x00,
    Ready = 0x01,
    Error = 0x02,
    Icp = 0x5A,
    Jtag = 0xA5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No debug session is attached; only `connect` can open one.
    NotConnected,
    /// The operation is not available on this channel.
    Unsupported,
    /// Chip parameters out of range for the chip type.
    InvalidConfig,
}

// ICP command bytes.
pub const ICP_SET_IB_OFFSET_L: u8 = 0x40;
pub const ICP_SET_IB_OFFSET_H: u8 = 0x41;
pub const ICP_SET_XPAGE: u8 = 0x43;
pub const ICP_GET_IB_OFFSET: u8 = 0x44;
pub const ICP_READ_FLASH: u8 = 0x45;
pub const ICP_READ_CUSTOM_BLOCK: u8 = 0x47;
pub const ICP_PING: u8 = 0x49;

/// Scan-chain instruction register width.
const IR_BITS: u8 = 4;

const IR_FLASH_READ: u8 = 0;
const IR_IDCODE: u8 = 1;
/// Parks the scan chain between operations.
const IR_PARK: u8 = 12;

/// The debug engine. One instance exclusively owns the debug pins; keep it
/// in a static and drive it from the main loop only, since the clock-phase
/// timing is the sole framing mechanism and tolerates no preemption.
pub struct Target<Io: BitBangDebugIo> {
    io: Io,
    mode: Mode,
    chip: ChipConfig,
}

impl<Io: BitBangDebugIo> Target<Io> {
    pub fn new(io: Io, chip: ChipConfig) -> Self {
        Self {
            io,
            mode: Mode::Disconnected,
            chip,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn chip(&self) -> &ChipConfig {
        &self.chip
    }

    /// Wake the target's debug block with the timed power-up handshake.
    ///
    /// Blocks until Vref reports target power; there is no reset pin, so the
    /// operator enables power manually. The toggle counts are calibration
    /// intervals of the debug block, reverse-engineered and exact.
    pub fn connect<C: Console>(&mut self, console: &mut C) -> bool {
        console.write_line("Waiting for Vref to get high - enable power to target manually:");
        while !self.io.get_vref_input() {
            self.io.delay_us(100);
        }
        console.write_line("Vref is now high - resuming");

        self.io.to_tdi_out(false);
        self.io.to_tms_out(false);
        self.io.to_tck_out(false);

        self.io.set_tck_output(true);
        self.io.set_tdi_output(true);
        self.io.set_tms_output(true);

        self.io.delay_us(500);

        self.io.set_tck_output(false);
        self.io.delay_us(1);
        self.io.set_tck_output(true);
        self.io.delay_us(50);

        for _ in 0..165 {
            self.io.set_tms_output(false);
            self.io.delay_us(2);
            self.io.set_tms_output(true);
            self.io.delay_us(2);
        }

        for _ in 0..105 {
            self.io.set_tdi_output(false);
            self.io.delay_us(2);
            self.io.set_tdi_output(true);
            self.io.delay_us(2);
        }

        for _ in 0..90 {
            self.io.set_tck_output(false);
            self.io.delay_us(2);
            self.io.set_tck_output(true);
            self.io.delay_us(2);
        }

        for _ in 0..25_600u16 {
            self.io.set_tms_output(false);
            self.io.delay_us(2);
            self.io.set_tms_output(true);
            self.io.delay_us(2);
        }

        self.io.delay_us(8);

        self.io.set_tms_output(false);

        self.mode = Mode::Icp;
        self.start_mode();

        for _ in 0..25_600u16 {
            self.io.set_tck_output(true);
            self.io.delay_us(2);
            self.io.set_tck_output(false);
            self.io.delay_us(2);
        }

        self.reset();

        true
    }

    /// Leave the session parked in ICP. TCK stays high there, so the attach
    /// survives a host reset or firmware upload.
    pub fn disconnect(&mut self) {
        if matches!(self.mode, Mode::Disconnected | Mode::Error) {
            return;
        }
        self.switch_mode(Mode::Icp);
    }

    /// Drop back from the active submode to `Ready`, leaving TCK parked
    /// high so the attach holds.
    pub fn reset(&mut self) {
        if matches!(self.mode, Mode::Disconnected | Mode::Error) {
            return;
        }

        if self.mode == Mode::Jtag {
            for _ in 0..35 {
                self.io.next_state(true);
            }

            self.io.set_tck_output(true);

            self.io.set_tms_output(false);
        } else {
            self.io.set_tck_output(true);

            self.io.set_tms_output(true);
            self.io.delay_us(2);
            self.io.set_tms_output(false);
            self.io.delay_us(2);
        }

        self.mode = Mode::Ready;
    }

    fn switch_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }

        if self.mode != Mode::Ready {
            self.reset();
        }

        self.mode = mode;
        self.start_mode();

        if self.mode == Mode::Icp {
            self.io.delay_us(800);

            self.ping_icp();
        } else if self.mode == Mode::Jtag {
            for _ in 0..8 {
                self.io.next_state(true);
            }

            self.send_instruction(IR_BITS, 2);
            self.send_data::<4>(4);

            self.send_instruction(IR_BITS, 3);
            self.send_data::<23>(0x403000);
            self.io.delay_us(50);
            self.send_data::<23>(0x402000);
            self.send_data::<23>(0x400000);

            // breakpoint registers, cleared on every entry; some chips work
            // without this
            for bp in [
                0x630000, 0x670000, 0x6B0000, 0x6F0000, 0x730000, 0x770000, 0x7B0000, 0x7F0000,
            ] {
                self.send_data::<23>(bp);
            }

            self.send_instruction(IR_BITS, 2);
            self.send_data::<4>(1);

            self.send_instruction(IR_BITS, IR_PARK);
        }
    }

    /// Clock out the current mode's magic byte, MSB first, with two idle
    /// clocks to finish.
    fn start_mode(&mut self) {
        self.io.set_tck_output(false);
        self.io.delay_us(2);

        let magic: u8 = self.mode.into();
        for i in (0..8).rev() {
            self.io.set_tdi_output(magic & (1 << i) != 0);

            self.io.set_tck_output(true);
            self.io.delay_us(2);
            self.io.set_tck_output(false);
            self.io.delay_us(2);
        }

        for _ in 0..2 {
            self.io.set_tck_output(true);
            self.io.delay_us(2);
            self.io.set_tck_output(false);
            self.io.delay_us(2);
        }
    }

    pub fn check_jtag(&mut self) -> Result<bool, Error> {
        let id = self.get_id()?;
        Ok(id != 0x0000 && id != 0xFFFF)
    }

    pub fn check_icp(&mut self) -> Result<bool, Error> {
        self.ensure_connected()?;
        self.switch_mode(Mode::Icp);

        self.io.send_icp_byte(ICP_SET_IB_OFFSET_L);
        self.io.send_icp_byte(0x69);
        self.io.send_icp_byte(ICP_SET_IB_OFFSET_H);
        self.io.send_icp_byte(0xFF);

        self.io.send_icp_byte(ICP_GET_IB_OFFSET);
        let b = self.io.receive_icp_byte();
        let _ = self.io.receive_icp_byte();

        Ok(b == 0x69)
    }

    pub fn ping_icp(&mut self) {
        if self.mode != Mode::Icp {
            return;
        }

        self.io.send_icp_byte(ICP_PING);
        self.io.send_icp_byte(0xFF);
    }

    pub fn get_id(&mut self) -> Result<u16, Error> {
        self.ensure_connected()?;
        self.switch_mode(Mode::Jtag);

        self.send_instruction(IR_BITS, IR_IDCODE);
        Ok(self.receive_data::<16>() as u16)
    }

    /// Read `buffer.len()` bytes starting at `address` over the ICP channel,
    /// from code flash or, with `custom_block`, the information block.
    pub fn read_flash_icp(
        &mut self,
        buffer: &mut [u8],
        address: u32,
        custom_block: bool,
    ) -> Result<(), Error> {
        self.ensure_connected()?;
        self.switch_mode(Mode::Icp);

        if self.chip.chip_type != 1 {
            self.io.send_icp_byte(0x46);
            self.io.send_icp_byte(0xFE);
            self.io.send_icp_byte(0xFF);
        }

        self.io.send_icp_byte(ICP_SET_IB_OFFSET_L);
        self.io.send_icp_byte(address as u8);
        self.io.send_icp_byte(ICP_SET_IB_OFFSET_H);
        self.io.send_icp_byte((address >> 8) as u8);
        if self.chip.uses_xpage() {
            self.io.send_icp_byte(ICP_SET_XPAGE);
            self.io.send_icp_byte((address >> 16) as u8);
        }

        self.io.send_icp_byte(if custom_block {
            ICP_READ_CUSTOM_BLOCK
        } else {
            ICP_READ_FLASH
        });

        for slot in buffer.iter_mut() {
            *slot = self.io.receive_icp_byte();
        }

        self.reset();

        Ok(())
    }

    /// Read `buffer.len()` bytes starting at `address` over the scan chain.
    /// The custom block is not reachable this way.
    ///
    /// The target pipelines the read: each shift returns the byte for the
    /// previously shifted address, so the loop runs one extra round and the
    /// first byte out is discarded.
    pub fn read_flash_jtag(
        &mut self,
        buffer: &mut [u8],
        address: u32,
        custom_block: bool,
    ) -> Result<(), Error> {
        self.ensure_connected()?;
        if custom_block {
            return Err(Error::Unsupported);
        }

        self.switch_mode(Mode::Jtag);

        let mut address = address;
        if self.chip.banked() {
            let bank = (address >> 15) as u8;
            if bank > 0 {
                // banks 1-N are mapped to the upper half of the address space
                address &= 0x7FFF;
                address |= 0x8000;
            }

            // MOV PBANKLO, #0x55 ; MOV PBANK, #bank ; NOP x4, injected into
            // the instruction stream. The shift register runs LSB-first, so
            // the 8051 opcodes go in bit-reversed.
            for op in [0x75, 0xB7, 0x55, 0x75, 0xB6, bank, 0x00, 0x00, 0x00, 0x00] {
                self.send_data::<8>(u32::from(op.reverse_bits()));
            }
        }

        self.send_instruction(IR_BITS, IR_FLASH_READ);

        for n in 0..=buffer.len() {
            self.io.next_state(true); // Select-DR
            self.io.next_state(false); // Capture-DR
            self.io.next_state(false); // Shift-DR

            let mut m = 0x8000u16;
            while m != 0 {
                self.io.next_state_out(false, address as u16 & m != 0);
                m >>= 1;
            }

            for bit in [false, false, false, true, false, false] {
                self.io.next_state_out(false, bit);
            }

            let mut data = 0u8;
            for _ in 0..7 {
                data |= u8::from(self.io.next_state_out(false, false));
                data <<= 1;
            }
            data |= u8::from(self.io.next_state(true));

            self.io.next_state(true); // Update-DR
            self.io.next_state(false); // Idle
            self.io.next_state(false); // Idle, the target needs the extra one

            if n > 0 {
                buffer[n - 1] = data;
            }

            address = address.wrapping_add(1);
        }

        self.send_instruction(IR_BITS, IR_PARK);

        Ok(())
    }

    fn send_instruction(&mut self, bits: u8, value: u8) {
        self.io.next_state(true); // Select-DR
        self.io.next_state(true); // Select-IR
        self.io.next_state(false); // Capture-IR
        self.io.next_state(false); // Shift-IR

        for i in 0..bits {
            let last = i == bits - 1;
            self.io.next_state_out(last, value & (1 << i) != 0);
        }

        self.io.next_state(true); // Update-IR
        self.io.next_state(false); // Idle
    }

    fn send_data<const W: usize>(&mut self, value: u32) {
        self.io.next_state(true); // Select-DR
        self.io.next_state(false); // Capture-DR
        self.io.next_state(false); // Shift-DR

        for i in 0..W {
            let last = i == W - 1;
            self.io.next_state_out(last, value & (1 << i) != 0);
        }

        self.io.next_state(true); // Update-DR
        self.io.next_state(false); // Idle
    }

    fn receive_data<const W: usize>(&mut self) -> u32 {
        self.io.next_state(true); // Select-DR
        self.io.next_state(false); // Capture-DR
        self.io.next_state(false); // Shift-DR

        let mut value = 0;
        for i in 0..W {
            let last = i == W - 1;
            if self.io.next_state(last) {
                value |= 1 << i;
            }
        }

        self.io.next_state(true); // Update-DR
        self.io.next_state(false); // Idle

        value
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if matches!(self.mode, Mode::Disconnected | Mode::Error) {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

#[cfg(test)]
impl<Io: BitBangDebugIo> Target<Io> {
    /// An engine that already went through the handshake.
    pub(crate) fn attached(io: Io, chip: ChipConfig) -> Self {
        Self {
            io,
            mode: Mode::Ready,
            chip,
        }
    }

    pub(crate) fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }
}
