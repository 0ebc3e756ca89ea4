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

use embedded_hal::digital::v2::{InputPin, IoPin, OutputPin, PinState};

/// Busy-wait delay provider. The protocol timing assumes each pin operation
/// completes well under a microsecond, so implementations must not yield.
pub trait DelayFunc {
    fn delay_us(&self, us: u32);
}

/// Line sink for the operator prompt printed while waiting for target power.
pub trait Console {
    fn write_line(&mut self, line: &str);
}

/// Raw pin operations on the five debug lines.
///
/// TMS, TDI and TCK switch between high-Z input (the idle, unpowered-target
/// safe state) and push-pull output. TDO and Vref are inputs only.
pub trait BitBangDebugIo {
    // TMS
    fn to_tms_in(&mut self);
    fn to_tms_out(&mut self, output: bool);
    fn set_tms_output(&mut self, output: bool);
    // TDI
    fn to_tdi_in(&mut self);
    fn to_tdi_out(&mut self, output: bool);
    fn set_tdi_output(&mut self, output: bool);
    // TCK
    fn to_tck_in(&mut self);
    fn to_tck_out(&mut self, output: bool);
    fn set_tck_output(&mut self, output: bool);
    // TDO
    fn get_tdo_input(&mut self) -> bool;
    // Vref
    fn get_vref_input(&mut self) -> bool;
    // delay
    fn delay_us(&self, us: u32);
}

fn turn_to_in<I: InputPin + IoPin<I, O>, O: OutputPin + IoPin<I, O>>(
    pin_in: &mut Option<I>,
    pin_out: &mut Option<O>,
) {
    if let Some(pin) = pin_out.take() {
        match pin.into_input_pin() {
            Ok(pin) => *pin_in = Some(pin),
            Err(_) => panic!("pin direction change to input failed"),
        }
    }
}

fn turn_to_out<I: InputPin + IoPin<I, O>, O: OutputPin + IoPin<I, O>>(
    pin_in: &mut Option<I>,
    pin_out: &mut Option<O>,
    output: bool,
) {
    let state = if output { PinState::High } else { PinState::Low };
    if let Some(pin) = pin_in.take() {
        match pin.into_output_pin(state) {
            Ok(pin) => *pin_out = Some(pin),
            Err(_) => panic!("pin direction change to output failed"),
        }
    }
}

fn set_output<I: InputPin + IoPin<I, O>, O: OutputPin + IoPin<I, O>>(
    pin_out: &mut Option<O>,
    output: bool,
) {
    if let Some(p) = pin_out.as_mut() {
        let _ = if output { p.set_high() } else { p.set_low() };
    }
}

/// The five debug pins plus the delay provider, generic over any
/// `embedded-hal` pin types whose direction can be changed at runtime.
///
/// All pins start as inputs so an unpowered target is not back-powered
/// through the probe's I/O leakage.
pub struct DebugIoSet<TmsIn, TmsOut, TdiIn, TdiOut, TckIn, TckOut, Tdo, Vref, DelayFn>
where
    TmsIn: InputPin + IoPin<TmsIn, TmsOut>,
    TmsOut: OutputPin + IoPin<TmsIn, TmsOut>,
    TdiIn: InputPin + IoPin<TdiIn, TdiOut>,
    TdiOut: OutputPin + IoPin<TdiIn, TdiOut>,
    TckIn: InputPin + IoPin<TckIn, TckOut>,
    TckOut: OutputPin + IoPin<TckIn, TckOut>,
    Tdo: InputPin,
    Vref: InputPin,
    DelayFn: DelayFunc,
{
    tms_in: Option<TmsIn>,
    tms_out: Option<TmsOut>,
    tdi_in: Option<TdiIn>,
    tdi_out: Option<TdiOut>,
    tck_in: Option<TckIn>,
    tck_out: Option<TckOut>,
    tdo: Tdo,
    vref: Vref,
    cycle_delay: DelayFn,
}

impl<TmsIn, TmsOut, TdiIn, TdiOut, TckIn, TckOut, Tdo, Vref, DelayFn>
    DebugIoSet<TmsIn, TmsOut, TdiIn, TdiOut, TckIn, TckOut, Tdo, Vref, DelayFn>
where
    TmsIn: InputPin + IoPin<TmsIn, TmsOut>,
    TmsOut: OutputPin + IoPin<TmsIn, TmsOut>,
    TdiIn: InputPin + IoPin<TdiIn, TdiOut>,
    TdiOut: OutputPin + IoPin<TdiIn, TdiOut>,
    TckIn: InputPin + IoPin<TckIn, TckOut>,
    TckOut: OutputPin + IoPin<TckIn, TckOut>,
    Tdo: InputPin,
    Vref: InputPin,
    DelayFn: DelayFunc,
{
    pub fn new(tms: TmsIn, tdi: TdiIn, tck: TckIn, tdo: Tdo, vref: Vref, cycle_delay: DelayFn) -> Self {
        Self {
            tms_in: Some(tms),
            tms_out: None,
            tdi_in: Some(tdi),
            tdi_out: None,
            tck_in: Some(tck),
            tck_out: None,
            tdo,
            vref,
            cycle_delay,
        }
    }
}

impl<TmsIn, TmsOut, TdiIn, TdiOut, TckIn, TckOut, Tdo, Vref, DelayFn> BitBangDebugIo
    for DebugIoSet<TmsIn, TmsOut, TdiIn, TdiOut, TckIn, TckOut, Tdo, Vref, DelayFn>
where
    TmsIn: InputPin + IoPin<TmsIn, TmsOut>,
    TmsOut: OutputPin + IoPin<TmsIn, TmsOut>,
    TdiIn: InputPin + IoPin<TdiIn, TdiOut>,
    TdiOut: OutputPin + IoPin<TdiIn, TdiOut>,
    TckIn: InputPin + IoPin<TckIn, TckOut>,
    TckOut: OutputPin + IoPin<TckIn, TckOut>,
    Tdo: InputPin,
    Vref: InputPin,
    DelayFn: DelayFunc,
{
    // TMS
    fn to_tms_in(&mut self) {
        turn_to_in(&mut self.tms_in, &mut self.tms_out);
    }
    fn to_tms_out(&mut self, output: bool) {
        turn_to_out(&mut self.tms_in, &mut self.tms_out, output);
    }
    fn set_tms_output(&mut self, output: bool) {
        set_output(&mut self.tms_out, output);
    }
    // TDI
    fn to_tdi_in(&mut self) {
        turn_to_in(&mut self.tdi_in, &mut self.tdi_out);
    }
    fn to_tdi_out(&mut self, output: bool) {
        turn_to_out(&mut self.tdi_in, &mut self.tdi_out, output);
    }
    fn set_tdi_output(&mut self, output: bool) {
        set_output(&mut self.tdi_out, output);
    }
    // TCK
    fn to_tck_in(&mut self) {
        turn_to_in(&mut self.tck_in, &mut self.tck_out);
    }
    fn to_tck_out(&mut self, output: bool) {
        turn_to_out(&mut self.tck_in, &mut self.tck_out, output);
    }
    fn set_tck_output(&mut self, output: bool) {
        set_output(&mut self.tck_out, output);
    }
    // TDO
    fn get_tdo_input(&mut self) -> bool {
        self.tdo.is_high().unwrap_or(false)
    }
    // Vref
    fn get_vref_input(&mut self) -> bool {
        self.vref.is_high().unwrap_or(false)
    }
    // delay
    fn delay_us(&self, us: u32) {
        self.cycle_delay.delay_us(us);
    }
}

/// Clocking and framing primitives derived from the raw pin operations.
///
/// ICP frames a byte as 8 data bits MSB-first plus one filler clock; the
/// target relies on the filler pulse as the inter-byte gap. JTAG state
/// stepping samples TDO while TCK is high, with 2 µs clock phases.
pub trait PrimitiveDebugIo {
    /// One ICP clock: 1 µs low, rise, 1 µs high, fall.
    fn pulse_clock(&mut self);
    /// Step the TAP controller once and return the TDO sample.
    fn next_state(&mut self, tms: bool) -> bool;
    /// Step the TAP controller, driving TDI before the rising edge.
    fn next_state_out(&mut self, tms: bool, tdi: bool) -> bool;
    fn send_icp_byte(&mut self, value: u8);
    fn receive_icp_byte(&mut self) -> u8;
}

impl<Io: BitBangDebugIo> PrimitiveDebugIo for Io {
    fn pulse_clock(&mut self) {
        self.delay_us(1);
        self.set_tck_output(true);
        self.delay_us(1);
        self.set_tck_output(false);
    }

    fn next_state(&mut self, tms: bool) -> bool {
        self.set_tms_output(tms);

        self.set_tck_output(true);
        self.delay_us(2);

        let tdo = self.get_tdo_input();

        self.set_tck_output(false);
        self.delay_us(2);

        tdo
    }

    fn next_state_out(&mut self, tms: bool, tdi: bool) -> bool {
        self.set_tdi_output(tdi);
        self.next_state(tms)
    }

    fn send_icp_byte(&mut self, value: u8) {
        for i in (0..8).rev() {
            self.set_tdi_output(value & (1 << i) != 0);
            self.pulse_clock();
        }

        self.pulse_clock();

        self.set_tdi_output(false);
    }

    fn receive_icp_byte(&mut self) -> u8 {
        let mut value = 0;
        for i in 0..8 {
            self.pulse_clock();

            if self.get_tdo_input() {
                value |= 1 << i;
            }
        }

        self.pulse_clock();

        value
    }
}
