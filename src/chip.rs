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

use crate::target::Error;

/// Target chip parameters, as found in the Keil C51 chip definition files
/// (`*.opt`, `*.gpt`).
///
/// `chip_type` selects the address-width behavior: types 4 and 7 carry a
/// 24-bit flash pointer (extra XPAGE frame in ICP reads), while the JTAG
/// read path bank-switches purely on flash size. The two conditions are not
/// equivalent: type 7 parts may stay at or below 64 KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipConfig {
    pub chip_type: u8,
    pub flash_size: u32,
    pub product_block: u8,
    pub custom_block: u8,
}

impl ChipConfig {
    /// Largest valid flash size for a chip type.
    pub const fn max_flash_size(chip_type: u8) -> u32 {
        match chip_type {
            4 => 1_048_576,
            7 => 131_072,
            _ => 65_536,
        }
    }

    pub fn new(chip_type: u8, flash_size: u32, product_block: u8, custom_block: u8) -> Result<Self, Error> {
        if flash_size > Self::max_flash_size(chip_type) {
            return Err(Error::InvalidConfig);
        }
        Ok(Self {
            chip_type,
            flash_size,
            product_block,
            custom_block,
        })
    }

    /// Whether the flash read pointer extends past 16 bits.
    pub fn uses_xpage(&self) -> bool {
        matches!(self.chip_type, 4 | 7)
    }

    /// Whether JTAG reads must select a program bank.
    pub fn banked(&self) -> bool {
        self.flash_size > 65_536
    }

    pub fn product_block_address(&self) -> u16 {
        match self.custom_block {
            2 => 0x0A00,
            3 => 0x1200,
            4 => 0x2200,
            _ => 0,
        }
    }

    pub fn code_options_size(&self) -> u16 {
        match self.custom_block {
            3 if self.chip_type == 7 => 512,
            6 => 32,
            _ => 64,
        }
    }

    pub fn code_options_address(&self) -> u32 {
        match self.custom_block {
            2 if self.chip_type == 2 => 0x0800,
            3 if self.chip_type == 2 || self.chip_type == 7 => 0x1000,
            4 => 0x2000,
            _ => self.flash_size - u32::from(self.code_options_size()),
        }
    }

    pub fn code_options_in_flash(&self) -> bool {
        !matches!(
            (self.custom_block, self.chip_type),
            (2, 2) | (3, 2) | (3, 7) | (4, _)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_size_ceiling_depends_on_chip_type() {
        assert_eq!(ChipConfig::max_flash_size(4), 1_048_576);
        assert_eq!(ChipConfig::max_flash_size(7), 131_072);
        assert_eq!(ChipConfig::max_flash_size(2), 65_536);

        assert!(ChipConfig::new(2, 65_536, 1, 3).is_ok());
        assert_eq!(ChipConfig::new(2, 131_072, 1, 3), Err(Error::InvalidConfig));
        assert!(ChipConfig::new(7, 131_072, 1, 3).is_ok());
    }

    #[test]
    fn xpage_and_banking_guards_are_independent() {
        // type 7 at 64 KiB: 24-bit pointer, no JTAG banking
        let small = ChipConfig::new(7, 65_536, 1, 3).unwrap();
        assert!(small.uses_xpage());
        assert!(!small.banked());

        // type 7 at 128 KiB: both
        let large = ChipConfig::new(7, 131_072, 1, 3).unwrap();
        assert!(large.uses_xpage());
        assert!(large.banked());

        // type 2 never pages
        let plain = ChipConfig::new(2, 32_768, 1, 3).unwrap();
        assert!(!plain.uses_xpage());
        assert!(!plain.banked());
    }

    #[test]
    fn product_block_address_table() {
        for (custom_block, address) in [(2, 0x0A00), (3, 0x1200), (4, 0x2200), (1, 0), (6, 0)] {
            let chip = ChipConfig::new(2, 32_768, 1, custom_block).unwrap();
            assert_eq!(chip.product_block_address(), address);
        }
    }

    #[test]
    fn code_options_layout() {
        // type 2 / custom block 2: options live in the custom block at 0x0800
        let chip = ChipConfig::new(2, 32_768, 1, 2).unwrap();
        assert_eq!(chip.code_options_address(), 0x0800);
        assert_eq!(chip.code_options_size(), 64);
        assert!(!chip.code_options_in_flash());

        // type 7 / custom block 3: 512 option bytes at 0x1000
        let chip = ChipConfig::new(7, 131_072, 1, 3).unwrap();
        assert_eq!(chip.code_options_address(), 0x1000);
        assert_eq!(chip.code_options_size(), 512);
        assert!(!chip.code_options_in_flash());

        // custom block 4 is fixed at 0x2000
        let chip = ChipConfig::new(1, 16_384, 1, 4).unwrap();
        assert_eq!(chip.code_options_address(), 0x2000);
        assert!(!chip.code_options_in_flash());

        // custom block 6 shrinks the option area to 32 bytes of flash
        let chip = ChipConfig::new(2, 32_768, 1, 6).unwrap();
        assert_eq!(chip.code_options_address(), 32_768 - 32);
        assert_eq!(chip.code_options_size(), 32);
        assert!(chip.code_options_in_flash());

        // anything else: last 64 bytes of flash
        let chip = ChipConfig::new(2, 32_768, 1, 1).unwrap();
        assert_eq!(chip.code_options_address(), 32_768 - 64);
        assert_eq!(chip.code_options_size(), 64);
        assert!(chip.code_options_in_flash());

        // custom block 3 on other chip types keeps the flash-resident default
        let chip = ChipConfig::new(1, 32_768, 1, 3).unwrap();
        assert_eq!(chip.code_options_address(), 32_768 - 64);
        assert!(chip.code_options_in_flash());
    }
}
