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

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorError {
    InsufficientBuffer,
}

/// Position-tracking writer over a caller-supplied response buffer.
///
/// Implements `core::fmt::Write` so response lines can be assembled with
/// `write!` without allocation; a line that would overflow the buffer is
/// reported as `CursorError`, never truncated silently.
pub struct BufferCursor<Buffer> {
    buffer: Buffer,
    position: usize,
}

impl<Buffer> BufferCursor<Buffer> {
    pub fn new(buffer: Buffer) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    pub fn release(self) -> Buffer {
        self.buffer
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl<Buffer: AsMut<[u8]>> BufferCursor<Buffer> {
    pub fn write(&mut self, data: &[u8]) -> Result<(), CursorError> {
        let buffer = self.buffer.as_mut();
        let remaining = buffer.len() - self.position;
        if remaining < data.len() {
            return Err(CursorError::InsufficientBuffer);
        }
        buffer[self.position..self.position + data.len()].copy_from_slice(data);
        self.position += data.len();
        Ok(())
    }
}

impl<Buffer: AsMut<[u8]>> core::fmt::Write for BufferCursor<Buffer> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write(s.as_bytes()).map_err(|_| core::fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;

    #[test]
    fn writes_advance_position() {
        let mut buf = [0u8; 8];
        let mut cursor = BufferCursor::new(&mut buf[..]);
        cursor.write(b"OK").unwrap();
        cursor.write(b" 1").unwrap();
        assert_eq!(cursor.position(), 4);
        assert_eq!(&buf[..4], b"OK 1");
    }

    #[test]
    fn overflow_is_reported_not_truncated() {
        let mut buf = [0u8; 4];
        let mut cursor = BufferCursor::new(&mut buf[..]);
        cursor.write(b"OK").unwrap();
        assert_eq!(cursor.write(b" 123"), Err(CursorError::InsufficientBuffer));
        // the failed write must not have emitted a partial payload
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn formats_through_fmt_write() {
        let mut buf = [0u8; 16];
        let mut cursor = BufferCursor::new(&mut buf[..]);
        write!(cursor, "OK 0x{:04X}", 0x1234).unwrap();
        let pos = cursor.position();
        assert_eq!(&buf[..pos], b"OK 0x1234");
    }
}
