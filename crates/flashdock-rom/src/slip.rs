//! SLIP framing
//!
//! Every packet on the wire is wrapped in `0xC0` delimiters, with `0xC0`
//! and `0xDB` inside the packet escaped as `0xDB 0xDC` and `0xDB 0xDD`.

use core::convert::Infallible;

use embedded_io::{ErrorType, Write};

/// Frame delimiter
pub const SLIP_END: u8 = 0xC0;
/// Escape byte
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped frame delimiter
pub const SLIP_ESC_END: u8 = 0xDC;
/// Escaped escape byte
pub const SLIP_ESC_ESC: u8 = 0xDD;

/// Streaming SLIP encoder
///
/// Writes the opening delimiter on creation; [`finish`](Self::finish)
/// writes the closing one.
pub struct SlipEncoder<'a, W: Write> {
    writer: &'a mut W,
    len: usize,
}

impl<'a, W: Write> SlipEncoder<'a, W> {
    /// Start a frame on `writer`
    pub fn new(writer: &'a mut W) -> Result<Self, W::Error> {
        writer.write_all(&[SLIP_END])?;
        Ok(Self { writer, len: 1 })
    }

    /// Close the frame, returning the number of bytes written
    pub fn finish(self) -> Result<usize, W::Error> {
        self.writer.write_all(&[SLIP_END])?;
        Ok(self.len + 1)
    }
}

impl<W: Write> ErrorType for SlipEncoder<'_, W> {
    type Error = W::Error;
}

impl<W: Write> Write for SlipEncoder<'_, W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &value in buf {
            match value {
                SLIP_END => {
                    self.writer.write_all(&[SLIP_ESC, SLIP_ESC_END])?;
                    self.len += 2;
                }
                SLIP_ESC => {
                    self.writer.write_all(&[SLIP_ESC, SLIP_ESC_ESC])?;
                    self.len += 2;
                }
                _ => {
                    self.writer.write_all(&[value])?;
                    self.len += 1;
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.writer.flush()
    }
}

/// A writer that appends to a `Vec<u8>`
pub struct VecWriter<'a> {
    vec: &'a mut Vec<u8>,
}

impl<'a> VecWriter<'a> {
    /// Append to `vec`
    pub fn new(vec: &'a mut Vec<u8>) -> Self {
        Self { vec }
    }
}

impl ErrorType for VecWriter<'_> {
    type Error = Infallible;
}

impl Write for VecWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.vec.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Frame a whole packet
pub fn encode(packet: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(packet.len() + 8);
    let mut writer = VecWriter::new(&mut buf);
    let result = SlipEncoder::new(&mut writer).and_then(|mut encoder| {
        encoder.write_all(packet)?;
        encoder.finish()
    });
    match result {
        Ok(_) => buf,
        Err(never) => match never {},
    }
}

/// Incremental SLIP decoder
///
/// Bytes outside a frame are ignored, so boot-log noise before the first
/// delimiter is skipped.
#[derive(Debug, Default)]
pub struct SlipDecoder {
    buffer: Vec<u8>,
    in_escape: bool,
    in_frame: bool,
}

impl SlipDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, returning a packet when a frame completes
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            SLIP_END => {
                if self.in_frame && !self.buffer.is_empty() {
                    self.in_frame = false;
                    self.in_escape = false;
                    return Some(std::mem::take(&mut self.buffer));
                }
                self.in_frame = true;
                self.buffer.clear();
            }
            SLIP_ESC if self.in_frame => {
                self.in_escape = true;
            }
            SLIP_ESC_END if self.in_frame && self.in_escape => {
                self.buffer.push(SLIP_END);
                self.in_escape = false;
            }
            SLIP_ESC_ESC if self.in_frame && self.in_escape => {
                self.buffer.push(SLIP_ESC);
                self.in_escape = false;
            }
            _ if self.in_frame => {
                if self.in_escape {
                    self.buffer.push(SLIP_ESC);
                    self.in_escape = false;
                }
                self.buffer.push(byte);
            }
            _ => {}
        }
        None
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_escape = false;
        self.in_frame = false;
    }
}
