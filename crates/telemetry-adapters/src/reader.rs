//! Width- and offset-exact little-endian readers.
//!
//! [`LayoutReader`] serves fixed shared-memory layouts (random access by
//! offset); [`PacketReader`] serves variable-length broadcast payloads
//! (sequential cursor). Neither panics on short input.

use racing_telemetry_core::DecodeError;

/// Random-access reader over a fixed-size layout.
#[derive(Debug, Clone, Copy)]
pub struct LayoutReader<'a> {
    layout: &'static str,
    data: &'a [u8],
}

impl<'a> LayoutReader<'a> {
    /// Accepts buffers at least `expected` bytes long. Mapped views are often
    /// rounded up to a page, so trailing bytes are ignored.
    pub fn new(layout: &'static str, data: &'a [u8], expected: usize) -> Result<Self, DecodeError> {
        if data.len() < expected {
            return Err(DecodeError::SizeMismatch {
                layout,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { layout, data })
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(DecodeError::Truncated {
                layout: self.layout,
                offset,
                needed: len,
                total: self.data.len(),
            })
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let slice = self.bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn u8(&self, offset: usize) -> Result<u8, DecodeError> {
        self.array::<1>(offset).map(|b| b[0])
    }

    pub fn bool_u8(&self, offset: usize) -> Result<bool, DecodeError> {
        Ok(self.u8(offset)? != 0)
    }

    pub fn i32(&self, offset: usize) -> Result<i32, DecodeError> {
        self.array(offset).map(i32::from_le_bytes)
    }

    /// Non-finite values read as `0.0`.
    pub fn f32(&self, offset: usize) -> Result<f32, DecodeError> {
        let value = self.array(offset).map(f32::from_le_bytes)?;
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// Non-finite values read as `0.0`.
    pub fn f64(&self, offset: usize) -> Result<f64, DecodeError> {
        let value = self.array(offset).map(f64::from_le_bytes)?;
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// `N` consecutive `f32` values.
    pub fn f32_array<const N: usize>(&self, offset: usize) -> Result<[f32; N], DecodeError> {
        let mut out = [0.0f32; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.f32(offset + i * 4)?;
        }
        Ok(out)
    }

    /// Three consecutive `f64` values.
    pub fn f64_vec3(&self, offset: usize) -> Result<[f64; 3], DecodeError> {
        Ok([
            self.f64(offset)?,
            self.f64(offset + 8)?,
            self.f64(offset + 16)?,
        ])
    }

    /// `wchar_t[chars]` as UTF-16LE, truncated at the first NUL.
    pub fn utf16_string(&self, offset: usize, chars: usize) -> Result<String, DecodeError> {
        let raw = self.bytes(offset, chars * 2)?;
        Ok(decode_utf16_nul_terminated(raw))
    }

    /// `char[len]` as lossy UTF-8, truncated at the first NUL.
    pub fn c_string(&self, offset: usize, len: usize) -> Result<String, DecodeError> {
        let raw = self.bytes(offset, len)?;
        Ok(decode_c_string(raw))
    }
}

pub fn decode_utf16_nul_terminated(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .filter_map(|pair| <[u8; 2]>::try_from(pair).ok())
        .map(u16::from_le_bytes)
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

pub fn decode_c_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(raw.get(..end).unwrap_or_default()).into_owned()
}

/// Sequential reader over a broadcast payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    layout: &'static str,
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(layout: &'static str, data: &'a [u8]) -> Self {
        Self {
            layout,
            data,
            offset: 0,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let slice = self
            .offset
            .checked_add(len)
            .and_then(|end| self.data.get(self.offset..end))
            .ok_or(DecodeError::Truncated {
                layout: self.layout,
                offset: self.offset,
                needed: len,
                total: self.data.len(),
            })?;
        self.offset += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.read_exact(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_bool_u8(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        let value = self.read_array().map(f32::from_le_bytes)?;
        Ok(if value.is_finite() { value } else { 0.0 })
    }

    /// u16 byte length followed by UTF-8 text.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let length = usize::from(self.read_u16_le()?);
        let raw = self.read_exact(length)?;
        String::from_utf8(raw.to_vec()).map_err(|e| DecodeError::InvalidText {
            layout: self.layout,
            reason: e.to_string(),
        })
    }
}

/// Append a u16-length-prefixed UTF-8 string.
pub fn write_string(
    layout: &'static str,
    buffer: &mut Vec<u8>,
    value: &str,
) -> Result<(), DecodeError> {
    let bytes = value.as_bytes();
    let length = u16::try_from(bytes.len()).map_err(|_| DecodeError::InvalidText {
        layout,
        reason: format!("string exceeds u16 length: {} bytes", bytes.len()),
    })?;
    buffer.extend_from_slice(&length.to_le_bytes());
    buffer.extend_from_slice(bytes);
    Ok(())
}
