/*
thumbrecovery library & toolset
Copyright (C) 2018 Steve Muller <steve.muller@outlook.com>

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

use std::io::{Read, Seek, SeekFrom, Write, ErrorKind};
use std::io::stderr;
use chrono::{DateTime, Timelike, Utc};
use super::error::{ParseError, Result};

/// 100ns intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

/// Byte order of the multi-byte fields in a container.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Endian {
	Little,
	Big,
}

impl Endian {
	pub fn u16(self, bytes: &[u8], offset: usize) -> Result<u16> {
		let b = slice(bytes, offset, 2)?;
		Ok(match self {
			Endian::Little => u16::from_le_bytes([b[0], b[1]]),
			Endian::Big => u16::from_be_bytes([b[0], b[1]]),
		})
	}

	pub fn u32(self, bytes: &[u8], offset: usize) -> Result<u32> {
		let b = slice(bytes, offset, 4)?;
		let a = [b[0], b[1], b[2], b[3]];
		Ok(match self {
			Endian::Little => u32::from_le_bytes(a),
			Endian::Big => u32::from_be_bytes(a),
		})
	}

	pub fn u64(self, bytes: &[u8], offset: usize) -> Result<u64> {
		let b = slice(bytes, offset, 8)?;
		let mut a = [0u8; 8];
		a.copy_from_slice(b);
		Ok(match self {
			Endian::Little => u64::from_le_bytes(a),
			Endian::Big => u64::from_be_bytes(a),
		})
	}
}

/// Bounds-checked sub-slice of an in-memory buffer.
pub fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
	match offset.checked_add(len) {
		Some(end) if end <= bytes.len() => Ok(&bytes[offset..end]),
		_ => Err(ParseError::Truncated { offset: offset as u64, wanted: len as u64 }),
	}
}

/// Decodes UTF-16 code units in the given byte order, stopping at the first NUL.
pub fn decode_utf16(bytes: &[u8], endian: Endian) -> String {
	let units = bytes
		.chunks_exact(2)
		.map(|c| match endian {
			Endian::Little => u16::from_le_bytes([c[0], c[1]]),
			Endian::Big => u16::from_be_bytes([c[0], c[1]]),
		})
		.take_while(|&u| u != 0);
	std::char::decode_utf16(units)
		.map(|r| r.unwrap_or(std::char::REPLACEMENT_CHARACTER))
		.collect()
}

/// Renders a Windows FILETIME as `YYYY-MM-DDTHH:MM:SS Z` (UTC). Zero renders as the Unix epoch.
pub fn format_filetime(filetime: u64) -> String {
	let (seconds, nanos) = if filetime == 0 {
		(0, 0)
	}
	else {
		let ticks = filetime as i64 - FILETIME_UNIX_EPOCH;
		(ticks.div_euclid(10_000_000), (ticks.rem_euclid(10_000_000) * 100) as u32)
	};
	match DateTime::<Utc>::from_timestamp(seconds, nanos) {
		Some(time) if time.nanosecond() >= 1_000 => format!("{} Z", time.format("%Y-%m-%dT%H:%M:%S%.6f")),
		Some(time) => format!("{} Z", time.format("%Y-%m-%dT%H:%M:%S")),
		None => format!("FILETIME {:#X}", filetime),
	}
}

/// A seekable byte source whose reads fail with `Truncated` instead of returning short data.
pub struct ByteCursor<R: Read + Seek> {
	inner: R,
	size: u64,
	position: u64,
	pub endian: Endian,
}

impl<R> ByteCursor<R> where R: Read + Seek {
	pub fn new(inner: R, size: u64) -> ByteCursor<R> {
		ByteCursor { inner, size, position: 0, endian: Endian::Little }
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn position(&self) -> u64 {
		self.position
	}

	pub fn remaining(&self) -> u64 {
		self.size.saturating_sub(self.position)
	}

	pub fn seek(&mut self, position: u64) -> Result<()> {
		if position > self.size {
			return Err(ParseError::Truncated { offset: position, wanted: 0 });
		}
		self.inner.seek(SeekFrom::Start(position))?;
		self.position = position;
		Ok(())
	}

	pub fn skip(&mut self, count: u64) -> Result<()> {
		let target = self.position.saturating_add(count);
		self.seek(target)
	}

	pub fn read_into(&mut self, buffer: &mut [u8]) -> Result<()> {
		let wanted = buffer.len() as u64;
		if wanted > self.remaining() {
			return Err(ParseError::Truncated { offset: self.position, wanted });
		}
		match self.inner.read_exact(buffer) {
			Ok(()) => {},
			Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => {
				return Err(ParseError::Truncated { offset: self.position, wanted });
			},
			Err(e) => return Err(e.into()),
		}
		self.position += wanted;
		Ok(())
	}

	pub fn read_bytes(&mut self, count: u64) -> Result<Vec<u8>> {
		if count > self.remaining() {
			return Err(ParseError::Truncated { offset: self.position, wanted: count });
		}
		let mut buffer = vec![0u8; count as usize];
		self.read_into(&mut buffer)?;
		Ok(buffer)
	}

	pub fn read_u16(&mut self) -> Result<u16> {
		let mut buffer = [0; 2];
		self.read_into(&mut buffer)?;
		self.endian.u16(&buffer, 0)
	}

	pub fn read_u32(&mut self) -> Result<u32> {
		let mut buffer = [0; 4];
		self.read_into(&mut buffer)?;
		self.endian.u32(&buffer, 0)
	}

	pub fn read_u64(&mut self) -> Result<u64> {
		let mut buffer = [0; 8];
		self.read_into(&mut buffer)?;
		self.endian.u64(&buffer, 0)
	}

	pub fn into_inner(self) -> R {
		self.inner
	}
}

/// Leveled diagnostic writer.
///
/// Level -1 only shows errors, 0 adds warnings, 1 info, 2 per-entry detail and 3 a full trace.
pub struct Debug {
	output: Box<dyn Write>,
	level: i8,
}

impl Debug {
	pub fn new(output: impl Write + 'static, level: i8) -> Debug {
		Debug { output: Box::new(output), level }
	}

	/// A writer that only lets errors through to standard error.
	pub fn quiet() -> Debug {
		Debug::new(stderr(), -1)
	}

	pub fn level(&self) -> i8 {
		self.level
	}

	pub fn log(&mut self, level: i8, string: String) {
		if self.level >= level {
			let _ = self.output.write_all(string.as_bytes());
		}
	}

	pub fn logln(&mut self, level: i8, string: String) {
		if self.level >= level {
			let _ = self.output.write_all(string.as_bytes());
			let _ = self.output.write_all(&[0x0A]);
		}
	}

	pub fn error(&mut self, string: String) {
		self.logln(-1, format!("ERROR: {}", string));
	}

	pub fn warn(&mut self, string: String) {
		self.logln(0, format!("WARNING: {}", string));
	}

	pub fn info(&mut self, string: String) {
		self.logln(1, format!("INFO: {}", string));
	}
}
