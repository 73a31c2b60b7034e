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

//! Parser for the IMMM index files (`thumbcache_idx.db`) that map file hashes to the
//! offsets of their thumbnails in the companion CMMM files. No image data lives here.

use std::io::{Read, Seek};
use super::error::{ParseError, Result};
use super::io::{ByteCursor, Debug};
use super::report::{ContainerFormat, ContainerReport};
use super::session::Session;
use super::version::{CacheType, Format, Layout};

pub const IMMM_SIGNATURE: [u8; 4] = *b"IMMM";
/// Some index files carry this in front of the signature.
pub const IMMM_PREFIX: [u8; 4] = [0x0C, 0x00, 0x30, 0x20];
pub const MINIMUM_SIZE: u64 = 24;

#[derive(Clone, Debug)]
pub struct IndexHeader {
	pub format: Format,
	pub reserved: u32,
	pub entries_used: u32,
	pub entry_count: u32,
	pub entries_total: u32,
	pub reserved_words: Vec<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum IndexClass {
	/// Hash and flags are both zero.
	FullyEmpty,
	/// Flags are zero or all ones.
	Unused,
	Populated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
	pub hash: u64,
	pub filetime: Option<u64>,
	pub flags: u32,
	offsets: [Option<u32>; CacheType::COUNT],
}

impl IndexEntry {
	/// The offset into the CMMM file of this size class, if the format has such a slot.
	pub fn offset(&self, cache_type: CacheType) -> Option<u32> {
		self.offsets[cache_type.index()]
	}

	pub fn offsets<'a>(&'a self) -> impl Iterator<Item = (CacheType, u32)> + 'a {
		CacheType::ALL.iter().filter_map(move |&t| self.offset(t).map(|o| (t, o)))
	}

	pub fn class(&self) -> IndexClass {
		if self.hash == 0 && self.flags == 0 {
			IndexClass::FullyEmpty
		}
		else if self.flags == 0 || self.flags == 0xFFFFFFFF {
			IndexClass::Unused
		}
		else {
			IndexClass::Populated
		}
	}
}

/// Size of one index record for the given layout.
pub fn record_size(layout: &Layout) -> u64 {
	8 + if layout.index_filetime { 8 } else { 0 } + 4 + 4 * layout.sizes.len() as u64
}

pub fn read_header<R: Read + Seek>(cursor: &mut ByteCursor<R>, initial_offset: u64, debug: &mut Debug) -> Result<IndexHeader> {
	cursor.seek(initial_offset + 4)?;
	let format = Format::from_tag(cursor.read_u32()?);
	let reserved = cursor.read_u32()?;
	let entries_used = cursor.read_u32()?;
	let entry_count = cursor.read_u32()?;
	let entries_total = cursor.read_u32()?;

	// Only exact version matches carry the reserved block
	let words = format.version.map(|v| v.layout().index_reserved_words).unwrap_or(0);
	let mut reserved_words = Vec::with_capacity(words);
	for _ in 0..words {
		reserved_words.push(cursor.read_u32()?);
	}
	debug.logln(1, format!("[read_header] IMMM {} ({:#X}): {} of {} entries used, {} total.", format.label(), format.tag, entries_used, entry_count, entries_total));
	Ok(IndexHeader { format, reserved, entries_used, entry_count, entries_total, reserved_words })
}

pub fn read_entry<R: Read + Seek>(cursor: &mut ByteCursor<R>, layout: &Layout) -> Result<IndexEntry> {
	let hash = cursor.read_u64()?;
	let filetime = if layout.index_filetime { Some(cursor.read_u64()?) } else { None };
	let flags = cursor.read_u32()?;
	let mut offsets = [None; CacheType::COUNT];
	for cache_type in layout.sizes {
		offsets[cache_type.index()] = Some(cursor.read_u32()?);
	}
	Ok(IndexEntry { hash, filetime, flags, offsets })
}

/// Parses an index file. `initial_offset` is where the `IMMM` signature starts.
pub fn parse<R: Read + Seek>(reader: R, file_size: u64, initial_offset: u64, session: &mut Session) -> Result<ContainerReport> {
	if file_size < MINIMUM_SIZE {
		return Err(ParseError::TooSmall { size: file_size, minimum: MINIMUM_SIZE });
	}
	let mut cursor = ByteCursor::new(reader, file_size);
	let header = read_header(&mut cursor, initial_offset, session.debug)?;
	let layout = header.format.layout();
	let size = record_size(layout);

	let mut report = ContainerReport::new(ContainerFormat::Immm, file_size);
	report.version = Some(header.format);
	report.header.push(("Entries used", header.entries_used.to_string()));
	report.header.push(("Entry count", header.entry_count.to_string()));
	report.header.push(("Entries total", header.entries_total.to_string()));
	report.diagnostics.push(("Reserved", format!("{:#X}", header.reserved)));
	if !header.reserved_words.is_empty() {
		let words: Vec<String> = header.reserved_words.iter().map(|w| format!("{:08X}", w)).collect();
		report.diagnostics.push(("Reserved block", words.join(" ")));
	}

	while cursor.remaining() >= size {
		let offset = cursor.position();
		let entry = read_entry(&mut cursor, layout)?;
		match entry.class() {
			IndexClass::FullyEmpty => session.debug.logln(3, format!("[parse] Record at {:#X} is empty.", offset)),
			IndexClass::Unused => session.debug.logln(2, format!("[parse] Record at {:#X} ({:016x}) is unused.", offset, entry.hash)),
			IndexClass::Populated => session.debug.logln(2, format!("[parse] Record at {:#X}: hash {:016x}, flags {:#X}.", offset, entry.hash, entry.flags)),
		}
		report.index_entries.push(entry);
	}
	if cursor.remaining() > 0 {
		session.debug.logln(1, format!("[parse] {} trailing bytes ignored.", cursor.remaining()));
	}
	Ok(report)
}
