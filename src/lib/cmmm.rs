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

//! Parser for the CMMM cache files (`thumbcache_*.db`, `iconcache_*.db`) of Windows Vista
//! and later. Each file holds a flat list of cache entries, one thumbnail each.

use std::cmp::max;
use std::io::{Read, Seek};
use super::auxindex::cache_id_key;
use super::cfbf::hex;
use super::error::{ParseError, Result};
use super::io::{decode_utf16, format_filetime, ByteCursor, Debug, Endian};
use super::registry::{clean_name, StreamKey};
use super::report::{ContainerFormat, ContainerReport, EntrySummary};
use super::session::Session;
use super::version::{Format, Layout};

pub const CMMM_SIGNATURE: [u8; 4] = *b"CMMM";
pub const MINIMUM_SIZE: u64 = 24;
/// The smallest cache entry header of any version.
pub const MINIMUM_ENTRY_SIZE: u64 = 48;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
const DEFAULT_EXTENSION: &str = "img";

#[derive(Clone, Debug)]
pub struct CacheHeader {
	pub format: Format,
	pub cache_type: u32,
	pub reserved: Option<u32>,
	pub first_entry_offset: u32,
	pub first_available_offset: u32,
	/// Dropped from the header in Windows 8v3.
	pub entry_count: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
	pub offset: u64,
	pub size: u32,
	pub hash: u64,
	pub stored_extension: Option<String>,
	pub width: Option<u32>,
	pub height: Option<u32>,
	pub reserved: u32,
	pub data_checksum: u64,
	pub header_checksum: u64,
	pub id: String,
	pub padding: u32,
	pub data: Vec<u8>,
}

impl CacheEntry {
	/// The stored extension if there is one, otherwise a guess from the leading bytes.
	pub fn extension(&self) -> String {
		match self.stored_extension {
			Some(ref extension) => extension.clone(),
			None => sniff_extension(&self.data).to_owned(),
		}
	}

	pub fn header_size(layout: &Layout) -> u64 {
		MINIMUM_ENTRY_SIZE
			+ if layout.stored_extension { 8 } else { 0 }
			+ if layout.dimensions { 8 } else { 0 }
	}
}

pub fn sniff_extension(data: &[u8]) -> &'static str {
	if data.starts_with(b"BM") {
		"bmp"
	}
	else if data.starts_with(&JPEG_SIGNATURE) {
		"jpg"
	}
	else if data.starts_with(&PNG_SIGNATURE) {
		"png"
	}
	else {
		DEFAULT_EXTENSION
	}
}

pub fn read_header<R: Read + Seek>(cursor: &mut ByteCursor<R>, debug: &mut Debug) -> Result<CacheHeader> {
	cursor.seek(0)?;
	let signature = cursor.read_bytes(4)?;
	if signature[..] != CMMM_SIGNATURE {
		return Err(ParseError::HeaderSignature(hex(&signature)));
	}
	let format = Format::from_tag(cursor.read_u32()?);
	let layout = format.layout();
	let cache_type = cursor.read_u32()?;
	let reserved = if layout.header_reserved { Some(cursor.read_u32()?) } else { None };
	let first_entry_offset = cursor.read_u32()?;
	let first_available_offset = cursor.read_u32()?;
	let entry_count = if layout.entry_count { Some(cursor.read_u32()?) } else { None };

	debug.logln(1, format!("[read_header] CMMM {} ({:#X}), cache type {} ({}).", format.label(), format.tag, cache_type, format.cache_type_name(cache_type)));
	debug.logln(2, format!("[read_header] First entry at {:#X}, first free at {:#X}.", first_entry_offset, first_available_offset));
	Ok(CacheHeader { format, cache_type, reserved, first_entry_offset, first_available_offset, entry_count })
}

/// Reads the entry at the cursor. Returns `None` when the signature is not `CMMM`,
/// which marks the end of the entry list.
pub fn read_entry<R: Read + Seek>(cursor: &mut ByteCursor<R>, layout: &Layout) -> Result<Option<CacheEntry>> {
	let offset = cursor.position();
	let signature = cursor.read_bytes(4)?;
	if signature[..] != CMMM_SIGNATURE {
		return Ok(None);
	}
	let size = cursor.read_u32()?;
	let hash = cursor.read_u64()?;
	let stored_extension = if layout.stored_extension {
		let raw = cursor.read_bytes(8)?;
		Some(decode_utf16(&raw, Endian::Little)).filter(|e| !e.is_empty())
	}
	else {
		None
	};
	let id_size = cursor.read_u32()?;
	let padding = cursor.read_u32()?;
	let data_size = cursor.read_u32()?;
	let (width, height) = if layout.dimensions {
		(Some(cursor.read_u32()?), Some(cursor.read_u32()?))
	}
	else {
		(None, None)
	};
	let reserved = cursor.read_u32()?;
	let data_checksum = cursor.read_u64()?;
	let header_checksum = cursor.read_u64()?;

	let id = decode_utf16(&cursor.read_bytes(id_size as u64)?, Endian::Little);
	cursor.skip(padding as u64)?;
	let data = cursor.read_bytes(data_size as u64)?;

	Ok(Some(CacheEntry {
		offset,
		size,
		hash,
		stored_extension,
		width,
		height,
		reserved,
		data_checksum,
		header_checksum,
		id,
		padding,
		data,
	}))
}

pub fn parse<R: Read + Seek>(reader: R, file_size: u64, session: &mut Session) -> Result<ContainerReport> {
	if file_size < MINIMUM_SIZE {
		return Err(ParseError::TooSmall { size: file_size, minimum: MINIMUM_SIZE });
	}
	let mut cursor = ByteCursor::new(reader, file_size);
	let header = read_header(&mut cursor, session.debug)?;
	let layout = header.format.layout();

	let mut report = ContainerReport::new(ContainerFormat::Cmmm, file_size);
	report.version = Some(header.format);
	report.cache_type = Some(header.format.cache_type_name(header.cache_type).to_owned());
	report.header.push(("First entry", format!("{:#X}", header.first_entry_offset)));
	report.header.push(("First free", format!("{:#X}", header.first_available_offset)));
	if let Some(count) = header.entry_count {
		report.header.push(("Entry count", count.to_string()));
	}
	if let Some(reserved) = header.reserved {
		report.diagnostics.push(("Reserved", format!("{:#X}", reserved)));
	}

	let mut offset = header.first_entry_offset as u64;
	while offset < file_size {
		if file_size - offset < MINIMUM_ENTRY_SIZE {
			let message = format!("{} trailing bytes at {:#X} are too few for a cache entry", file_size - offset, offset);
			report.warn(session.debug, message);
			break;
		}
		cursor.seek(offset)?;
		let entry = match read_entry(&mut cursor, layout) {
			Ok(Some(entry)) => entry,
			Ok(None) => {
				session.debug.logln(2, format!("[parse] No CMMM signature at {:#X}, end of entries.", offset));
				break;
			},
			Err(e) => {
				session.entry_failed(&format!("{:#X}", offset), e)?;
				break;
			},
		};
		let consumed = cursor.position() - offset;
		offset += max(entry.size as u64, consumed);

		if entry.id.is_empty() {
			session.debug.logln(3, format!("[parse] Empty entry at {:#X}.", entry.offset));
			continue;
		}
		record_entry(&entry, &mut report, session)?;
	}
	Ok(report)
}

fn record_entry(entry: &CacheEntry, report: &mut ContainerReport, session: &mut Session) -> Result<()> {
	let key = StreamKey::Named(clean_name(&entry.id));
	let extension = entry.extension();
	session.debug.logln(2, format!("[parse] Entry {} at {:#X}: {} bytes of {}.", entry.id, entry.offset, entry.data.len(), extension));
	let file = session.store(&mut report.registry, &key, &extension, &entry.data)?;

	let mut original_name = None;
	if let (Some(aux_index), Some(binary)) = (session.aux_index, cache_id_key(&entry.id)) {
		match aux_index.lookup(&binary) {
			Some(ref record) if record.is_image() => {
				if let Some(name) = record.original_name() {
					let timestamp = record.modified.map(format_filetime).unwrap_or_default();
					report.registry.add_catalog_entry(key.clone(), timestamp, name.clone());
					original_name = Some(name);
				}
			},
			Some(_) => session.debug.logln(3, format!("[parse] Index record for {} is not an image.", entry.id)),
			None => session.debug.logln(3, format!("[parse] No index record for {}.", entry.id)),
		}
	}

	let kind = match (entry.width, entry.height) {
		(Some(width), Some(height)) => format!("{}x{}", width, height),
		_ => format!("cache entry"),
	};
	report.entries.push(EntrySummary {
		key,
		kind,
		size: entry.data.len() as u64,
		extension,
		file,
		original_name,
	});
	Ok(())
}
