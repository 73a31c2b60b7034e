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

//! Thumbs.db semantics on top of the compound file engine: the `Catalog` stream with the
//! original file names, and the image streams with their two kinds of sub-headers.

use std::io::{Read, Seek};
use super::cfbf::Container;
use super::cfbf::structures::{DirectoryEntry, EntryType};
use super::codec::find_frame;
use super::error::{ParseError, Result};
use super::io::{decode_utf16, format_filetime, slice, Debug, Endian};
use super::registry::StreamKey;
use super::report::{ContainerFormat, ContainerReport, EntrySummary};
use super::session::Session;

pub const CATALOG_STREAM: &str = "Catalog";
pub const CATALOG_HEADER_SIZE: usize = 16;
/// Length, id, timestamp and the 4-byte terminator.
pub const CATALOG_RECORD_MINIMUM: usize = 20;
pub const TYPE_2_SIGNATURE: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const TYPE_1_MARKER: u32 = 1;
const TYPE_1_HEADER_SIZE: usize = 16;
const THUMBNAIL_EXTENSION: &str = "jpg";

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogHeader {
	pub offset: u16,
	pub version: u16,
	pub count: u32,
	pub width: u32,
	pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRecord {
	pub id: u32,
	pub timestamp: u64,
	pub name: String,
}

pub fn parse_catalog(data: &[u8], endian: Endian) -> Result<(CatalogHeader, Vec<CatalogRecord>)> {
	let header = CatalogHeader {
		offset: endian.u16(data, 0)?,
		version: endian.u16(data, 2)?,
		count: endian.u32(data, 4)?,
		width: endian.u32(data, 8)?,
		height: endian.u32(data, 12)?,
	};
	if (header.offset as usize) < CATALOG_HEADER_SIZE {
		return Err(ParseError::EntryFormat(format!("catalog records start at {} inside the catalog header", header.offset)));
	}

	let mut records = Vec::new();
	let mut position = header.offset as usize;
	while position + 4 <= data.len() {
		let length = endian.u32(data, position)? as usize;
		if length == 0 {
			break;
		}
		if length < CATALOG_RECORD_MINIMUM {
			return Err(ParseError::EntryFormat(format!("catalog record at {:#X} is only {} bytes long", position, length)));
		}
		let record = slice(data, position, length)?;
		records.push(CatalogRecord {
			id: endian.u32(record, 4)?,
			timestamp: endian.u64(record, 8)?,
			name: decode_utf16(&record[16..length - 4], endian),
		});
		position += length;
	}
	Ok((header, records))
}

/// The image payload of a thumbnail stream.
#[derive(Debug, PartialEq)]
pub enum ThumbnailPayload<'a> {
	/// "Type 2": a complete JPEG file.
	Full(&'a [u8]),
	/// "Type 1": JPEG data without header and tables.
	Fragment(&'a [u8]),
}

#[derive(Debug, PartialEq)]
pub struct Thumbnail<'a> {
	pub offset: u32,
	pub revision: u32,
	pub length: u16,
	pub payload: ThumbnailPayload<'a>,
}

pub fn parse_thumbnail(data: &[u8], endian: Endian) -> Result<Thumbnail> {
	if !data.ends_with(&JPEG_EOI) {
		return Err(ParseError::EntryFormat(format!("missing JPEG end-of-image marker")));
	}
	let offset = endian.u32(data, 0)?;
	let revision = endian.u32(data, 4)?;
	let length = endian.u16(data, 8)?;
	if offset as usize > data.len() {
		return Err(ParseError::EntryFormat(format!("payload offset {} lies beyond the stream ({} bytes)", offset, data.len())));
	}
	let payload = &data[offset as usize..];
	if length as usize != payload.len() {
		return Err(ParseError::EntryFormat(format!("sub-header declares {} bytes, payload holds {}", length, payload.len())));
	}

	let payload = if payload.starts_with(&TYPE_2_SIGNATURE) {
		ThumbnailPayload::Full(payload)
	}
	else if payload.len() >= TYPE_1_HEADER_SIZE && endian.u32(payload, 0)? == TYPE_1_MARKER {
		let declared = endian.u16(payload, 4)?;
		let fragment = &payload[TYPE_1_HEADER_SIZE..];
		if declared as usize != fragment.len() {
			return Err(ParseError::EntryFormat(format!("second sub-header declares {} bytes, fragment holds {}", declared, fragment.len())));
		}
		ThumbnailPayload::Fragment(fragment)
	}
	else {
		return Err(ParseError::EntryFormat(format!("no recognised image header")));
	};
	Ok(Thumbnail { offset, revision, length, payload })
}

pub fn parse<R: Read + Seek>(reader: R, file_size: u64, session: &mut Session) -> Result<ContainerReport> {
	let mut container = Container::new(reader, file_size, session.debug)?;
	let header = container.header().clone();
	let format = if header.is_beta() { ContainerFormat::CompoundFileBeta } else { ContainerFormat::CompoundFile };

	let mut report = ContainerReport::new(format, file_size);
	report.header.push(("CFB version", format!("{}.{}", header.major_version, header.minor_version)));
	report.header.push(("Byte order", format!("{:?}", header.endian)));
	report.header.push(("Sector size", header.sector_size.to_string()));
	report.header.push(("Directory", format!("{} entries", container.entries().len())));
	report.diagnostics.push(("SAT sectors", header.number_of_sat_sectors.to_string()));
	report.diagnostics.push(("Mini-SAT sectors", header.number_of_minisat_sectors.to_string()));

	let streams: Vec<DirectoryEntry> = container.entries().iter()
		.filter(|e| e.entry_type == EntryType::Stream)
		.cloned()
		.collect();
	let mut has_catalog = false;
	for entry in &streams {
		let data = match container.read_stream(entry, session.debug) {
			Ok(data) => data,
			Err(e) => {
				session.entry_failed(&entry.name, e)?;
				continue;
			},
		};
		if entry.name == CATALOG_STREAM {
			has_catalog = true;
			if let Err(e) = record_catalog(&data, header.endian, &mut report, session.debug) {
				session.entry_failed(&entry.name, e)?;
			}
			continue;
		}
		let key = StreamKey::from_stream_name(&entry.name);
		if let Err(e) = record_thumbnail(&key, &data, header.endian, &mut report, session) {
			session.entry_failed(&entry.name, e)?;
		}
	}

	for summary in report.entries.iter_mut() {
		summary.original_name = report.registry.catalog.get(&summary.key)
			.and_then(|entries| entries.first())
			.map(|entry| entry.name.clone());
	}
	if has_catalog {
		cross_check(&mut report, session.debug);
	}
	Ok(report)
}

fn record_catalog(data: &[u8], endian: Endian, report: &mut ContainerReport, debug: &mut Debug) -> Result<()> {
	let (header, records) = parse_catalog(data, endian)?;
	debug.logln(1, format!("[record_catalog] Catalog v{} lists {} thumbnails of {}x{}.", header.version, header.count, header.width, header.height));
	report.header.push(("Catalog", format!("{} thumbnails, {}x{}", header.count, header.width, header.height)));
	for record in records {
		debug.logln(2, format!("[record_catalog] #{} {} ({:#X})", record.id, record.name, record.timestamp));
		report.registry.add_catalog_entry(StreamKey::Numeric(record.id), format_filetime(record.timestamp), record.name);
	}
	Ok(())
}

fn record_thumbnail(key: &StreamKey, data: &[u8], endian: Endian, report: &mut ContainerReport, session: &mut Session) -> Result<()> {
	let thumbnail = parse_thumbnail(data, endian)?;
	let (kind, image) = match thumbnail.payload {
		ThumbnailPayload::Full(jpeg) => ("Type 2 (JPEG)", jpeg.to_vec()),
		ThumbnailPayload::Fragment(fragment) => ("Type 1 (fragment)", reconstruct(key, fragment, session)),
	};
	session.debug.logln(2, format!("[record_thumbnail] Stream {}: {}, {} bytes.", key, kind, data.len()));
	let file = session.store(&mut report.registry, key, THUMBNAIL_EXTENSION, &image)?;
	report.entries.push(EntrySummary {
		key: key.clone(),
		kind: kind.to_owned(),
		size: data.len() as u64,
		extension: THUMBNAIL_EXTENSION.to_owned(),
		file,
		original_name: None,
	});
	Ok(())
}

/// Rebuilds a Type 1 thumbnail. Failures only cost the image, so they end up as an
/// empty result and a warning.
fn reconstruct(key: &StreamKey, fragment: &[u8], session: &mut Session) -> Vec<u8> {
	let (codec, support) = match session.codec {
		Some(codec) => codec,
		None => {
			session.debug.logln(1, format!("[reconstruct] Stream {} needs the JPEG support resources, not extracted.", key));
			return Vec::new();
		},
	};
	let result = find_frame(fragment)
		.ok_or_else(|| ParseError::Codec(format!("no frame marker in fragment")))
		.and_then(|frame| codec.reconstruct(frame, support));
	match result {
		Ok(image) => image,
		Err(e) => {
			session.debug.warn(format!("Stream {}: {}", key, e));
			Vec::new()
		},
	}
}

/// Warns when the catalog and the recovered streams disagree on the number of thumbnails.
pub fn cross_check(report: &mut ContainerReport, debug: &mut Debug) {
	if report.registry.catalog_matches_streams() {
		return;
	}
	let message = format!(
		"Catalog lists {} thumbnails but {} streams were recovered",
		report.registry.catalog.len(),
		report.registry.streams.len(),
	);
	report.warn(debug, message);
}
