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

//! Builders for synthetic thumbnail caches.

#![allow(dead_code)]

use std::io::Cursor;
use image::ImageFormat;
use thumbrecovery::codec::JpegSupport;
use thumbrecovery::cfbf::structures::{DISAT_SECTOR, END_OF_CHAIN, FREE_SECTOR, NO_STREAM, OLE_SIGNATURE, SAT_SECTOR};

const MINI_SECTOR: usize = 64;
const CUTOFF: usize = 4096;
const HEADER_DIFAT: usize = 109;

pub fn le16(value: u16) -> Vec<u8> {
	value.to_le_bytes().to_vec()
}

pub fn le32(value: u32) -> Vec<u8> {
	value.to_le_bytes().to_vec()
}

pub fn le64(value: u64) -> Vec<u8> {
	value.to_le_bytes().to_vec()
}

pub fn utf16(text: &str) -> Vec<u8> {
	text.encode_utf16().flat_map(|u| u.to_le_bytes().to_vec()).collect()
}

fn sectors_for(bytes: usize, unit: usize) -> usize {
	(bytes + unit - 1) / unit
}

/// Where a stream ended up inside a built compound file.
#[derive(Clone, Debug)]
pub struct Placement {
	pub name: String,
	pub mini: bool,
	/// Sectors (or mini-sectors) in chain order.
	pub chain: Vec<u32>,
}

/// Builds compound files: version 3 with 512-byte sectors by default, version 4 with
/// 4096-byte sectors on request, in either byte order.
pub struct CfbBuilder {
	streams: Vec<(String, Vec<u8>)>,
	scatter: bool,
	scatter_mini: bool,
	sector_shift: u16,
	big_endian: bool,
	reserved: usize,
}

impl CfbBuilder {
	pub fn new() -> CfbBuilder {
		CfbBuilder { streams: Vec::new(), scatter: false, scatter_mini: false, sector_shift: 9, big_endian: false, reserved: 0 }
	}

	pub fn stream(mut self, name: &str, data: Vec<u8>) -> CfbBuilder {
		self.streams.push((name.to_owned(), data));
		self
	}

	/// Lays regular streams out back to front, so their chains run backwards through the file.
	pub fn scatter(mut self) -> CfbBuilder {
		self.scatter = true;
		self
	}

	/// Same for the Mini-SAT chains and for the sectors holding the mini stream.
	pub fn scatter_mini(mut self) -> CfbBuilder {
		self.scatter_mini = true;
		self
	}

	/// Version 4 geometry: 4096-byte sectors.
	pub fn large_sectors(mut self) -> CfbBuilder {
		self.sector_shift = 12;
		self
	}

	pub fn big_endian(mut self) -> CfbBuilder {
		self.big_endian = true;
		self
	}

	/// Leaves `count` free sectors in front of the regular streams.
	pub fn reserve(mut self, count: usize) -> CfbBuilder {
		self.reserved = count;
		self
	}

	fn sector_size(&self) -> usize {
		1 << self.sector_shift
	}

	fn u16(&self, value: u16) -> Vec<u8> {
		if self.big_endian { value.to_be_bytes().to_vec() } else { value.to_le_bytes().to_vec() }
	}

	fn u32(&self, value: u32) -> Vec<u8> {
		if self.big_endian { value.to_be_bytes().to_vec() } else { value.to_le_bytes().to_vec() }
	}

	fn u64(&self, value: u64) -> Vec<u8> {
		if self.big_endian { value.to_be_bytes().to_vec() } else { value.to_le_bytes().to_vec() }
	}

	pub fn build(&self) -> Vec<u8> {
		self.build_with_layout().0
	}

	pub fn build_with_layout(&self) -> (Vec<u8>, Vec<Placement>) {
		let sector = self.sector_size();

		// Mini-SAT and the mini stream content
		let mut minisat: Vec<u32> = Vec::new();
		let mut mini_contents: Vec<(u32, Vec<u8>)> = Vec::new();
		let mut placements = Vec::new();
		for (name, data) in &self.streams {
			if data.is_empty() || data.len() >= CUTOFF {
				placements.push(Placement { name: name.clone(), mini: false, chain: Vec::new() });
				continue;
			}
			let count = sectors_for(data.len(), MINI_SECTOR);
			let chain = if self.scatter_mini { backwards(&mut minisat, count) } else { contiguous(&mut minisat, count) };
			for (k, &minisector) in chain.iter().enumerate() {
				let end = std::cmp::min(data.len(), (k + 1) * MINI_SECTOR);
				mini_contents.push((minisector, data[k * MINI_SECTOR..end].to_vec()));
			}
			placements.push(Placement { name: name.clone(), mini: true, chain });
		}
		let mut ministream = vec![0u8; minisat.len() * MINI_SECTOR];
		for (minisector, bytes) in mini_contents {
			let offset = minisector as usize * MINI_SECTOR;
			ministream[offset..offset + bytes.len()].copy_from_slice(&bytes);
		}

		// Size everything first, so the SAT and DIFAT sectors can come first
		let directory_count = sectors_for((self.streams.len() + 1) * 128, sector);
		let minisat_count = sectors_for(minisat.len() * 4, sector);
		let ministream_count = sectors_for(ministream.len(), sector);
		let stream_count: usize = self.streams.iter().zip(&placements)
			.filter(|(_, placement)| !placement.mini)
			.map(|((_, data), _)| sectors_for(data.len(), sector))
			.sum();
		let data_count = directory_count + minisat_count + ministream_count + self.reserved + stream_count;
		let (sat_count, difat_count) = table_sectors(data_count, sector / 4);

		let mut sat: Vec<u32> = vec![SAT_SECTOR; sat_count];
		sat.resize(sat_count + difat_count, DISAT_SECTOR);
		let directory = contiguous(&mut sat, directory_count);
		let minisat_sectors = contiguous(&mut sat, minisat_count);
		let ministream_sectors = if self.scatter_mini { backwards(&mut sat, ministream_count) } else { contiguous(&mut sat, ministream_count) };
		let free_from = sat.len();
		sat.resize(free_from + self.reserved, FREE_SECTOR);

		let mut contents: Vec<(u32, Vec<u8>)> = Vec::new();
		for (i, (_, data)) in self.streams.iter().enumerate() {
			if placements[i].mini || data.is_empty() {
				continue;
			}
			let count = sectors_for(data.len(), sector);
			let chain = if self.scatter { backwards(&mut sat, count) } else { contiguous(&mut sat, count) };
			for (k, &s) in chain.iter().enumerate() {
				let end = std::cmp::min(data.len(), (k + 1) * sector);
				contents.push((s, data[k * sector..end].to_vec()));
			}
			placements[i].chain = chain;
		}
		assert_eq!(sat.len(), sat_count + difat_count + data_count);

		let minisat_bytes: Vec<u8> = minisat.iter().flat_map(|&v| self.u32(v)).collect();
		for (k, &s) in minisat_sectors.iter().enumerate() {
			let end = std::cmp::min(minisat_bytes.len(), (k + 1) * sector);
			contents.push((s, minisat_bytes[k * sector..end].to_vec()));
		}
		for (k, &s) in ministream_sectors.iter().enumerate() {
			let end = std::cmp::min(ministream.len(), (k + 1) * sector);
			contents.push((s, ministream[k * sector..end].to_vec()));
		}

		let mut entries = Vec::new();
		let root_child = if self.streams.is_empty() { NO_STREAM } else { 1 };
		let root_start = ministream_sectors.first().cloned().unwrap_or(END_OF_CHAIN);
		entries.extend(self.directory_entry("Root Entry", 5, NO_STREAM, root_child, root_start, ministream.len() as u64));
		for (i, (name, data)) in self.streams.iter().enumerate() {
			let right = if i + 1 < self.streams.len() { i as u32 + 2 } else { NO_STREAM };
			let first = placements[i].chain.first().cloned().unwrap_or(END_OF_CHAIN);
			entries.extend(self.directory_entry(name, 2, right, NO_STREAM, first, data.len() as u64));
		}
		while entries.len() < directory_count * sector {
			entries.extend(self.directory_entry("", 0, NO_STREAM, NO_STREAM, FREE_SECTOR, 0));
		}
		for (k, &s) in directory.iter().enumerate() {
			contents.push((s, entries[k * sector..(k + 1) * sector].to_vec()));
		}

		let mut sat_bytes: Vec<u8> = sat.iter().flat_map(|&v| self.u32(v)).collect();
		sat_bytes.resize(sat_count * sector, 0xFF);
		for k in 0..sat_count {
			contents.push((k as u32, sat_bytes[k * sector..(k + 1) * sector].to_vec()));
		}

		// SAT sectors past the 109 listed in the header go to the DIFAT chain
		let per_difat = sector / 4 - 1;
		let overflow: Vec<u32> = (HEADER_DIFAT..sat_count).map(|s| s as u32).collect();
		for (j, chunk) in overflow.chunks(per_difat).enumerate() {
			let mut difat_sector: Vec<u8> = chunk.iter().flat_map(|&v| self.u32(v)).collect();
			for _ in chunk.len()..per_difat {
				difat_sector.extend(self.u32(FREE_SECTOR));
			}
			let next = if j + 1 < difat_count { (sat_count + j + 1) as u32 } else { END_OF_CHAIN };
			difat_sector.extend(self.u32(next));
			contents.push(((sat_count + j) as u32, difat_sector));
		}

		let geometry = Geometry {
			sat_count,
			difat_count,
			first_directory: directory[0],
			directory_count,
			first_minisat: minisat_sectors.first().cloned(),
			minisat_count,
		};
		let mut file = self.header(&geometry);
		file.resize(sector * (sat.len() + 1), 0);
		for (s, bytes) in contents {
			let offset = (s as usize + 1) * sector;
			file[offset..offset + bytes.len()].copy_from_slice(&bytes);
		}
		(file, placements)
	}

	fn header(&self, geometry: &Geometry) -> Vec<u8> {
		let version = if self.sector_shift == 12 { 4 } else { 3 };
		let mut header = OLE_SIGNATURE.to_vec();
		header.extend_from_slice(&[0; 16]);
		header.extend(self.u16(0x3E));
		header.extend(self.u16(version));
		header.extend_from_slice(if self.big_endian { &[0xFF, 0xFE] } else { &[0xFE, 0xFF] });
		header.extend(self.u16(self.sector_shift));
		header.extend(self.u16(6));
		header.extend_from_slice(&[0; 6]);
		header.extend(self.u32(if version == 4 { geometry.directory_count as u32 } else { 0 }));
		header.extend(self.u32(geometry.sat_count as u32));
		header.extend(self.u32(geometry.first_directory));
		header.extend(self.u32(0));
		header.extend(self.u32(CUTOFF as u32));
		header.extend(self.u32(geometry.first_minisat.unwrap_or(END_OF_CHAIN)));
		header.extend(self.u32(geometry.minisat_count as u32));
		header.extend(self.u32(if geometry.difat_count > 0 { geometry.sat_count as u32 } else { END_OF_CHAIN }));
		header.extend(self.u32(geometry.difat_count as u32));
		for i in 0..HEADER_DIFAT {
			header.extend(self.u32(if i < geometry.sat_count { i as u32 } else { FREE_SECTOR }));
		}
		assert_eq!(header.len(), 512);
		header
	}

	fn directory_entry(&self, name: &str, entry_type: u8, right: u32, child: u32, first_sector: u32, size: u64) -> Vec<u8> {
		let mut entry: Vec<u8> = name.encode_utf16().flat_map(|u| self.u16(u)).collect();
		let name_length = if name.is_empty() { 0 } else { entry.len() as u16 + 2 };
		entry.resize(64, 0);
		entry.extend(self.u16(name_length));
		entry.push(entry_type);
		entry.push(1);
		entry.extend(self.u32(NO_STREAM));
		entry.extend(self.u32(right));
		entry.extend(self.u32(child));
		entry.extend_from_slice(&[0; 16]);
		entry.extend(self.u32(0));
		entry.extend(self.u64(0));
		entry.extend(self.u64(0));
		entry.extend(self.u32(first_sector));
		if self.sector_shift == 12 {
			entry.extend(self.u64(size));
		}
		else {
			entry.extend(self.u32(size as u32));
			entry.extend(self.u32(0));
		}
		assert_eq!(entry.len(), 128);
		entry
	}
}

struct Geometry {
	sat_count: usize,
	difat_count: usize,
	first_directory: u32,
	directory_count: usize,
	first_minisat: Option<u32>,
	minisat_count: usize,
}

/// The number of SAT and DIFAT sectors needed to describe `data_count` other sectors.
fn table_sectors(data_count: usize, per_sector: usize) -> (usize, usize) {
	let mut sat_count = 1;
	loop {
		let difat_count = if sat_count > HEADER_DIFAT { sectors_for(sat_count - HEADER_DIFAT, per_sector - 1) } else { 0 };
		if sat_count * per_sector >= data_count + sat_count + difat_count {
			return (sat_count, difat_count);
		}
		sat_count += 1;
	}
}

fn contiguous(sat: &mut Vec<u32>, count: usize) -> Vec<u32> {
	let first = sat.len() as u32;
	for k in 0..count as u32 {
		sat.push(if k + 1 == count as u32 { END_OF_CHAIN } else { first + k + 1 });
	}
	(first..first + count as u32).collect()
}

fn backwards(sat: &mut Vec<u32>, count: usize) -> Vec<u32> {
	let first = sat.len();
	sat.resize(first + count, END_OF_CHAIN);
	let chain: Vec<u32> = (first..first + count).rev().map(|s| s as u32).collect();
	for pair in chain.windows(2) {
		sat[pair[0] as usize] = pair[1];
	}
	chain
}

/// A `Catalog` stream listing `(id, filetime, name)` records.
pub fn catalog_stream(records: &[(u32, u64, &str)]) -> Vec<u8> {
	let mut data = le16(16);
	data.extend(le16(5));
	data.extend(le32(records.len() as u32));
	data.extend(le32(96));
	data.extend(le32(96));
	for &(id, timestamp, name) in records {
		let name = utf16(name);
		data.extend(le32(20 + name.len() as u32));
		data.extend(le32(id));
		data.extend(le64(timestamp));
		data.extend(name);
		data.extend(le32(0));
	}
	data
}

pub fn jpeg(body: &[u8]) -> Vec<u8> {
	let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
	jpeg.extend_from_slice(body);
	jpeg.extend_from_slice(&[0xFF, 0xD9]);
	jpeg
}

/// A real baseline JPEG cut at its frame marker, as a Type 1 thumbnail stores it, together
/// with support resources holding everything in front of the frame.
pub fn jpeg_fragment(width: u32, height: u32) -> (JpegSupport, Vec<u8>) {
	let pixels = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 16) as u8, (y * 32) as u8, 200]));
	let mut encoded = Vec::new();
	image::DynamicImage::ImageRgb8(pixels).write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg).unwrap();
	let start = encoded.windows(2).position(|w| w == [0xFF, 0xC0]).unwrap();
	let support = JpegSupport { header: encoded[..start].to_vec(), quantization: Vec::new(), huffman: Vec::new() };
	(support, encoded[start..].to_vec())
}

/// A "Type 2" image stream wrapping a complete JPEG.
pub fn full_image_stream(jpeg: &[u8]) -> Vec<u8> {
	let mut data = le32(12);
	data.extend(le32(2));
	data.extend(le16(jpeg.len() as u16));
	data.extend(le16(0));
	data.extend_from_slice(jpeg);
	data
}

/// A "Type 1" image stream holding only the frame.
pub fn fragment_image_stream(frame: &[u8]) -> Vec<u8> {
	let mut data = le32(12);
	data.extend(le32(1));
	data.extend(le16(16 + frame.len() as u16));
	data.extend(le16(0));
	data.extend(le32(1));
	data.extend(le16(frame.len() as u16));
	data.extend_from_slice(&[0; 10]);
	data.extend_from_slice(frame);
	data
}

/// A Windows 7 CMMM file with one cache entry per `(id, data)` pair.
pub fn cmmm_win7(entries: &[(&str, &[u8])]) -> Vec<u8> {
	let mut file = b"CMMM".to_vec();
	file.extend(le32(0x15));
	file.extend(le32(1));
	file.extend(le32(24));
	file.extend(le32(0));
	file.extend(le32(entries.len() as u32));
	for &(id, data) in entries {
		let id = utf16(id);
		file.extend_from_slice(b"CMMM");
		file.extend(le32((48 + id.len() + data.len()) as u32));
		file.extend(le64(0x0102030405060708));
		file.extend(le32(id.len() as u32));
		file.extend(le32(0));
		file.extend(le32(data.len() as u32));
		file.extend(le32(0));
		file.extend(le64(0));
		file.extend(le64(0));
		file.extend(id);
		file.extend_from_slice(data);
	}
	file
}

/// A Windows 7 IMMM file; every record is `(hash, flags, [offsets for 32, 96, 256, 1024, sr])`.
pub fn immm_win7(prefix: bool, records: &[(u64, u32, [u32; 5])]) -> Vec<u8> {
	let mut file = if prefix { vec![0x0C, 0x00, 0x30, 0x20] } else { Vec::new() };
	file.extend_from_slice(b"IMMM");
	file.extend(le32(0x15));
	file.extend(le32(0));
	file.extend(le32(records.len() as u32));
	file.extend(le32(records.len() as u32));
	file.extend(le32(records.len() as u32));
	for &(hash, flags, offsets) in records {
		file.extend(le64(hash));
		file.extend(le32(flags));
		for &offset in offsets.iter() {
			file.extend(le32(offset));
		}
	}
	file
}
