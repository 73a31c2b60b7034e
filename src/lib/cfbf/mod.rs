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

pub mod structures;

use self::structures::*;
use std::cmp::min;
use std::io::{Read, Seek};
use super::error::{ParseError, Result};
use super::io::{ByteCursor, Debug, Endian, decode_utf16};

/// A parsed compound file: header, allocation tables and the flat directory.
///
/// The SAT and Mini-SAT are loaded once in `new` and never change afterwards.
pub struct Container<TFile: Read + Seek> {
	file: ByteCursor<TFile>,
	header: Header,
	sat: Vec<u32>,
	minisat: Vec<u32>,
	/// Regular sectors holding the mini stream, in chain order.
	ministream_sectors: Vec<u32>,
	entries: Vec<DirectoryEntry>,
}

impl<TFile> Container<TFile> where TFile: Read + Seek {
	pub fn new(file: TFile, file_size: u64, debug: &mut Debug) -> Result<Container<TFile>> {
		if file_size < HEADER_SIZE {
			return Err(ParseError::TooSmall { size: file_size, minimum: HEADER_SIZE });
		}
		let mut file = ByteCursor::new(file, file_size);

		debug.log(1, format!("[new] Reading CFBF file header (512 bytes) ... "));
		let mut buffer = [0u8; HEADER_SIZE as usize];
		file.seek(0)?;
		file.read_into(&mut buffer)?;
		debug.logln(1, format!("OK."));
		let header = read_header(&buffer, debug)?;
		file.endian = header.endian;

		let mut container = Container {
			file,
			header,
			sat: Vec::new(),
			minisat: Vec::new(),
			ministream_sectors: Vec::new(),
			entries: Vec::new(),
		};
		container.load_sat(debug)?;
		container.load_minisat(debug)?;
		container.load_directory(debug)?;
		container.locate_ministream(debug)?;
		Ok(container)
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn sat(&self) -> &[u32] {
		&self.sat
	}

	pub fn minisat(&self) -> &[u32] {
		&self.minisat
	}

	pub fn entries(&self) -> &[DirectoryEntry] {
		&self.entries
	}

	pub fn root(&self) -> Option<&DirectoryEntry> {
		self.entries.iter().find(|e| e.entry_type == EntryType::Root)
	}

	/// Reads the full content of a stream (or of the mini stream, for the root entry).
	pub fn read_stream(&mut self, entry: &DirectoryEntry, debug: &mut Debug) -> Result<Vec<u8>> {
		match entry.entry_type {
			EntryType::Root => self.read_stream_normal(entry, debug),
			EntryType::Stream =>
				if entry.stream_size == 0 {
					Ok(Vec::new())
				}
				else if entry.is_mini_resident() {
					self.read_stream_mini(entry, debug)
				}
				else {
					self.read_stream_normal(entry, debug)
				},
			_ => Err(ParseError::EntryFormat(format!("directory entry #{} '{}' is not a stream", entry.id, entry.name))),
		}
	}

	fn read_stream_normal(&mut self, entry: &DirectoryEntry, debug: &mut Debug) -> Result<Vec<u8>> {
		debug.logln(2, format!("[read_stream_normal] Reading stream #{} from sectors ({} bytes) ...", entry.id, entry.stream_size));
		if entry.stream_size == 0 {
			return Ok(Vec::new());
		}
		let chain = follow_chain(&self.sat, entry.first_sector, "SAT")?;
		let sector_size = self.header.sector_size;
		if (chain.len() as u64) * sector_size < entry.stream_size {
			return Err(ParseError::ChainIntegrity(format!("stream #{} declares {} bytes but its chain only holds {} sectors", entry.id, entry.stream_size, chain.len())));
		}

		let mut data = Vec::with_capacity(entry.stream_size as usize);
		let mut size_remaining = entry.stream_size;
		for sector in chain {
			if size_remaining == 0 {
				break;
			}
			let num_bytes = min(sector_size, size_remaining);
			debug.logln(3, format!("[read_stream_normal] Copying {} bytes from sector #{} ...", num_bytes, sector));
			let bytes = self.read_sector_bytes(sector, 0, num_bytes)?;
			data.extend_from_slice(&bytes);
			size_remaining -= num_bytes;
		}
		Ok(data)
	}

	fn read_stream_mini(&mut self, entry: &DirectoryEntry, debug: &mut Debug) -> Result<Vec<u8>> {
		debug.logln(2, format!("[read_stream_mini] Reading stream #{} from mini stream ({} bytes) ...", entry.id, entry.stream_size));
		let chain = follow_chain(&self.minisat, entry.first_sector, "Mini-SAT")?;
		let mini_sector_size = self.header.mini_sector_size;
		if (chain.len() as u64) * mini_sector_size < entry.stream_size {
			return Err(ParseError::ChainIntegrity(format!("stream #{} declares {} bytes but its mini chain only holds {} mini-sectors", entry.id, entry.stream_size, chain.len())));
		}

		let per_sector = self.header.sector_size / mini_sector_size;
		let mut data = Vec::with_capacity(entry.stream_size as usize);
		let mut size_remaining = entry.stream_size;
		for minisector in chain {
			if size_remaining == 0 {
				break;
			}
			// Translate the mini-sector into a sector of the mini stream and an offset inside it
			let index = (minisector as u64 / per_sector) as usize;
			let offset = (minisector as u64 % per_sector) * mini_sector_size;
			let sector = match self.ministream_sectors.get(index) {
				Some(&sector) => sector,
				None => return Err(ParseError::ChainIntegrity(format!("mini-sector #{} lies beyond the {}-sector mini stream", minisector, self.ministream_sectors.len()))),
			};
			let num_bytes = min(mini_sector_size, size_remaining);
			debug.logln(3, format!("[read_stream_mini] Copying {} bytes from mini-sector #{} (sector #{}, offset {:#X}) ...", num_bytes, minisector, sector, offset));
			let bytes = self.read_sector_bytes(sector, offset, num_bytes)?;
			data.extend_from_slice(&bytes);
			size_remaining -= num_bytes;
		}
		Ok(data)
	}

	/// Loads the SAT from the sectors listed in the header DIFAT and the DIFAT sector chain.
	fn load_sat(&mut self, debug: &mut Debug) -> Result<()> {
		let wanted = self.header.number_of_sat_sectors as usize;
		debug.logln(1, format!("[load_sat] Loading SAT ({} sectors) ...", wanted));
		let mut sat_sectors: Vec<u32> = self.header.difat.iter().cloned().take(min(wanted, HEADER_DIFAT_ENTRIES)).collect();

		if wanted > HEADER_DIFAT_ENTRIES {
			let entries_per_sector = (self.header.sector_size / 4) as usize - 1;
			let mut current = self.header.first_difat_sector;
			let mut visited: Vec<u32> = Vec::new();
			for _ in 0..self.header.number_of_difat_sectors {
				if current == END_OF_CHAIN || current == FREE_SECTOR || sat_sectors.len() >= wanted {
					break;
				}
				if visited.contains(&current) {
					return Err(ParseError::ChainIntegrity(format!("DIFAT chain loops back to sector {}", current)));
				}
				visited.push(current);
				debug.logln(3, format!("[load_sat] Reading DIFAT sector #{} ...", current));
				let sector = self.read_sector(current)?;
				let endian = self.header.endian;
				for i in 0..entries_per_sector {
					if sat_sectors.len() >= wanted {
						break;
					}
					sat_sectors.push(endian.u32(&sector, i * 4)?);
				}
				current = endian.u32(&sector, entries_per_sector * 4)?;
			}
			if sat_sectors.len() < wanted {
				debug.warn(format!("DIFAT only lists {} of {} SAT sectors", sat_sectors.len(), wanted));
			}
		}

		for sat_sector in sat_sectors {
			debug.logln(3, format!("[load_sat] Reading SAT sector #{} ...", sat_sector));
			let sector = self.read_sector(sat_sector)?;
			let entries = self.sector_entries(&sector)?;
			self.sat.extend(entries);
		}
		debug.logln(1, format!("[load_sat] SAT holds {} entries.", self.sat.len()));
		Ok(())
	}

	fn load_minisat(&mut self, debug: &mut Debug) -> Result<()> {
		let first = self.header.first_minisat_sector;
		if first == END_OF_CHAIN || first == FREE_SECTOR {
			debug.logln(1, format!("[load_minisat] No Mini-SAT."));
			return Ok(());
		}
		let chain = follow_chain(&self.sat, first, "Mini-SAT sector")?;
		debug.logln(1, format!("[load_minisat] Mini-SAT is stored in sectors {:?}.", chain));
		for minisat_sector in chain {
			let sector = self.read_sector(minisat_sector)?;
			let entries = self.sector_entries(&sector)?;
			self.minisat.extend(entries);
		}
		Ok(())
	}

	fn load_directory(&mut self, debug: &mut Debug) -> Result<()> {
		let chain = follow_chain(&self.sat, self.header.first_directory_sector, "directory")?;
		debug.logln(1, format!("[load_directory] Directory is stored in {} sectors.", chain.len()));
		let per_sector = self.header.sector_size as usize / DIRECTORY_ENTRY_SIZE;
		let mut id = 0u32;
		for directory_sector in chain {
			let sector = self.read_sector(directory_sector)?;
			for slot in 0..per_sector {
				let offset = slot * DIRECTORY_ENTRY_SIZE;
				let entry = read_directory_entry(&sector[offset..offset + DIRECTORY_ENTRY_SIZE], id, self.header.endian, self.header.major_version)?;
				debug.logln(2, format!("[load_directory] Entry #{}: {:?} '{}' ({} bytes from sector {:#X})", id, entry.entry_type, entry.name, entry.stream_size, entry.first_sector));
				self.entries.push(entry);
				id += 1;
			}
		}
		Ok(())
	}

	/// Collects the sectors of the mini stream, whose start is kept in the root entry.
	fn locate_ministream(&mut self, debug: &mut Debug) -> Result<()> {
		let (first_sector, stream_size) = match self.entries.first() {
			Some(entry) if entry.entry_type == EntryType::Root => (entry.first_sector, entry.stream_size),
			_ => match self.root() {
				Some(entry) => {
					debug.warn(format!("Root entry is not the first directory entry"));
					(entry.first_sector, entry.stream_size)
				},
				None => {
					debug.warn(format!("No root entry; mini streams cannot be read"));
					return Ok(());
				},
			},
		};
		if stream_size == 0 {
			return Ok(());
		}
		self.ministream_sectors = follow_chain(&self.sat, first_sector, "mini stream")?;
		debug.logln(1, format!("[locate_ministream] Mini stream spans {} sectors.", self.ministream_sectors.len()));
		Ok(())
	}

	/// Decodes a sector into its 32-bit table entries.
	fn sector_entries(&self, sector: &[u8]) -> Result<Vec<u32>> {
		let endian = self.header.endian;
		(0..sector.len() / 4).map(|i| endian.u32(sector, i * 4)).collect()
	}

	fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>> {
		let size = self.header.sector_size;
		self.read_sector_bytes(sector, 0, size)
	}

	/// Reads `count` bytes at `offset` inside a sector. A final sector cut short by the end of
	/// the file is padded with zeros.
	fn read_sector_bytes(&mut self, sector: u32, offset: u64, count: u64) -> Result<Vec<u8>> {
		let position = (sector as u64 + 1) * self.header.sector_size + offset;
		if position >= self.file.size() {
			return Err(ParseError::ChainIntegrity(format!("sector #{} lies beyond the end of the file", sector)));
		}
		self.file.seek(position)?;
		let available = min(count, self.file.remaining());
		let mut bytes = self.file.read_bytes(available)?;
		bytes.resize(count as usize, 0);
		Ok(bytes)
	}
}

/// Follows a chain through an allocation table, returning the sectors in chain order.
/// Pointers outside the table and chains that revisit a sector are rejected.
pub fn follow_chain(table: &[u32], start: u32, what: &str) -> Result<Vec<u32>> {
	let mut chain = Vec::new();
	let mut visited = vec![false; table.len()];
	let mut current = start;
	while current != END_OF_CHAIN {
		let index = current as usize;
		if index >= table.len() {
			return Err(ParseError::ChainIntegrity(format!("{} chain points to {:#X}, outside of the {}-entry table", what, current, table.len())));
		}
		if visited[index] {
			return Err(ParseError::ChainIntegrity(format!("{} chain loops back to sector {}", what, current)));
		}
		visited[index] = true;
		chain.push(current);
		current = table[index];
	}
	Ok(chain)
}

fn read_header(buffer: &[u8], debug: &mut Debug) -> Result<Header> {
	let mut signature = [0u8; 8];
	signature.copy_from_slice(&buffer[0..8]);
	if signature != OLE_SIGNATURE && signature != OLE_BETA_SIGNATURE {
		return Err(ParseError::HeaderSignature(hex(&signature)));
	}
	if signature == OLE_BETA_SIGNATURE {
		debug.info(format!("Compound file carries the pre-release signature"));
	}

	// The marker is written as FE FF by little-endian producers
	let endian = match u16::from_be_bytes([buffer[28], buffer[29]]) {
		0xFFFE => Endian::Big,
		0xFEFF => Endian::Little,
		other => {
			debug.warn(format!("Unknown byte order marker {:#06X}, assuming little endian", other));
			Endian::Little
		},
	};
	debug.logln(1, format!("[read_header] Byte order is {:?}.", endian));

	// skip CLSID (16 bytes)
	let minor_version = endian.u16(buffer, 24)?;
	let major_version = endian.u16(buffer, 26)?;
	let mut sector_shift = endian.u16(buffer, 30)?;
	if sector_shift != 9 && sector_shift != 12 {
		debug.warn(format!("Unusual sector shift {}, using 512-byte sectors", sector_shift));
		sector_shift = 9;
	}
	let mut mini_sector_shift = endian.u16(buffer, 32)?;
	if mini_sector_shift != 6 {
		debug.warn(format!("Unusual mini-sector shift {}, using 64-byte mini-sectors", mini_sector_shift));
		mini_sector_shift = 6;
	}
	// skip reserved (6 bytes)
	let number_of_directory_sectors = endian.u32(buffer, 40)?;
	let number_of_sat_sectors = endian.u32(buffer, 44)?;
	let first_directory_sector = endian.u32(buffer, 48)?;
	// skip transaction signature number (4 bytes)
	let mini_stream_cutoff_size = endian.u32(buffer, 56)?;
	let first_minisat_sector = endian.u32(buffer, 60)?;
	let number_of_minisat_sectors = endian.u32(buffer, 64)?;
	let first_difat_sector = endian.u32(buffer, 68)?;
	let number_of_difat_sectors = endian.u32(buffer, 72)?;
	let difat = (0..HEADER_DIFAT_ENTRIES)
		.map(|i| endian.u32(buffer, 76 + i * 4))
		.collect::<Result<Vec<u32>>>()?;

	if mini_stream_cutoff_size as u64 != MINI_STREAM_CUTOFF {
		debug.warn(format!("Header declares a mini stream cutoff of {} bytes; using {}", mini_stream_cutoff_size, MINI_STREAM_CUTOFF));
	}
	debug.logln(1, format!("[read_header] Version {}.{}, {} SAT sectors, directory at sector {:#X}, Mini-SAT at {:#X}.",
		major_version, minor_version, number_of_sat_sectors, first_directory_sector, first_minisat_sector));

	Ok(Header {
		signature,
		minor_version,
		major_version,
		endian,
		sector_shift,
		sector_size: 1 << sector_shift,
		mini_sector_shift,
		mini_sector_size: 1 << mini_sector_shift,
		number_of_directory_sectors,
		number_of_sat_sectors,
		first_directory_sector,
		mini_stream_cutoff_size,
		first_minisat_sector,
		number_of_minisat_sectors,
		first_difat_sector,
		number_of_difat_sectors,
		difat,
	})
}

fn read_directory_entry(buffer: &[u8], id: u32, endian: Endian, major_version: u16) -> Result<DirectoryEntry> {
	let name_length = endian.u16(buffer, 64)?;
	// The length is expressed in bytes and includes the trailing NUL
	let name_bytes = min(name_length as usize, 64);
	let name = decode_utf16(&buffer[0..name_bytes], endian);
	let mut class_id = [0u8; 16];
	class_id.copy_from_slice(&buffer[80..96]);
	// Version 3 files only use the low 32 bits of the size
	let stream_size = if major_version >= 4 { endian.u64(buffer, 120)? } else { endian.u32(buffer, 120)? as u64 };

	Ok(DirectoryEntry {
		id,
		name,
		name_length,
		entry_type: EntryType::from(buffer[66]),
		color: buffer[67],
		left_sibling_id: endian.u32(buffer, 68)?,
		right_sibling_id: endian.u32(buffer, 72)?,
		child_id: endian.u32(buffer, 76)?,
		class_id,
		user_flags: endian.u32(buffer, 96)?,
		creation_time: endian.u64(buffer, 100)?,
		modified_time: endian.u64(buffer, 108)?,
		first_sector: endian.u32(buffer, 116)?,
		stream_size,
	})
}

pub fn hex(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<String>>().join(" ")
}
