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

// Also see: [MS-CFB]: Compound File Binary File Format specifications, https://msdn.microsoft.com/en-us/library/dd942138.aspx

use super::super::io::Endian;

pub const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// Signature written by pre-release versions of the format.
pub const OLE_BETA_SIGNATURE: [u8; 8] = [0x0E, 0x11, 0xFC, 0x0D, 0xD0, 0xCF, 0x11, 0xE0];

pub const FREE_SECTOR: u32 = 0xFFFFFFFF;
pub const END_OF_CHAIN: u32 = 0xFFFFFFFE;
pub const SAT_SECTOR: u32 = 0xFFFFFFFD;
pub const DISAT_SECTOR: u32 = 0xFFFFFFFC;
pub const NO_STREAM: u32 = 0xFFFFFFFF;

pub const HEADER_SIZE: u64 = 512;
pub const HEADER_DIFAT_ENTRIES: usize = 109;
pub const DIRECTORY_ENTRY_SIZE: usize = 128;
/// Streams smaller than this live in the mini stream.
pub const MINI_STREAM_CUTOFF: u64 = 4096;

/// The header of a CFBF file, including the 109 DIFAT entries it carries.
#[derive(Clone, Debug)]
pub struct Header {
	pub signature: [u8; 8],
	pub minor_version: u16,
	pub major_version: u16,
	pub endian: Endian,
	pub sector_shift: u16,
	pub sector_size: u64, // virtual field; not actually contained in CFBF file
	pub mini_sector_shift: u16,
	pub mini_sector_size: u64, // virtual field; not actually contained in CFBF file
	pub number_of_directory_sectors: u32,
	pub number_of_sat_sectors: u32,
	pub first_directory_sector: u32,
	pub mini_stream_cutoff_size: u32,
	pub first_minisat_sector: u32,
	pub number_of_minisat_sectors: u32,
	pub first_difat_sector: u32,
	pub number_of_difat_sectors: u32,
	pub difat: Vec<u32>,
}

impl Header {
	pub fn is_beta(&self) -> bool {
		self.signature == OLE_BETA_SIGNATURE
	}
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EntryType {
	Empty,
	Storage,
	Stream,
	LockBytes,
	Property,
	Root,
	Unknown(u8),
}

impl From<u8> for EntryType {
	fn from(value: u8) -> EntryType {
		match value {
			0 => EntryType::Empty,
			1 => EntryType::Storage,
			2 => EntryType::Stream,
			3 => EntryType::LockBytes,
			4 => EntryType::Property,
			5 => EntryType::Root,
			other => EntryType::Unknown(other),
		}
	}
}

/// One 128-byte directory entry.
#[derive(Clone, Debug)]
pub struct DirectoryEntry {
	pub id: u32,
	pub name: String,
	/// Length of the UTF-16 name in bytes, including the terminating NUL.
	pub name_length: u16,
	pub entry_type: EntryType,
	/// Red-black tree color: 0 red, 1 black.
	pub color: u8,
	pub left_sibling_id: u32,
	pub right_sibling_id: u32,
	pub child_id: u32,
	pub class_id: [u8; 16],
	pub user_flags: u32,
	pub creation_time: u64,
	pub modified_time: u64,
	/// For streams the first data sector; for the root entry the first sector of the mini stream.
	pub first_sector: u32,
	pub stream_size: u64,
}

impl DirectoryEntry {
	pub fn is_mini_resident(&self) -> bool {
		self.entry_type == EntryType::Stream && self.stream_size < MINI_STREAM_CUTOFF
	}
}
