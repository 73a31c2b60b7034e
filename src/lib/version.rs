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

//! On-disk format versions of the `thumbcache_*.db` / `iconcache_*.db` family.
//!
//! Every version-dependent field in the CMMM and IMMM parsers is driven by the
//! `LAYOUTS` table below.

use std::fmt;

/// The Windows release that wrote a CMMM/IMMM file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
	Vista,
	Win7,
	Win8,
	Win8v2,
	Win8v3,
	Win81,
	Win10,
}

/// A thumbnail size class, as used both for CMMM cache types and IMMM offset slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheType {
	Res16,
	Res32,
	Res48,
	Res96,
	Res256,
	Res768,
	Res1024,
	Res1280,
	Res1600,
	Res1920,
	Res2560,
	SR,
	Wide,
	EXIF,
	WideAlternate,
	CustomStream,
}

impl CacheType {
	pub const COUNT: usize = 16;

	pub const ALL: [CacheType; CacheType::COUNT] = [
		CacheType::Res16, CacheType::Res32, CacheType::Res48, CacheType::Res96, CacheType::Res256, CacheType::Res768,
		CacheType::Res1024, CacheType::Res1280, CacheType::Res1600, CacheType::Res1920, CacheType::Res2560,
		CacheType::SR, CacheType::Wide, CacheType::EXIF, CacheType::WideAlternate, CacheType::CustomStream,
	];

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn name(self) -> &'static str {
		match self {
			CacheType::Res16 => "16",
			CacheType::Res32 => "32",
			CacheType::Res48 => "48",
			CacheType::Res96 => "96",
			CacheType::Res256 => "256",
			CacheType::Res768 => "768",
			CacheType::Res1024 => "1024",
			CacheType::Res1280 => "1280",
			CacheType::Res1600 => "1600",
			CacheType::Res1920 => "1920",
			CacheType::Res2560 => "2560",
			CacheType::SR => "sr",
			CacheType::Wide => "wide",
			CacheType::EXIF => "exif",
			CacheType::WideAlternate => "wide_alternate",
			CacheType::CustomStream => "custom_stream",
		}
	}
}

impl fmt::Display for CacheType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Which optional fields a format version carries.
#[derive(Debug)]
pub struct Layout {
	pub version: FormatVersion,
	pub tag: u32,
	pub label: &'static str,
	/// CMMM header: a reserved word precedes the entry offsets.
	pub header_reserved: bool,
	/// CMMM header: the cache entry count is present.
	pub entry_count: bool,
	/// CMMM entry: an 8-byte UTF-16 file extension follows the hash.
	pub stored_extension: bool,
	/// CMMM entry: width and height follow the data size.
	pub dimensions: bool,
	/// IMMM record: a FILETIME follows the hash.
	pub index_filetime: bool,
	/// IMMM header: a block of reserved words follows the entry counters.
	pub index_reserved_words: usize,
	/// Cache type numbering, which is also the order of the IMMM offset slots.
	pub sizes: &'static [CacheType],
}

use self::CacheType::*;

const SIZES_VISTA: &[CacheType] = &[Res32, Res96, Res256, Res1024, SR];
const SIZES_WIN8: &[CacheType] = &[Res16, Res32, Res48, Res96, Res256, Res1024, SR, Wide, EXIF];
const SIZES_WIN81: &[CacheType] = &[Res16, Res32, Res48, Res96, Res256, Res1024, Res1600, SR, Wide, EXIF, WideAlternate];
const SIZES_WIN10: &[CacheType] = &[Res16, Res32, Res48, Res96, Res256, Res768, Res1280, Res1920, Res2560, SR, Wide, EXIF, WideAlternate, CustomStream];

pub static LAYOUTS: [Layout; 7] = [
	Layout { version: FormatVersion::Vista, tag: 0x14, label: "Windows Vista", header_reserved: false, entry_count: true, stored_extension: true, dimensions: false, index_filetime: true, index_reserved_words: 0, sizes: SIZES_VISTA },
	Layout { version: FormatVersion::Win7, tag: 0x15, label: "Windows 7", header_reserved: false, entry_count: true, stored_extension: false, dimensions: false, index_filetime: false, index_reserved_words: 0, sizes: SIZES_VISTA },
	Layout { version: FormatVersion::Win8, tag: 0x1A, label: "Windows 8", header_reserved: true, entry_count: true, stored_extension: false, dimensions: true, index_filetime: false, index_reserved_words: 0, sizes: SIZES_WIN8 },
	Layout { version: FormatVersion::Win8v2, tag: 0x1C, label: "Windows 8v2", header_reserved: true, entry_count: true, stored_extension: false, dimensions: true, index_filetime: false, index_reserved_words: 0, sizes: SIZES_WIN8 },
	Layout { version: FormatVersion::Win8v3, tag: 0x1E, label: "Windows 8v3", header_reserved: true, entry_count: false, stored_extension: false, dimensions: true, index_filetime: false, index_reserved_words: 0, sizes: SIZES_WIN8 },
	// The 1600 slot only exists in this release.
	Layout { version: FormatVersion::Win81, tag: 0x1F, label: "Windows 8.1", header_reserved: true, entry_count: false, stored_extension: false, dimensions: true, index_filetime: false, index_reserved_words: 0, sizes: SIZES_WIN81 },
	Layout { version: FormatVersion::Win10, tag: 0x20, label: "Windows 10", header_reserved: true, entry_count: false, stored_extension: false, dimensions: true, index_filetime: false, index_reserved_words: 29, sizes: SIZES_WIN10 },
];

pub const UNKNOWN_FORMAT: &str = "Unknown Format";
pub const UNKNOWN_TYPE: &str = "Unknown Type";

impl FormatVersion {
	pub fn from_tag(tag: u32) -> Option<FormatVersion> {
		LAYOUTS.iter().find(|l| l.tag == tag).map(|l| l.version)
	}

	pub fn layout(self) -> &'static Layout {
		&LAYOUTS[self as usize]
	}

	pub fn tag(self) -> u32 {
		self.layout().tag
	}

	pub fn label(self) -> &'static str {
		self.layout().label
	}
}

impl fmt::Display for FormatVersion {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.label())
	}
}

/// The format tag read from a file, resolved against the version table.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Format {
	pub tag: u32,
	pub version: Option<FormatVersion>,
}

impl Format {
	pub fn from_tag(tag: u32) -> Format {
		Format { tag, version: FormatVersion::from_tag(tag) }
	}

	pub fn label(&self) -> &'static str {
		self.version.map(FormatVersion::label).unwrap_or(UNKNOWN_FORMAT)
	}

	/// Field layout to parse with. Unknown tags use the newest version below them.
	pub fn layout(&self) -> &'static Layout {
		match self.version {
			Some(version) => version.layout(),
			None => LAYOUTS.iter().rev().find(|l| l.tag < self.tag).unwrap_or(&LAYOUTS[0]),
		}
	}

	pub fn cache_type(&self, index: u32) -> Option<CacheType> {
		self.layout().sizes.get(index as usize).cloned()
	}

	pub fn cache_type_name(&self, index: u32) -> &'static str {
		self.cache_type(index).map(CacheType::name).unwrap_or(UNKNOWN_TYPE)
	}
}
