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

//! Lookup of original file names in the Windows Search index.
//!
//! The index itself is an ESE database read by external tooling; this module consumes
//! records by binary key only. `ExportedIndex` loads a tab-separated export of it with the
//! columns `key_hex, mime, content_type, item_type, url, modified_filetime, size`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use super::error::{ParseError, Result};

/// The fields of an index record this crate cares about.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuxRecord {
	pub mime_type: Option<String>,
	pub content_type: Option<String>,
	pub item_type: Option<String>,
	pub url: Option<String>,
	pub modified: Option<u64>,
	pub size: Option<u64>,
}

impl AuxRecord {
	/// Whether the record describes an image file.
	pub fn is_image(&self) -> bool {
		let types = [&self.mime_type, &self.content_type, &self.item_type];
		types.iter().any(|t| match t {
			Some(value) => {
				let value = value.to_lowercase();
				value.starts_with("image") || value.contains("picture")
			},
			None => false,
		})
	}

	/// The last path component of the record's URL.
	pub fn original_name(&self) -> Option<String> {
		let url = self.url.as_ref()?;
		url.rsplit(|c: char| c == '/' || c == '\\')
			.find(|part| !part.is_empty())
			.map(|part| part.to_owned())
	}
}

pub trait AuxIndex {
	fn lookup(&self, key: &[u8]) -> Option<AuxRecord>;
}

/// Binary key of a thumbcache id: the little-endian bytes of its 64-bit hex value.
pub fn cache_id_key(id: &str) -> Option<[u8; 8]> {
	let trimmed = id.trim_start_matches("0x");
	if trimmed.is_empty() || trimmed.len() > 16 {
		return None;
	}
	u64::from_str_radix(trimmed, 16).ok().map(|v| v.to_le_bytes())
}

/// An in-memory index loaded from an export file.
#[derive(Debug, Default)]
pub struct ExportedIndex {
	records: HashMap<Vec<u8>, AuxRecord>,
}

impl ExportedIndex {
	pub fn open(path: &Path) -> Result<ExportedIndex> {
		let file = File::open(path)
			.map_err(|e| ParseError::AuxIndexUnavailable(format!("{}: {}", path.display(), e)))?;
		ExportedIndex::from_reader(file)
	}

	pub fn parse(text: &str) -> Result<ExportedIndex> {
		ExportedIndex::from_reader(text.as_bytes())
	}

	/// Reads tab-separated rows; `#` starts a comment line and trailing empty cells may be left out.
	pub fn from_reader<R: Read>(input: R) -> Result<ExportedIndex> {
		let mut reader = csv::ReaderBuilder::new()
			.delimiter(b'\t')
			.has_headers(false)
			.comment(Some(b'#'))
			.flexible(true)
			.trim(csv::Trim::All)
			.from_reader(input);

		let mut records = HashMap::new();
		for row in reader.records() {
			let row = row.map_err(|e| ParseError::AuxIndexUnavailable(format!("{}", e)))?;
			let line = row.position().map_or(0, |p| p.line());
			let key_cell = row.get(0).unwrap_or("");
			if row.len() == 1 && key_cell.is_empty() {
				continue;
			}
			let key = decode_hex(key_cell)
				.ok_or_else(|| ParseError::AuxIndexUnavailable(format!("line {}: bad key '{}'", line, key_cell)))?;
			let cell = |i: usize| row.get(i).filter(|c| !c.is_empty());
			let number_cell = |i: usize| -> Result<Option<u64>> {
				match cell(i) {
					Some(value) => value.parse::<u64>()
						.map(Some)
						.map_err(|_| ParseError::AuxIndexUnavailable(format!("line {}: '{}' is not a number", line, value))),
					None => Ok(None),
				}
			};
			let record = AuxRecord {
				mime_type: cell(1).map(String::from),
				content_type: cell(2).map(String::from),
				item_type: cell(3).map(String::from),
				url: cell(4).map(String::from),
				modified: number_cell(5)?,
				size: number_cell(6)?,
			};
			records.insert(key, record);
		}
		Ok(ExportedIndex { records })
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

impl AuxIndex for ExportedIndex {
	fn lookup(&self, key: &[u8]) -> Option<AuxRecord> {
		self.records.get(key).cloned()
	}
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
	if text.is_empty() || text.len() % 2 != 0 {
		return None;
	}
	(0..text.len())
		.step_by(2)
		.map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
		.collect()
}
