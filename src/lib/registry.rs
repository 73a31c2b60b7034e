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

//! Bookkeeping of recovered thumbnails: which output names were handed out per
//! thumbnail key, and which catalog records (timestamp, original name) belong to it.

use std::cmp::max;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use super::error::{ParseError, Result};

/// Identifier of a thumbnail: a legacy numeric stream id or a hash-like string id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamKey {
	Numeric(u32),
	Named(String),
}

impl StreamKey {
	/// Interprets a Thumbs.db stream name. Legacy streams are named by their id with the
	/// decimal digits reversed ("01" is stream 10), and never exceed three digits.
	pub fn from_stream_name(name: &str) -> StreamKey {
		if !name.is_empty() && name.len() <= 3 && name.bytes().all(|b| b.is_ascii_digit()) {
			let reversed: String = name.chars().rev().collect();
			if let Ok(id) = reversed.parse::<u32>() {
				return StreamKey::Numeric(id);
			}
		}
		StreamKey::Named(name.to_owned())
	}

	/// The clean output file name (without suffix or extension) for this key.
	pub fn base_name(&self) -> String {
		match self {
			StreamKey::Numeric(id) => id.to_string(),
			StreamKey::Named(name) => clean_name(name),
		}
	}
}

impl fmt::Display for StreamKey {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			StreamKey::Numeric(id) => f.pad(&id.to_string()),
			StreamKey::Named(name) => f.pad(name),
		}
	}
}

/// Replaces characters that are not allowed in file names.
pub fn clean_name(name: &str) -> String {
	name.chars()
		.map(|c| match c {
			'\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
			c => c,
		})
		.collect()
}

/// One output file handed out for a key. An empty name marks a thumbnail that was not extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamFile {
	pub name: String,
	pub extension: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
	pub files: Vec<StreamFile>,
}

impl StreamInfo {
	pub fn extensions(&self) -> BTreeSet<&str> {
		self.files.iter().map(|f| f.extension.as_str()).collect()
	}

	pub fn names(&self) -> Vec<&str> {
		self.files.iter().map(|f| f.name.as_str()).collect()
	}

	/// The first file actually written for this key.
	pub fn first_extracted(&self) -> Option<&StreamFile> {
		self.files.iter().find(|f| !f.name.is_empty())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
	pub timestamp: String,
	pub name: String,
}

/// Tracks whether numeric keys arrive as 1, 2, 3, ...
#[derive(Clone, Debug, Default)]
struct Sequence {
	last: Option<u32>,
	broken: bool,
}

impl Sequence {
	fn push(&mut self, key: &StreamKey) {
		if let StreamKey::Numeric(id) = *key {
			if let Some(last) = self.last {
				if last.checked_add(1) != Some(id) {
					self.broken = true;
				}
			}
			self.last = Some(id);
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct StreamTable {
	entries: BTreeMap<StreamKey, StreamInfo>,
	sequence: Sequence,
}

impl StreamTable {
	fn entry(&mut self, key: &StreamKey) -> &mut StreamInfo {
		if !self.entries.contains_key(key) {
			self.sequence.push(key);
		}
		self.entries.entry(key.clone()).or_insert_with(StreamInfo::default)
	}

	pub fn get(&self, key: &StreamKey) -> Option<&StreamInfo> {
		self.entries.get(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&StreamKey, &StreamInfo)> {
		self.entries.iter()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn contains(&self, key: &StreamKey) -> bool {
		self.entries.contains_key(key)
	}

	pub fn out_of_sequence(&self) -> bool {
		self.sequence.broken
	}

	pub fn remove(&mut self, key: &StreamKey) -> Option<StreamInfo> {
		self.entries.remove(key)
	}
}

#[derive(Clone, Debug, Default)]
pub struct CatalogTable {
	entries: BTreeMap<StreamKey, Vec<CatalogEntry>>,
	sequence: Sequence,
}

impl CatalogTable {
	/// Appends a record; a key may carry several.
	pub fn add(&mut self, key: StreamKey, timestamp: String, name: String) {
		if !self.entries.contains_key(&key) {
			self.sequence.push(&key);
		}
		self.entries.entry(key).or_insert_with(Vec::new).push(CatalogEntry { timestamp, name });
	}

	pub fn get(&self, key: &StreamKey) -> Option<&Vec<CatalogEntry>> {
		self.entries.get(key)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&StreamKey, &Vec<CatalogEntry>)> {
		self.entries.iter()
	}

	pub fn keys(&self) -> impl Iterator<Item = &StreamKey> {
		self.entries.keys()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn out_of_sequence(&self) -> bool {
		self.sequence.broken
	}
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ExtractionStats {
	pub extracted: usize,
	pub unextracted: usize,
}

/// Stream and catalog bookkeeping for one container.
#[derive(Clone, Debug, Default)]
pub struct NameRegistry {
	pub streams: StreamTable,
	pub catalog: CatalogTable,
	/// Every name handed out so far, across all keys.
	assigned: BTreeSet<String>,
}

impl NameRegistry {
	pub fn new() -> NameRegistry {
		NameRegistry::default()
	}

	/// Hands out the next free output name for `key`: the base name first, then
	/// `base_1`, `base_2`, ... counting up from the highest suffix handed out so far.
	/// Names already given to another key (two ids that clean to the same text) are skipped.
	pub fn assign_stream_name(&mut self, key: &StreamKey, extension: &str) -> Result<String> {
		let name = self.next_stream_name(key)?;
		self.assigned.insert(name.clone());
		self.streams.entry(key).files.push(StreamFile { name: name.clone(), extension: extension.to_owned() });
		Ok(name)
	}

	/// The name `assign_stream_name` would hand out next, without recording it.
	pub fn next_stream_name(&self, key: &StreamKey) -> Result<String> {
		let base = key.base_name();
		let mut suffix = match self.streams.get(key) {
			Some(info) => next_suffix(&base, &info.files)?,
			None => 0,
		};
		loop {
			let name = if suffix == 0 { base.clone() } else { format!("{}_{}", base, suffix) };
			if !self.assigned.contains(&name) {
				return Ok(name);
			}
			suffix += 1;
		}
	}

	/// Records a thumbnail that was found but not written out.
	pub fn mark_unextracted(&mut self, key: &StreamKey, extension: &str) {
		self.streams.entry(key).files.push(StreamFile { name: String::new(), extension: extension.to_owned() });
	}

	pub fn add_catalog_entry(&mut self, key: StreamKey, timestamp: String, name: String) {
		self.catalog.add(key, timestamp, name);
	}

	/// Catalog keys without any thumbnail.
	pub fn orphan_catalog_entries(&self) -> Vec<&StreamKey> {
		self.catalog.keys().filter(|k| !self.streams.contains(k)).collect()
	}

	pub fn extraction_stats(&self) -> Option<ExtractionStats> {
		if self.streams.is_empty() {
			return None;
		}
		let (extracted, unextracted) = self.streams.iter()
			.flat_map(|(_, info)| info.files.iter())
			.fold((0, 0), |(e, u), f| if f.name.is_empty() { (e, u + 1) } else { (e + 1, u) });
		Some(ExtractionStats { extracted, unextracted })
	}

	/// Total number of files recorded across all keys.
	pub fn total_entries(&self) -> usize {
		self.streams.iter().map(|(_, info)| info.files.len()).sum()
	}

	pub fn catalog_matches_streams(&self) -> bool {
		self.catalog.len() == self.streams.len()
	}
}

/// The suffix following the highest one in `files`; 0 stands for the bare base name.
fn next_suffix(base: &str, files: &[StreamFile]) -> Result<u32> {
	let mut highest: Option<u32> = None;
	for file in files.iter().filter(|f| !f.name.is_empty()) {
		let suffix = if file.name == base {
			0
		}
		else {
			file.name
				.strip_prefix(base)
				.and_then(|rest| rest.strip_prefix('_'))
				.and_then(|digits| digits.parse::<u32>().ok())
				.ok_or_else(|| ParseError::InvalidStreamName(file.name.clone()))?
		};
		highest = Some(highest.map_or(suffix, |h| max(h, suffix)));
	}
	Ok(highest.map_or(0, |h| h + 1))
}
