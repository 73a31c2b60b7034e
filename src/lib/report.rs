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

use std::io::{self, Write};
use std::path::PathBuf;
use super::immm::{IndexClass, IndexEntry};
use super::io::Debug;
use super::registry::{NameRegistry, StreamKey};
use super::version::Format;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ContainerFormat {
	CompoundFile,
	CompoundFileBeta,
	Cmmm,
	Immm,
}

impl ContainerFormat {
	pub fn description(self) -> &'static str {
		match self {
			ContainerFormat::CompoundFile => "OLE2 compound file (Thumbs.db)",
			ContainerFormat::CompoundFileBeta => "OLE2 compound file, pre-release signature (Thumbs.db)",
			ContainerFormat::Cmmm => "CMMM thumbnail cache",
			ContainerFormat::Immm => "IMMM thumbnail cache index",
		}
	}
}

/// One thumbnail found in a container.
#[derive(Clone, Debug)]
pub struct EntrySummary {
	pub key: StreamKey,
	pub kind: String,
	pub size: u64,
	pub extension: String,
	/// Output name, when the thumbnail was written.
	pub file: Option<String>,
	/// Name recovered from the auxiliary index.
	pub original_name: Option<String>,
}

/// Everything learned from one container file.
#[derive(Debug)]
pub struct ContainerReport {
	pub path: Option<PathBuf>,
	pub file_size: u64,
	pub format: ContainerFormat,
	pub version: Option<Format>,
	pub cache_type: Option<String>,
	pub header: Vec<(&'static str, String)>,
	/// Uninterpreted fields, only shown at full verbosity.
	pub diagnostics: Vec<(&'static str, String)>,
	pub entries: Vec<EntrySummary>,
	pub index_entries: Vec<IndexEntry>,
	pub registry: NameRegistry,
	pub warnings: Vec<String>,
}

impl ContainerReport {
	pub fn new(format: ContainerFormat, file_size: u64) -> ContainerReport {
		ContainerReport {
			path: None,
			file_size,
			format,
			version: None,
			cache_type: None,
			header: Vec::new(),
			diagnostics: Vec::new(),
			entries: Vec::new(),
			index_entries: Vec::new(),
			registry: NameRegistry::new(),
			warnings: Vec::new(),
		}
	}

	/// Logs a warning and keeps it for the report.
	pub fn warn(&mut self, debug: &mut Debug, message: String) {
		debug.warn(message.clone());
		self.warnings.push(message);
	}
}

const RULE: &str = "------------------------------------------------------------";

pub fn write_report(out: &mut dyn Write, report: &ContainerReport, verbosity: i8) -> io::Result<()> {
	writeln!(out, "{}", RULE.replace('-', "="))?;
	if let Some(ref path) = report.path {
		writeln!(out, "File:          {}", path.display())?;
	}
	writeln!(out, "Size:          {} bytes", report.file_size)?;
	writeln!(out, "Format:        {}", report.format.description())?;
	if let Some(format) = report.version {
		writeln!(out, "Version:       {} ({:#X})", format.label(), format.tag)?;
	}
	if let Some(ref cache_type) = report.cache_type {
		writeln!(out, "Cache type:    {}", cache_type)?;
	}
	for (label, value) in &report.header {
		writeln!(out, "{:<14} {}", format!("{}:", label), value)?;
	}
	if verbosity >= 3 {
		for (label, value) in &report.diagnostics {
			writeln!(out, "{:<14} {}", format!("{}:", label), value)?;
		}
	}

	if !report.entries.is_empty() {
		writeln!(out, "{}", RULE)?;
		writeln!(out, "Entries:")?;
		for entry in &report.entries {
			let file = match entry.file {
				Some(ref name) => format!("{}.{}", name, entry.extension),
				None => format!("(not extracted, {})", entry.extension),
			};
			write!(out, "  {:<20} {:<16} {:>9} bytes  {}", entry.key, entry.kind, entry.size, file)?;
			match entry.original_name {
				Some(ref name) => writeln!(out, "  [{}]", name)?,
				None => writeln!(out)?,
			}
		}
	}

	if !report.index_entries.is_empty() {
		writeln!(out, "{}", RULE)?;
		writeln!(out, "Index records:")?;
		for entry in &report.index_entries {
			let shown = match entry.class() {
				IndexClass::Populated => true,
				IndexClass::Unused => verbosity >= 2,
				IndexClass::FullyEmpty => verbosity >= 3,
			};
			if !shown {
				continue;
			}
			write!(out, "  {:016x} flags {:#010X}", entry.hash, entry.flags)?;
			if let Some(filetime) = entry.filetime {
				write!(out, " time {}", super::io::format_filetime(filetime))?;
			}
			for (cache_type, offset) in entry.offsets() {
				write!(out, " {}={:#X}", cache_type, offset)?;
			}
			writeln!(out)?;
		}
		let populated = report.index_entries.iter().filter(|e| e.class() == IndexClass::Populated).count();
		writeln!(out, "  {} of {} records in use", populated, report.index_entries.len())?;
	}

	let registry = &report.registry;
	if !registry.catalog.is_empty() {
		writeln!(out, "{}", RULE)?;
		writeln!(out, "Catalog:")?;
		for (key, entries) in registry.catalog.iter() {
			for entry in entries {
				writeln!(out, "  {:<20} {:<28} {}", key, entry.timestamp, entry.name)?;
			}
		}
	}

	writeln!(out, "{}", RULE)?;
	match registry.extraction_stats() {
		Some(stats) => writeln!(out, "Thumbnails:    {} extracted, {} not extracted", stats.extracted, stats.unextracted)?,
		None => writeln!(out, "Thumbnails:    none")?,
	}
	if registry.streams.out_of_sequence() {
		writeln!(out, "Stream ids are out of sequence")?;
	}
	if registry.catalog.out_of_sequence() {
		writeln!(out, "Catalog ids are out of sequence")?;
	}
	let orphans = registry.orphan_catalog_entries();
	if !orphans.is_empty() {
		let keys: Vec<String> = orphans.iter().map(|k| k.to_string()).collect();
		writeln!(out, "Catalog entries without thumbnail: {}", keys.join(", "))?;
	}
	for warning in &report.warnings {
		writeln!(out, "Warning: {}", warning)?;
	}
	Ok(())
}
