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

use super::auxindex::AuxIndex;
use super::codec::{FragmentCodec, JpegSupport};
use super::error::{ParseError, Result};
use super::extract::Extractor;
use super::io::Debug;
use super::registry::{NameRegistry, StreamKey};

/// How errors inside a container are escalated.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Policy {
	/// Any error aborts (single file mode).
	Strict,
	/// Broken entries are skipped with a warning (batch modes).
	BestEffort,
}

/// The collaborators shared by all parsers while processing one run.
pub struct Session<'a> {
	pub debug: &'a mut Debug,
	pub policy: Policy,
	pub extractor: Option<Extractor>,
	pub aux_index: Option<&'a dyn AuxIndex>,
	pub codec: Option<(&'a dyn FragmentCodec, &'a JpegSupport)>,
}

impl<'a> Session<'a> {
	pub fn new(debug: &'a mut Debug, policy: Policy) -> Session<'a> {
		Session { debug, policy, extractor: None, aux_index: None, codec: None }
	}

	pub fn with_extractor(mut self, extractor: Extractor) -> Session<'a> {
		self.extractor = Some(extractor);
		self
	}

	pub fn with_aux_index(mut self, aux_index: &'a dyn AuxIndex) -> Session<'a> {
		self.aux_index = Some(aux_index);
		self
	}

	pub fn with_codec(mut self, codec: &'a dyn FragmentCodec, support: &'a JpegSupport) -> Session<'a> {
		self.codec = Some((codec, support));
		self
	}

	/// Applies the escalation policy to an error raised for a single entry.
	pub fn entry_failed(&mut self, entry: &str, error: ParseError) -> Result<()> {
		match self.policy {
			Policy::Strict => Err(error),
			Policy::BestEffort => {
				self.debug.warn(format!("Skipping entry '{}': {}", entry, error));
				Ok(())
			},
		}
	}

	/// Writes a thumbnail out (when extracting) and records it in the registry.
	/// Returns the assigned name, or `None` when nothing was written.
	pub fn store(&mut self, registry: &mut NameRegistry, key: &StreamKey, extension: &str, data: &[u8]) -> Result<Option<String>> {
		let extractor = match &self.extractor {
			Some(extractor) if !data.is_empty() => extractor,
			_ => {
				registry.mark_unextracted(key, extension);
				return Ok(None);
			},
		};
		let name = registry.next_stream_name(key)?;
		let path = extractor.write(key, &name, extension, data)?;
		self.debug.logln(2, format!("Wrote {} bytes to {}", data.len(), path.display()));
		registry.assign_stream_name(key, extension)?;
		Ok(Some(name))
	}
}
