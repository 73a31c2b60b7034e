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

use std::io;
use thiserror::Error;

/// Everything that can go wrong while recovering thumbnails.
///
/// Structural errors abort the container they were raised for; enrichment errors
/// (`AuxIndexUnavailable`, `Codec`, `LinkCreation`) only suppress the recovered name,
/// image or link they would have provided.
#[derive(Error, Debug)]
pub enum ParseError {
	#[error("Unrecognised file signature {0}")]
	HeaderSignature(String),
	#[error("File too small: {size} bytes, need at least {minimum}")]
	TooSmall { size: u64, minimum: u64 },
	#[error("Broken sector chain: {0}")]
	ChainIntegrity(String),
	#[error("Bad entry: {0}")]
	EntryFormat(String),
	#[error("Invalid stream name '{0}': suffix is not a number")]
	InvalidStreamName(String),
	#[error("Auxiliary index unavailable: {0}")]
	AuxIndexUnavailable(String),
	#[error("Could not reconstruct thumbnail: {0}")]
	Codec(String),
	#[error("Could not create link '{link}': {source}")]
	LinkCreation { link: String, source: io::Error },
	#[error("Unexpected end of data: wanted {wanted} bytes at offset {offset:#X}")]
	Truncated { offset: u64, wanted: u64 },
	#[error("Cannot read input '{path}': {source}")]
	Input { path: String, source: io::Error },
	#[error("Cannot write output '{path}': {source}")]
	Output { path: String, source: io::Error },
	#[error("Unknown processing mode '{0}'")]
	Mode(String),
	#[error("Missing JPEG support resource '{path}': {source}")]
	Install { path: String, source: io::Error },
	#[error("Cannot write report: {0}")]
	Report(io::Error),
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ParseError>;

impl ParseError {
	/// The process exit code for this category of error.
	pub fn exit_code(&self) -> i32 {
		match self {
			ParseError::Input { .. } | ParseError::HeaderSignature(_) | ParseError::TooSmall { .. } => 10,
			ParseError::Output { .. } => 11,
			ParseError::ChainIntegrity(_) | ParseError::InvalidStreamName(_) | ParseError::Codec(_) => 12,
			ParseError::Install { .. } => 13,
			ParseError::EntryFormat(_) | ParseError::Truncated { .. } => 14,
			ParseError::LinkCreation { .. } => 15,
			ParseError::Mode(_) => 16,
			ParseError::Report(_) => 17,
			ParseError::AuxIndexUnavailable(_) => 18,
			ParseError::Io(_) => 1,
		}
	}

	/// Whether this error ends the processing of the container it was raised for.
	pub fn is_fatal_for_file(&self) -> bool {
		match self {
			ParseError::AuxIndexUnavailable(_) | ParseError::Codec(_) | ParseError::LinkCreation { .. } => false,
			_ => true,
		}
	}
}
