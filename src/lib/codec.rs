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

//! Reconstruction of "Type 1" Thumbs.db thumbnails, which only store the JPEG frame
//! and rely on a generic header, quantization and Huffman tables shipped separately.

use std::fs;
use std::io::Cursor;
use std::path::Path;
use image::ImageFormat;
use super::error::{ParseError, Result};

pub const HEADER_RESOURCE: &str = "header.bin";
pub const QUANTIZATION_RESOURCE: &str = "quantization.bin";
pub const HUFFMAN_RESOURCE: &str = "huffman.bin";

/// Start of frame (baseline DCT).
const SOF0: [u8; 2] = [0xFF, 0xC0];

/// The three generic JPEG blobs, loaded once per run.
#[derive(Clone, Debug, Default)]
pub struct JpegSupport {
	pub header: Vec<u8>,
	pub quantization: Vec<u8>,
	pub huffman: Vec<u8>,
}

impl JpegSupport {
	pub fn load(directory: &Path) -> Result<JpegSupport> {
		let read = |name: &str| {
			let path = directory.join(name);
			fs::read(&path).map_err(|source| ParseError::Install { path: path.display().to_string(), source })
		};
		Ok(JpegSupport {
			header: read(HEADER_RESOURCE)?,
			quantization: read(QUANTIZATION_RESOURCE)?,
			huffman: read(HUFFMAN_RESOURCE)?,
		})
	}
}

pub trait FragmentCodec {
	/// Turns the raw frame bytes of a fragmentary thumbnail (starting at its frame marker)
	/// into a complete image file.
	fn reconstruct(&self, frame: &[u8], support: &JpegSupport) -> Result<Vec<u8>>;
}

/// Puts the frame behind the generic header and tables.
pub fn splice(frame: &[u8], support: &JpegSupport) -> Result<Vec<u8>> {
	if !frame.starts_with(&SOF0) {
		return Err(ParseError::Codec(format!("frame does not start with a SOF0 marker")));
	}
	if support.header.is_empty() {
		return Err(ParseError::Codec(format!("generic JPEG header is empty")));
	}
	let mut image = Vec::with_capacity(support.header.len() + support.quantization.len() + support.huffman.len() + frame.len());
	image.extend_from_slice(&support.header);
	image.extend_from_slice(&support.quantization);
	image.extend_from_slice(&support.huffman);
	image.extend_from_slice(frame);
	Ok(image)
}

/// Splices the frame into a JPEG stream, decodes it and encodes the pixels again as a
/// regular JPEG. A frame that does not decode is a codec error.
pub struct JpegCodec;

impl FragmentCodec for JpegCodec {
	fn reconstruct(&self, frame: &[u8], support: &JpegSupport) -> Result<Vec<u8>> {
		let spliced = splice(frame, support)?;
		let image = image::load_from_memory_with_format(&spliced, ImageFormat::Jpeg)
			.map_err(|e| ParseError::Codec(format!("rebuilt frame does not decode: {}", e)))?;
		let mut encoded = Vec::new();
		image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)
			.map_err(|e| ParseError::Codec(format!("cannot encode rebuilt image: {}", e)))?;
		Ok(encoded)
	}
}

/// Locates the frame marker inside a Type 1 payload.
pub fn find_frame(payload: &[u8]) -> Option<&[u8]> {
	payload.windows(2).position(|w| w == SOF0).map(|start| &payload[start..])
}
