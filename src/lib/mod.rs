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

//! Recovery of thumbnails from Windows thumbnail caches: legacy `Thumbs.db` compound
//! files as well as the CMMM/IMMM `thumbcache_*.db` family.

pub mod auxindex;
pub mod cfbf;
pub mod cmmm;
pub mod codec;
pub mod error;
pub mod extract;
pub mod immm;
pub mod io;
pub mod registry;
pub mod report;
pub mod session;
pub mod thumbsdb;
pub mod version;

use std::cmp::min;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use self::cfbf::hex;
use self::cfbf::structures::{OLE_BETA_SIGNATURE, OLE_SIGNATURE};
use self::cmmm::CMMM_SIGNATURE;
use self::error::{ParseError, Result};
use self::extract::Extractor;
use self::immm::{IMMM_PREFIX, IMMM_SIGNATURE};
use self::io::Debug;
use self::report::ContainerReport;
use self::session::{Policy, Session};

/// Number of leading bytes needed to tell the container formats apart.
pub const SIGNATURE_LENGTH: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Signature {
	CompoundFile,
	CompoundFileBeta,
	Cmmm,
	/// `initial_offset` is where the `IMMM` magic starts.
	Immm { initial_offset: u64 },
}

/// Identifies the container format from the first bytes of a file.
pub fn sniff(head: &[u8]) -> Result<Signature> {
	if head.starts_with(&OLE_SIGNATURE) {
		Ok(Signature::CompoundFile)
	}
	else if head.starts_with(&OLE_BETA_SIGNATURE) {
		Ok(Signature::CompoundFileBeta)
	}
	else if head.starts_with(&CMMM_SIGNATURE) {
		Ok(Signature::Cmmm)
	}
	else if head.starts_with(&IMMM_SIGNATURE) {
		Ok(Signature::Immm { initial_offset: 0 })
	}
	else if head.starts_with(&IMMM_PREFIX) && head[IMMM_PREFIX.len()..].starts_with(&IMMM_SIGNATURE) {
		Ok(Signature::Immm { initial_offset: IMMM_PREFIX.len() as u64 })
	}
	else {
		Err(ParseError::HeaderSignature(hex(&head[..min(head.len(), SIGNATURE_LENGTH)])))
	}
}

/// Sniffs the container format and hands the reader to the matching parser.
pub fn process_reader<R: Read + Seek>(mut reader: R, file_size: u64, session: &mut Session) -> Result<ContainerReport> {
	let mut head = [0u8; SIGNATURE_LENGTH];
	let length = min(file_size, SIGNATURE_LENGTH as u64) as usize;
	reader.seek(SeekFrom::Start(0))?;
	reader.read_exact(&mut head[..length])?;
	reader.seek(SeekFrom::Start(0))?;

	let signature = sniff(&head[..length])?;
	session.debug.logln(1, format!("[process_reader] Detected {:?} signature.", signature));
	match signature {
		Signature::CompoundFile | Signature::CompoundFileBeta => thumbsdb::parse(reader, file_size, session),
		Signature::Cmmm => cmmm::parse(reader, file_size, session),
		Signature::Immm { initial_offset } => immm::parse(reader, file_size, initial_offset, session),
	}
}

/// Processes one container file and, when links are requested, links its catalog.
pub fn process_file(path: &Path, session: &mut Session) -> Result<ContainerReport> {
	let input_error = |source| ParseError::Input { path: path.display().to_string(), source };
	let file = File::open(path).map_err(input_error)?;
	let file_size = file.metadata().map_err(input_error)?.len();
	session.debug.info(format!("Processing {} ({} bytes)", path.display(), file_size));

	let mut report = process_reader(BufReader::new(file), file_size, session)?;
	report.path = Some(path.to_path_buf());
	if let Some(extractor) = &session.extractor {
		if extractor.symlinks() && !report.registry.catalog.is_empty() {
			let links = extractor.link_catalog(&report.registry, session.debug)?;
			session.debug.logln(1, format!("[process_file] Created {} links.", links));
		}
	}
	Ok(report)
}

/// Processes every container `mode` finds for `input` and hands each report to `on_report`.
///
/// In the batch modes every container extracts into its own sub-directory of the output
/// directory (see `container_directory`), and under the best-effort policy a container that
/// fails is skipped with a warning. Failing to write a report always aborts.
/// Returns the number of containers processed successfully.
pub fn process_inputs<F>(mode: Mode, input: &Path, session: &mut Session, mut on_report: F) -> Result<usize>
	where F: FnMut(&ContainerReport, &mut Debug) -> Result<()>
{
	let inputs = mode.inputs(input)?;
	if inputs.is_empty() {
		session.debug.warn(format!("No thumbnail caches found in {}", input.display()));
	}
	let batch_root = if mode.is_batch(input) { Some(input) } else { None };
	let root = session.extractor.take();

	let mut processed = 0;
	let mut outcome = Ok(());
	for path in &inputs {
		match process_input(path, root.as_ref(), batch_root, session, &mut on_report) {
			Ok(()) => processed += 1,
			Err(e) => {
				if session.policy == Policy::Strict || matches!(e, ParseError::Report(_)) {
					outcome = Err(e);
					break;
				}
				session.debug.warn(format!("Skipping {}: {}", path.display(), e));
			},
		}
	}
	session.extractor = root;
	outcome.map(|()| processed)
}

fn process_input<F>(path: &Path, root: Option<&Extractor>, batch_root: Option<&Path>, session: &mut Session, on_report: &mut F) -> Result<()>
	where F: FnMut(&ContainerReport, &mut Debug) -> Result<()>
{
	session.extractor = match (root, batch_root) {
		(Some(extractor), Some(walked)) => Some(extractor.for_container(&container_directory(walked, path))?),
		(Some(extractor), None) => Some(extractor.clone()),
		(None, _) => None,
	};
	let report = process_file(path, session)?;
	on_report(&report, session.debug)
}

/// Output sub-directory for a container found below `root`: its relative path, file name
/// included, so `thumbcache_32.db` and `thumbcache_96.db` next to each other stay apart.
pub fn container_directory(root: &Path, path: &Path) -> PathBuf {
	path.strip_prefix(root)
		.unwrap_or(path)
		.components()
		.filter_map(|component| match component {
			Component::Normal(part) => Some(part),
			_ => None,
		})
		.collect()
}

/// How the input argument is interpreted.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Mode {
	/// A single container file.
	File,
	/// The cache files directly inside a directory.
	Directory,
	/// The cache files anywhere below a directory.
	Recursive,
	/// A single file or a recursive walk, depending on what the input is.
	Automatic,
}

impl FromStr for Mode {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Mode> {
		match s {
			"f" => Ok(Mode::File),
			"d" => Ok(Mode::Directory),
			"r" => Ok(Mode::Recursive),
			"a" => Ok(Mode::Automatic),
			_ => Err(ParseError::Mode(s.to_owned())),
		}
	}
}

impl Mode {
	pub fn policy(self) -> Policy {
		match self {
			Mode::File => Policy::Strict,
			_ => Policy::BestEffort,
		}
	}

	/// Whether `input` is walked for containers rather than read as one.
	pub fn is_batch(self, input: &Path) -> bool {
		match self {
			Mode::File => false,
			Mode::Automatic => !input.is_file(),
			Mode::Directory | Mode::Recursive => true,
		}
	}

	/// The container files to process for `input`.
	pub fn inputs(self, input: &Path) -> Result<Vec<PathBuf>> {
		match self {
			Mode::File => Ok(vec![input.to_path_buf()]),
			Mode::Automatic if input.is_file() => Ok(vec![input.to_path_buf()]),
			Mode::Directory => collect_files(input, false),
			Mode::Recursive | Mode::Automatic => collect_files(input, true),
		}
	}
}

/// `Thumbs.db`, `thumbcache_*.db` and `iconcache_*.db`, ignoring case.
pub fn is_cache_file_name(name: &str) -> bool {
	let name = name.to_lowercase();
	name == "thumbs.db"
		|| (name.ends_with(".db") && (name.starts_with("thumbcache_") || name.starts_with("iconcache_")))
}

/// Lists the cache files in `directory` (and below, if `recursive`), sorted by path.
pub fn collect_files(directory: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
	let mut files = Vec::new();
	collect_into(directory, recursive, &mut files)?;
	files.sort();
	Ok(files)
}

fn collect_into(directory: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
	let input_error = |source| ParseError::Input { path: directory.display().to_string(), source };
	for entry in fs::read_dir(directory).map_err(input_error)? {
		let entry = entry.map_err(input_error)?;
		let file_type = entry.file_type().map_err(input_error)?;
		let path = entry.path();
		if file_type.is_dir() {
			if recursive {
				collect_into(&path, recursive, files)?;
			}
		}
		else if file_type.is_file() && entry.file_name().to_str().map_or(false, is_cache_file_name) {
			files.push(path);
		}
	}
	Ok(())
}
