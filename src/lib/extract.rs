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

use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use super::error::{ParseError, Result};
use super::io::Debug;
use super::registry::{NameRegistry, StreamKey, clean_name};

/// Sub-directory holding numeric-keyed thumbnails when links are requested.
pub const THUMBS_DIR: &str = ".thumbs";
pub const SYMLINK_LOG: &str = "symlinks.log";

/// Writes recovered thumbnails into an output directory.
#[derive(Clone, Debug)]
pub struct Extractor {
	outdir: PathBuf,
	symlinks: bool,
}

impl Extractor {
	pub fn new(outdir: &Path, symlinks: bool) -> Result<Extractor> {
		let output_error = |path: &Path, source: io::Error| ParseError::Output { path: path.display().to_string(), source };
		create_dir_all(outdir).map_err(|e| output_error(outdir, e))?;
		if symlinks {
			let thumbs = outdir.join(THUMBS_DIR);
			create_dir_all(&thumbs).map_err(|e| output_error(&thumbs, e))?;
		}
		Ok(Extractor { outdir: outdir.to_path_buf(), symlinks })
	}

	/// An extractor for one container of a batch, writing below `relative` inside this one's directory.
	pub fn for_container(&self, relative: &Path) -> Result<Extractor> {
		Extractor::new(&self.outdir.join(relative), self.symlinks)
	}

	pub fn outdir(&self) -> &Path {
		&self.outdir
	}

	pub fn symlinks(&self) -> bool {
		self.symlinks
	}

	fn directory_for(&self, key: &StreamKey) -> PathBuf {
		match key {
			StreamKey::Numeric(_) if self.symlinks => self.outdir.join(THUMBS_DIR),
			_ => self.outdir.clone(),
		}
	}

	/// Writes `<name>.<extension>` and returns its path.
	pub fn write(&self, key: &StreamKey, name: &str, extension: &str, data: &[u8]) -> Result<PathBuf> {
		let path = self.directory_for(key).join(format!("{}.{}", name, extension));
		let mut file = File::create(&path).map_err(|source| ParseError::Output { path: path.display().to_string(), source })?;
		file.write_all(data).map_err(|source| ParseError::Output { path: path.display().to_string(), source })?;
		Ok(path)
	}

	/// Links each cataloged original file name to its extracted numeric thumbnail.
	/// Existing links are replaced; every link is appended to `symlinks.log`.
	pub fn link_catalog(&self, registry: &NameRegistry, debug: &mut Debug) -> Result<usize> {
		if !self.symlinks {
			return Ok(0);
		}
		let log_path = self.outdir.join(SYMLINK_LOG);
		let mut log = OpenOptions::new().create(true).append(true).open(&log_path)
			.map_err(|source| ParseError::Output { path: log_path.display().to_string(), source })?;

		let mut created = 0;
		for (key, entries) in registry.catalog.iter() {
			if !matches!(key, StreamKey::Numeric(_)) {
				continue;
			}
			let file = match registry.streams.get(key).and_then(|info| info.first_extracted()) {
				Some(file) => file,
				None => continue,
			};
			let link_name = match entries.first().and_then(|entry| link_name(&entry.name)) {
				Some(name) => name,
				None => continue,
			};
			let target = Path::new(THUMBS_DIR).join(format!("{}.{}", file.name, file.extension));
			let link = self.outdir.join(&link_name);
			match create_link(&target, &link) {
				Ok(()) => {
					created += 1;
					writeln!(log, "{} => {}", target.display(), link_name)
						.map_err(|source| ParseError::Output { path: log_path.display().to_string(), source })?;
				},
				Err(source) => {
					let error = ParseError::LinkCreation { link: link.display().to_string(), source };
					debug.warn(format!("{}", error));
				},
			}
		}
		Ok(created)
	}
}

/// The file name part of a cataloged name, made safe for the output directory.
fn link_name(original: &str) -> Option<String> {
	original
		.rsplit(|c: char| c == '/' || c == '\\')
		.next()
		.map(clean_name)
		.filter(|name| !name.is_empty() && name != "." && name != "..")
}

fn create_link(target: &Path, link: &Path) -> io::Result<()> {
	if fs::symlink_metadata(link).is_ok() {
		fs::remove_file(link)?;
	}
	symlink(target, link)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
	std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
	std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
	Err(io::Error::new(io::ErrorKind::Other, "symbolic links are not supported on this platform"))
}
