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

extern crate clap;
extern crate thumbrecovery;

use std::io::{stdout, stderr};
use std::path::Path;
use clap::{Arg, App, ArgMatches};
use thumbrecovery::{process_inputs, Mode};
use thumbrecovery::auxindex::ExportedIndex;
use thumbrecovery::codec::{JpegCodec, JpegSupport};
use thumbrecovery::error::{ParseError, Result};
use thumbrecovery::extract::Extractor;
use thumbrecovery::io::Debug;
use thumbrecovery::report::write_report;
use thumbrecovery::session::Session;

fn main() {
	let matches = App::new("thumbsextract")
		.version("1.0")
		.author("Steve Muller <steve.muller@outlook.com>")
		.about("This utility reads Windows thumbnail caches (Thumbs.db, thumbcache_*.db, iconcache_*.db), lists their content and optionally extracts the thumbnails.")
		.arg(Arg::with_name("verbose")
			.short("v")
			.help("Increases the debug verbosity. This will print a lot of debug messages to standard error (STDERR). Can be used up to 3 times.")
			.multiple(true)
			.takes_value(false))
		.arg(Arg::with_name("quiet")
			.short("q")
			.long("quiet")
			.help("Only prints errors to standard error (STDERR).")
			.conflicts_with("verbose")
			.takes_value(false))
		.arg(Arg::with_name("mode")
			.short("m")
			.long("mode")
			.value_name("MODE")
			.help("How INPUT is interpreted: 'f' a single file (default), 'd' the cache files in a directory, 'r' the cache files below a directory, 'a' a single file or a recursive search, whichever INPUT is. All modes but 'f' skip broken files with a warning.")
			.takes_value(true))
		.arg(Arg::with_name("edb")
			.short("e")
			.long("edb")
			.value_name("FILE")
			.help("A tab-separated export of the Windows Search index, used to recover the original names of thumbcache entries.")
			.takes_value(true))
		.arg(Arg::with_name("outdir")
			.short("o")
			.long("outdir")
			.value_name("DIR")
			.help("If specified, then the thumbnails will be extracted into this directory. Otherwise they are only listed.")
			.takes_value(true))
		.arg(Arg::with_name("symlinks")
			.short("s")
			.long("symlinks")
			.help("Stores numbered thumbnails in a hidden sub-directory and links them under their original file names.")
			.requires("outdir")
			.takes_value(false))
		.arg(Arg::with_name("jpeg")
			.short("j")
			.long("jpeg-resources")
			.value_name("DIR")
			.help("A directory holding header.bin, quantization.bin and huffman.bin, used to rebuild fragmentary (Type 1) Thumbs.db thumbnails.")
			.takes_value(true))
		.arg(Arg::with_name("input")
			.value_name("INPUT")
			.help("The thumbnail cache file, or the directory to search for them.")
			.required(true)
			.index(1))
	.get_matches();

	let verbose = if matches.is_present("quiet") { -1 } else { matches.occurrences_of("verbose") as i8 };
	let mut debug = Debug::new(stderr(), verbose);

	if let Err(e) = run(&matches, &mut debug) {
		debug.error(format!("{}", e));
		std::process::exit(e.exit_code());
	}
}

fn run(matches: &ArgMatches, debug: &mut Debug) -> Result<()> {
	let mode: Mode = matches.value_of("mode").unwrap_or("f").parse()?;
	let input = Path::new(matches.value_of("input").unwrap_or(""));

	let extractor = match matches.value_of("outdir") {
		Some(dir) => Some(Extractor::new(Path::new(dir), matches.is_present("symlinks"))?),
		None => None,
	};
	let aux_index = match matches.value_of("edb") {
		Some(path) => match ExportedIndex::open(Path::new(path)) {
			Ok(index) => {
				debug.info(format!("Loaded {} index records from {}", index.len(), path));
				Some(index)
			},
			Err(e) => {
				debug.warn(format!("{}", e));
				None
			},
		},
		None => None,
	};
	let support = match matches.value_of("jpeg") {
		Some(dir) => Some(JpegSupport::load(Path::new(dir))?),
		None => None,
	};

	let mut session = Session::new(debug, mode.policy());
	if let Some(extractor) = extractor {
		session = session.with_extractor(extractor);
	}
	if let Some(ref index) = aux_index {
		session = session.with_aux_index(index);
	}
	if let Some(ref support) = support {
		session = session.with_codec(&JpegCodec, support);
	}

	let stdout = stdout();
	let mut out = stdout.lock();
	let processed = process_inputs(mode, input, &mut session, |report, debug| {
		write_report(&mut out, report, debug.level()).map_err(ParseError::Report)
	})?;
	session.debug.logln(1, format!("[run] Processed {} containers.", processed));
	Ok(())
}
