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

mod common;

use std::io::Cursor;
use common::CfbBuilder;
use thumbrecovery::cfbf::Container;
use thumbrecovery::cfbf::structures::{EntryType, OLE_BETA_SIGNATURE};
use thumbrecovery::error::ParseError;
use thumbrecovery::io::{Debug, Endian};

fn open(data: Vec<u8>) -> Result<Container<Cursor<Vec<u8>>>, ParseError> {
	let size = data.len() as u64;
	Container::new(Cursor::new(data), size, &mut Debug::quiet())
}

fn read(container: &mut Container<Cursor<Vec<u8>>>, name: &str) -> Result<Vec<u8>, ParseError> {
	let entry = container.entries().iter().find(|e| e.name == name).cloned().expect("no such stream");
	container.read_stream(&entry, &mut Debug::quiet())
}

fn pattern(length: usize, seed: u8) -> Vec<u8> {
	(0..length).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn directory_lists_root_and_streams() {
	let data = CfbBuilder::new()
		.stream("Catalog", vec![1; 40])
		.stream("1", vec![2; 5000])
		.build();
	let container = open(data).unwrap();
	let root = container.root().unwrap();
	assert_eq!(root.id, 0);
	assert_eq!(root.name, "Root Entry");
	let streams: Vec<&str> = container.entries().iter()
		.filter(|e| e.entry_type == EntryType::Stream)
		.map(|e| e.name.as_str())
		.collect();
	assert_eq!(streams, vec!["Catalog", "1"]);
	assert!(!container.header().is_beta());
}

#[test]
fn regular_streams_follow_the_sat() {
	let big = pattern(5000, 7);
	let (data, layout) = CfbBuilder::new().stream("big", big.clone()).scatter().build_with_layout();
	assert!(!layout[0].mini);
	assert!(layout[0].chain.windows(2).all(|w| w[0] > w[1]));
	let mut container = open(data).unwrap();
	assert_eq!(read(&mut container, "big").unwrap(), big);
}

#[test]
fn small_streams_come_from_the_mini_stream() {
	let first = pattern(100, 1);
	let second = pattern(700, 2);
	let at_cutoff = pattern(4096, 3);
	let (data, layout) = CfbBuilder::new()
		.stream("first", first.clone())
		.stream("second", second.clone())
		.stream("cutoff", at_cutoff.clone())
		.build_with_layout();
	assert!(layout[0].mini && layout[1].mini);
	assert!(!layout[2].mini);
	assert_eq!(layout[1].chain.len(), 11);

	let mut container = open(data).unwrap();
	assert_eq!(read(&mut container, "second").unwrap(), second);
	assert_eq!(read(&mut container, "first").unwrap(), first);
	assert_eq!(read(&mut container, "cutoff").unwrap(), at_cutoff);
}

#[test]
fn scattered_mini_chains_read_back() {
	let first = pattern(100, 4);
	let second = pattern(700, 5);
	let third = pattern(3000, 6);
	let (data, layout) = CfbBuilder::new()
		.stream("first", first.clone())
		.stream("second", second.clone())
		.stream("third", third.clone())
		.scatter_mini()
		.build_with_layout();
	assert!(layout.iter().all(|p| p.mini));
	assert!(layout[1].chain.windows(2).all(|w| w[0] > w[1]));

	let mut container = open(data).unwrap();
	let root = container.root().cloned().unwrap();
	// 60 mini-sectors need 8 regular sectors, chained back to front
	assert_eq!(read(&mut container, "third").unwrap(), third);
	assert_eq!(read(&mut container, "first").unwrap(), first);
	assert_eq!(read(&mut container, "second").unwrap(), second);
	assert_eq!(container.read_stream(&root, &mut Debug::quiet()).unwrap().len(), 60 * 64);
}

#[test]
fn sat_sectors_past_the_header_come_from_the_difat() {
	let big = pattern(5000, 9);
	let (data, layout) = CfbBuilder::new()
		.stream("small", pattern(300, 1))
		.reserve(14_000)
		.stream("big", big.clone())
		.scatter()
		.build_with_layout();
	// Sectors beyond 109 * 128 are only described by SAT sectors listed in the DIFAT
	assert!(layout[1].chain.iter().all(|&s| s >= 109 * 128));

	let mut container = open(data).unwrap();
	assert!(container.header().number_of_sat_sectors > 109);
	assert_eq!(container.header().number_of_difat_sectors, 1);
	assert_eq!(read(&mut container, "big").unwrap(), big);
	assert_eq!(read(&mut container, "small").unwrap(), pattern(300, 1));
}

#[test]
fn big_endian_files_are_read_in_their_byte_order() {
	let small = pattern(200, 2);
	let big = pattern(6000, 3);
	let data = CfbBuilder::new()
		.stream("Catalog", small.clone())
		.stream("1", big.clone())
		.scatter()
		.big_endian()
		.build();
	let mut container = open(data).unwrap();
	assert_eq!(container.header().endian, Endian::Big);
	assert_eq!(container.root().unwrap().name, "Root Entry");
	assert_eq!(read(&mut container, "Catalog").unwrap(), small);
	assert_eq!(read(&mut container, "1").unwrap(), big);
}

#[test]
fn large_sectors_hold_64_mini_sectors_each() {
	let first = pattern(3000, 1);
	let second = pattern(3000, 2);
	let third = pattern(100, 3);
	let big = pattern(10_000, 4);
	let (data, layout) = CfbBuilder::new()
		.stream("first", first.clone())
		.stream("second", second.clone())
		.stream("third", third.clone())
		.stream("big", big.clone())
		.large_sectors()
		.scatter()
		.build_with_layout();
	// The third stream starts in the second sector of the mini stream
	assert!(layout[2].chain.iter().all(|&m| m >= 64));
	assert!(!layout[3].mini);

	let mut container = open(data).unwrap();
	assert_eq!(container.header().sector_size, 4096);
	assert_eq!(container.header().major_version, 4);
	assert_eq!(read(&mut container, "first").unwrap(), first);
	assert_eq!(read(&mut container, "second").unwrap(), second);
	assert_eq!(read(&mut container, "third").unwrap(), third);
	assert_eq!(read(&mut container, "big").unwrap(), big);
}

#[test]
fn empty_streams_read_as_nothing() {
	let mut container = open(CfbBuilder::new().stream("empty", Vec::new()).build()).unwrap();
	assert!(read(&mut container, "empty").unwrap().is_empty());
}

#[test]
fn looping_chain_is_detected() {
	let (mut data, layout) = CfbBuilder::new().stream("big", pattern(4608, 0)).build_with_layout();
	let chain = &layout[0].chain;
	let last = *chain.last().unwrap() as usize;
	// Point the last sector back at the first one
	let offset = 512 + last * 4;
	data[offset..offset + 4].copy_from_slice(&chain[0].to_le_bytes());

	let mut container = open(data).unwrap();
	match read(&mut container, "big") {
		Err(ParseError::ChainIntegrity(message)) => assert!(message.contains("loops")),
		other => panic!("unexpected {:?}", other.map(|d| d.len())),
	}
}

#[test]
fn chain_pointing_outside_the_sat_is_detected() {
	let (mut data, layout) = CfbBuilder::new().stream("big", pattern(4096, 0)).build_with_layout();
	let first = layout[0].chain[0] as usize;
	let offset = 512 + first * 4;
	data[offset..offset + 4].copy_from_slice(&0x7000u32.to_le_bytes());

	let mut container = open(data).unwrap();
	assert!(matches!(read(&mut container, "big"), Err(ParseError::ChainIntegrity(_))));
}

#[test]
fn beta_signature_is_accepted() {
	let mut data = CfbBuilder::new().stream("Catalog", vec![0; 16]).build();
	data[..8].copy_from_slice(&OLE_BETA_SIGNATURE);
	let container = open(data).unwrap();
	assert!(container.header().is_beta());
}

#[test]
fn foreign_files_are_rejected() {
	let mut data = CfbBuilder::new().build();
	data[..8].copy_from_slice(b"PK\x03\x04\x14\x00\x00\x00");
	assert!(matches!(open(data), Err(ParseError::HeaderSignature(_))));
	assert!(matches!(open(vec![0; 100]), Err(ParseError::TooSmall { size: 100, minimum: 512 })));
}
