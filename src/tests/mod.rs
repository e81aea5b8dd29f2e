/// This is meant to mirror as closely as possible, how users should use
/// the crate: whole archives written out, reopened and read back.
#[cfg(test)]
mod tests {
	use std::io::Cursor;
	use std::path::PathBuf;

	use rand::rngs::StdRng;
	use rand::{Rng, RngCore, SeedableRng};
	use tempfile::TempDir;

	use crate::prelude::*;

	fn archive_path(directory: &TempDir, name: &str) -> PathBuf {
		directory.path().join(name)
	}

	fn random_content(rng: &mut StdRng, length: usize) -> Vec<u8> {
		let mut content = vec![0u8; length];
		rng.fill_bytes(&mut content);
		content
	}

	#[test]
	fn small_v2_round_trip() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "small.grf");

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\test.txt", vec![1, 2, 3])?;
		archive.add_file_from("data\\streamed.txt", &[4u8, 5, 6][..])?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		assert_eq!(archive.data("data\\test.txt")?, [1, 2, 3]);
		assert_eq!(archive.data("data\\streamed.txt")?, [4, 5, 6]);

		let file = archive.get("data\\test.txt").unwrap().as_file().unwrap();
		assert_eq!(file.original_length(), 3);
		assert!(file.position() >= crate::HEADER_LENGTH as u32);

		Ok(())
	}

	#[test]
	fn randomized_v2_round_trip() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0xD0D0);
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "random.grf");

		let extensions = ["bmp", "gat", "spr", "str", "txt"];
		let mut expected = Vec::new();

		let mut archive = Archive::create(&path)?;
		archive.add_directory("data")?;

		for index in 0..20 {
			let extension = extensions[rng.gen_range(0..extensions.len())];
			let name = format!("data\\dir{}\\file{}.{}", index % 4, index, extension);
			let length = rng.gen_range(0..5000);
			let content = random_content(&mut rng, length);

			archive.add_file(&name, content.clone())?;
			expected.push((name, content));
		}

		// An empty file must survive the trip too
		archive.add_file("data\\empty.bin", Vec::new())?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		assert_eq!(archive.entries().len(), 22);

		for (name, content) in &expected {
			assert_eq!(archive.data(name)?, content.as_slice(), "{}", name);
		}
		assert!(archive.data("data\\empty.bin")?.is_empty());

		// Extraction reproduces content and relative paths on disk
		let output = TempDir::new()?;
		archive.extract_to(output.path())?;

		for (name, content) in expected.iter().take(5) {
			let on_disk: PathBuf = name.split('\\').collect();
			assert_eq!(&std::fs::read(output.path().join(on_disk))?, content);
		}

		Ok(())
	}

	#[test]
	fn v2_obfuscated_entries_round_trip() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0xC0FFEE);
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "crypt.grf");

		let mixed = random_content(&mut rng, 3000);
		let head = random_content(&mut rng, 700);

		let mut archive = Archive::create(&path)?;
		archive.add_file_with_flags(
			"data\\mixed.bin",
			mixed.clone(),
			EntryFlags::from_bits(EntryFlags::MIXCRYPT),
		)?;
		archive.add_file_with_flags(
			"data\\head.bin",
			head.clone(),
			EntryFlags::from_bits(EntryFlags::DES_0X14),
		)?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;

		let file = archive.get("data\\mixed.bin").unwrap().as_file().unwrap();
		assert!(file.flags().contains(EntryFlags::MIXCRYPT));
		assert_eq!(file.aligned_length() % 8, 0);
		assert!(file.aligned_length() >= file.compressed_length());

		assert_eq!(archive.data("data\\mixed.bin")?, mixed.as_slice());
		assert_eq!(archive.data("data\\head.bin")?, head.as_slice());

		Ok(())
	}

	#[test]
	fn watermark_denial_strips_cipher_flags() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "plain.grf");

		let config = CreateConfig::default().allow_crypt(false);
		let mut archive = Archive::create_with(&path, &config)?;
		archive.add_file_with_flags(
			"data\\wanted.bin",
			vec![9u8; 512],
			EntryFlags::from_bits(EntryFlags::MIXCRYPT),
		)?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		assert!(!archive.allow_crypt());

		let flags = archive.get("data\\wanted.bin").unwrap().flags();
		assert!(!flags.is_encrypted());
		assert_eq!(archive.data("data\\wanted.bin")?, vec![9u8; 512].as_slice());

		Ok(())
	}

	#[test]
	fn v1_round_trips_both_name_schemes() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0x1234);

		for minor in [0u8, 2u8] {
			let directory = TempDir::new()?;
			let path = archive_path(&directory, "legacy.grf");

			let map = random_content(&mut rng, 2048);
			let sprite = random_content(&mut rng, 513);

			let config = CreateConfig::default().version(Version::new(1, minor));
			let mut archive = Archive::create_with(&path, &config)?;
			archive.add_directory("data")?;
			archive.add_file("data\\field.gat", map.clone())?;
			archive.add_file("data\\npc.bmp", sprite.clone())?;
			archive.close()?;

			let mut archive = Archive::open(&path, true)?;
			assert_eq!(archive.version(), Version::new(1, minor));
			assert_eq!(archive.entries().len(), 3);

			// v1 assigns the cipher mode from the extension
			let gat = archive.get("data\\field.gat").unwrap().flags();
			assert!(gat.contains(EntryFlags::DES_0X14));
			let bmp = archive.get("data\\npc.bmp").unwrap().flags();
			assert!(bmp.contains(EntryFlags::MIXCRYPT));

			assert_eq!(archive.data("data\\field.gat")?, map.as_slice(), "minor {}", minor);
			assert_eq!(archive.data("data\\npc.bmp")?, sprite.as_slice(), "minor {}", minor);
		}

		Ok(())
	}

	#[test]
	fn v1_rejects_unsupported_minor() {
		let config = CreateConfig::default().version(Version::new(1, 4));
		assert!(matches!(
			Archive::create_in(Cursor::new(Vec::new()), &config),
			Err(GrfError::Malformed(_))
		));
	}

	#[test]
	fn corrupt_watermark_fails_open() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "corrupt.grf");

		Archive::create(&path)?.close()?;

		let mut bytes = std::fs::read(&path)?;
		bytes[17] = 5;
		std::fs::write(&path, bytes)?;

		assert!(matches!(
			Archive::open(&path, true),
			Err(GrfError::Malformed(_))
		));

		Ok(())
	}

	#[test]
	fn unsupported_major_fails_open() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "future.grf");

		Archive::create(&path)?.close()?;

		// Major byte of the little-endian version word
		let mut bytes = std::fs::read(&path)?;
		bytes[44] = 0x03;
		std::fs::write(&path, bytes)?;

		assert!(matches!(
			Archive::open(&path, true),
			Err(GrfError::Malformed(_))
		));

		Ok(())
	}

	#[test]
	fn read_only_archives_reject_mutation() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "sealed.grf");

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\a.txt", vec![7])?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		assert!(archive.is_read_only());

		assert!(matches!(
			archive.add_file("data\\b.txt", vec![8]),
			Err(GrfError::ReadOnly)
		));
		assert!(matches!(archive.remove("data\\a.txt"), Err(GrfError::ReadOnly)));
		assert!(matches!(archive.repack(), Err(GrfError::ReadOnly)));

		// The failed mutation leaves the archive readable
		assert_eq!(archive.data("data\\a.txt")?, [7]);

		Ok(())
	}

	#[test]
	fn empty_archive_reopens_empty() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "empty.grf");

		Archive::create(&path)?.close()?;

		let archive = Archive::open(&path, true)?;
		assert!(archive.entries().is_empty());
		assert!(archive.get("anything").is_none());

		Ok(())
	}

	#[test]
	fn clean_archives_flush_nothing() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "clean.grf");

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\a.txt", vec![1])?;
		archive.close()?;

		let before = std::fs::read(&path)?;
		Archive::open(&path, false)?.close()?;
		assert_eq!(std::fs::read(&path)?, before);

		Ok(())
	}

	#[test]
	fn adding_a_known_name_replaces_the_entry() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "replace.grf");

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\a.txt", vec![1, 1, 1])?;
		archive.add_file("DATA\\A.TXT", vec![2, 2])?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		assert_eq!(archive.entries().len(), 1);
		assert_eq!(archive.data("data\\a.txt")?, [2, 2]);

		Ok(())
	}

	#[test]
	fn removal_gaps_are_reused() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0xBEEF);
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "gaps.grf");

		let first = random_content(&mut rng, 800);
		let victim = random_content(&mut rng, 2000);
		let last = random_content(&mut rng, 800);

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\first.bin", first.clone())?;
		archive.add_file("data\\victim.bin", victim)?;
		archive.add_file("data\\last.bin", last.clone())?;
		archive.close()?;

		let mut archive = Archive::open(&path, false)?;
		assert!(archive.remove("data\\victim.bin")?);

		let small = random_content(&mut rng, 100);
		archive.add_file("data\\small.bin", small.clone())?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;
		let position_of = |archive: &Archive, name: &str| {
			let file = archive.get(name).unwrap().as_file().unwrap();
			(file.position() as u64, file.aligned_length() as u64)
		};

		let (first_position, first_extent) = position_of(&archive, "data\\first.bin");
		let (small_position, small_extent) = position_of(&archive, "data\\small.bin");
		let (last_position, _) = position_of(&archive, "data\\last.bin");

		// The newcomer landed in the hole the removal left behind
		assert_eq!(small_position, first_position + first_extent);
		assert!(small_position + small_extent <= last_position);

		assert_eq!(archive.data("data\\first.bin")?, first.as_slice());
		assert_eq!(archive.data("data\\small.bin")?, small.as_slice());
		assert_eq!(archive.data("data\\last.bin")?, last.as_slice());

		Ok(())
	}

	#[test]
	fn repack_leaves_no_interior_gaps() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0xFADE);
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "packed.grf");

		let mut expected = Vec::new();
		let mut archive = Archive::create(&path)?;
		for index in 0..6 {
			let name = format!("data\\blob{}.bin", index);
			let content = random_content(&mut rng, 600 + index * 37);
			archive.add_file(&name, content.clone())?;
			expected.push((name, content));
		}
		archive.close()?;

		let mut archive = Archive::open(&path, false)?;
		assert!(archive.remove("data\\blob2.bin")?);
		assert!(archive.remove("data\\blob4.bin")?);
		archive.repack()?;
		archive.close()?;

		let mut archive = Archive::open(&path, true)?;

		let mut extents: Vec<(u64, u64)> = archive
			.entries()
			.iter()
			.filter_map(Entry::as_file)
			.map(|file| (file.position() as u64, file.aligned_length() as u64))
			.collect();
		extents.sort_unstable();

		// Content packs the store from the preamble up, back to back
		assert_eq!(extents[0].0, crate::HEADER_LENGTH as u64);
		for pair in extents.windows(2) {
			assert_eq!(pair[0].0 + pair[0].1, pair[1].0);
		}

		for (name, content) in expected {
			if name.ends_with("blob2.bin") || name.ends_with("blob4.bin") {
				assert!(archive.get(&name).is_none());
			} else {
				assert_eq!(archive.data(&name)?, content.as_slice(), "{}", name);
			}
		}

		Ok(())
	}

	#[test]
	fn merge_copies_entries_across() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let source_path = archive_path(&directory, "source.grf");
		let target_path = archive_path(&directory, "target.grf");

		let mut source = Archive::create(&source_path)?;
		source.add_directory("data")?;
		source.add_file("data\\carried.bin", vec![5; 64])?;
		source.close()?;

		let mut target = Archive::create(&target_path)?;
		target.add_file("data\\own.bin", vec![6; 32])?;

		let mut source = Archive::open(&source_path, true)?;
		target.merge(&mut source)?;
		target.close()?;

		let mut target = Archive::open(&target_path, true)?;
		assert_eq!(target.entries().len(), 3);
		assert_eq!(target.data("data\\carried.bin")?, vec![5; 64].as_slice());
		assert_eq!(target.data("data\\own.bin")?, vec![6; 32].as_slice());

		Ok(())
	}

	#[test]
	fn in_memory_store_round_trip() -> InternalResult<()> {
		let mut store = Cursor::new(Vec::new());

		let mut archive = Archive::create_in(&mut store, &CreateConfig::default())?;
		archive.add_file("data\\memory.bin", vec![42; 257])?;
		archive.close()?;

		let bytes = store.into_inner();
		let mut archive = Archive::from_store(Cursor::new(bytes), false, CipherKey::default())?;
		assert_eq!(archive.data("data\\memory.bin")?, vec![42; 257].as_slice());

		Ok(())
	}

	#[test]
	fn custom_key_schedule_round_trip() -> InternalResult<()> {
		let mut rng = StdRng::seed_from_u64(0xABCD);
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "keyed.grf");

		let mut schedule = [0u8; crate::KEY_SCHEDULE_LENGTH];
		rng.fill_bytes(&mut schedule);
		let key = CipherKey::new(schedule);

		let content = random_content(&mut rng, 1500);

		let config = CreateConfig::default().key(key.clone());
		let mut archive = Archive::create_with(&path, &config)?;
		archive.add_file_with_flags(
			"data\\keyed.bin",
			content.clone(),
			EntryFlags::from_bits(EntryFlags::MIXCRYPT),
		)?;
		archive.close()?;

		let mut archive = Archive::open_with(&path, true, key)?;
		assert_eq!(archive.data("data\\keyed.bin")?, content.as_slice());

		Ok(())
	}

	#[test]
	fn lookups_miss_as_absence() -> InternalResult<()> {
		let directory = TempDir::new()?;
		let path = archive_path(&directory, "miss.grf");

		let mut archive = Archive::create(&path)?;
		archive.add_file("data\\present.txt", vec![1])?;

		assert!(archive.get("data\\absent.txt").is_none());
		assert!(!archive.contains("data\\absent.txt"));
		assert!(!archive.remove("data\\absent.txt")?);
		assert!(matches!(
			archive.data("data\\absent.txt"),
			Err(GrfError::NotFound(_))
		));

		Ok(())
	}
}
