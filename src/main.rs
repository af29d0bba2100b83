use std::{
    fs,
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use volmap::{
    volume::{volume_sort_key, VolumeDescriptor},
    Concat, Signature,
};

fn main() {
    let mut args = std::env::args();
    let first_volume = PathBuf::from(args.nth(1).expect("usage: volmap <first-volume>"));

    let paths = discover_volumes(&first_volume);

    let mut first = fs::File::open(&paths[0]).unwrap();
    let signature = Signature::search_stream(&mut first)
        .unwrap()
        .expect("no archive signature found");
    println!("{signature:?}");

    let mut descriptors = vec![];
    let mut readers = vec![];

    for path in &paths {
        let mut file = fs::File::open(path).unwrap();
        let size = file.metadata().unwrap().len();

        let mut first_16kb = vec![0; 16384.min(size as usize)];
        file.read_exact(&mut first_16kb).unwrap();
        file.seek(io::SeekFrom::Start(0)).unwrap();

        descriptors.push(VolumeDescriptor::new(
            path.file_name().unwrap().to_string_lossy(),
            size,
            Some(first_16kb),
        ));
        readers.push(file);
    }

    let mut stream = Concat::new(readers).unwrap();
    let entries = volmap::list_files(&mut stream, &descriptors, None).unwrap();

    for entry in entries {
        println!("{entry:#?}");
    }
}

/// Find the sibling volumes of the given first volume by the recognized
/// naming conventions and return them in volume order.
fn discover_volumes(first: &Path) -> Vec<PathBuf> {
    let file_name = match first.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => return vec![first.to_path_buf()],
    };

    let Some(stem) = volume_set_stem(&file_name) else {
        return vec![first.to_path_buf()];
    };

    let dir = match first.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut found = vec![];
    for dir_entry in fs::read_dir(dir).unwrap() {
        let dir_entry = dir_entry.unwrap();
        let name = dir_entry.file_name().to_string_lossy().into_owned();

        if volume_set_stem(&name).as_deref() == Some(stem.as_str()) {
            if let Some(key) = volume_sort_key(&name) {
                found.push((key, dir_entry.path()));
            }
        }
    }

    found.sort();

    if found.is_empty() {
        vec![first.to_path_buf()]
    } else {
        found.into_iter().map(|(_, path)| path).collect()
    }
}

/// The part of a volume filename shared by all volumes of its set, or None
/// when the name does not follow a recognized convention.
fn volume_set_stem(name: &str) -> Option<String> {
    let lower = name.to_lowercase();

    if let Some(rest) = lower.strip_suffix(".rar") {
        if let Some((base, part)) = rest.rsplit_once('.') {
            if let Some(number) = part.strip_prefix("part") {
                if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
                    return Some(base.to_string());
                }
            }
        }

        return Some(rest.to_string());
    }

    if let Some(rest) = lower.strip_suffix(".7z") {
        return Some(rest.to_string());
    }

    let (base, ext) = lower.rsplit_once('.')?;

    if let Some(rest) = base.strip_suffix(".7z") {
        if ext.len() == 3 && ext.bytes().all(|b| b.is_ascii_digit()) {
            return Some(rest.to_string());
        }
    }

    let ext = ext.as_bytes();
    if ext.len() == 3
        && (b'r'..=b't').contains(&ext[0])
        && ext[1].is_ascii_digit()
        && ext[2].is_ascii_digit()
    {
        return Some(base.to_string());
    }

    None
}
