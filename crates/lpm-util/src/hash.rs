use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Compute the BLAKE3 hash of a file, returning the hex-encoded digest.
///
/// Streams the file content to minimize memory usage.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn blake3_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    stream_into(&mut hasher, file)?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Compute a BLAKE3 digest over a whole directory tree.
///
/// Files are visited in sorted order and both their relative path and their
/// content feed the hash, so renames change the digest. Entries whose file
/// name is in `skip` are not descended into.
///
/// # Errors
/// Returns an error if the tree cannot be walked or a file cannot be read.
pub fn blake3_dir(root: &Path, skip: &[&str]) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !skip.iter().any(|s| e.file_name() == *s));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?;
        // Separators keep "ab"+"c" distinct from "a"+"bc".
        hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update(&[0]);
        stream_into(&mut hasher, File::open(entry.path())?)?;
        hasher.update(&[0]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn stream_into(hasher: &mut blake3::Hasher, file: File) -> io::Result<()> {
    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}
