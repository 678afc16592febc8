use crate::chunking::build_chunks;
use crate::error::LoadError;
use crate::extractor::load_document;
use crate::models::{Chunk, ChunkingConfig, IngestedDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["pdf", "md", "markdown", "txt"];

/// Expands a path into ingestible files: a file is returned as-is, a directory
/// is walked recursively for supported extensions.
pub fn discover_documents(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(path)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Display name for a path, as used when no upload name is supplied.
pub fn declared_filename(path: &Path) -> Result<String, LoadError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| LoadError::MissingFileName(path.display().to_string()))
}

/// A loaded and chunked document, not yet embedded.
pub struct PreparedDocument {
    pub document: IngestedDocument,
    pub chunks: Vec<Chunk>,
}

/// Loads, normalizes and chunks one file under a fresh document id.
pub fn prepare_document(
    path: &Path,
    filename: &str,
    config: ChunkingConfig,
) -> Result<PreparedDocument, LoadError> {
    let checksum = digest_file(path)?;
    let spans = load_document(path, filename)?;
    let doc_id = Uuid::new_v4().simple().to_string();
    let chunks = build_chunks(&doc_id, filename, &spans, config)?;

    Ok(PreparedDocument {
        document: IngestedDocument {
            doc_id,
            filename: filename.to_string(),
            checksum,
            chunk_count: chunks.len(),
        },
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_recursive_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(nested.join("b.md"), "# notes")?;
        fs::write(nested.join("c.TXT"), "plain")?;
        fs::write(base.join("image.png"), [0u8; 4])?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|file| file.extension().is_some_and(|ext| ext != "png")));
        Ok(())
    }

    #[test]
    fn a_single_file_is_returned_even_with_unknown_extension() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b")?;

        assert_eq!(discover_documents(&path), vec![path]);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        Ok(())
    }

    #[test]
    fn prepared_document_counts_its_own_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("upload.bin");
        fs::write(&path, "The cat sat. The dog ran.")?;

        let prepared = prepare_document(&path, "pets.txt", ChunkingConfig::default())?;
        assert_eq!(prepared.chunks.len(), 1);
        assert_eq!(prepared.document.chunk_count, 1);
        assert_eq!(prepared.document.filename, "pets.txt");
        assert_eq!(
            prepared.chunks[0].chunk_id,
            format!("{}-0", prepared.document.doc_id)
        );
        Ok(())
    }

    #[test]
    fn declared_filename_uses_the_last_component() {
        assert_eq!(
            declared_filename(Path::new("/tmp/docs/guide.pdf")).expect("has a name"),
            "guide.pdf"
        );
        assert!(matches!(
            declared_filename(Path::new("/")),
            Err(LoadError::MissingFileName(_))
        ));
    }
}
