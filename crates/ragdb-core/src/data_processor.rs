use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::ChunkMetadata;

/// One page of extracted document text. Plain-text sources are a single page.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    pub content: String,
    pub page_number: Option<u32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub pages: Vec<DocumentPage>,
}

impl SourceDocument {
    pub fn filename(&self) -> Option<&str> { self.pages.first().and_then(|p| p.metadata.filename.as_deref()) }
}

/// Collects `.txt` sources from a directory tree. Richer formats are parsed
/// by external loaders and handed over as [`DocumentPage`]s.
#[derive(Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self { Self }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<SourceDocument>> {
        self.process_files(data_dir, self.list_txt_files(data_dir))
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<SourceDocument>> {
        let mut files = self.list_txt_files(data_dir);
        if files.len() > limit { files.truncate(limit); info!(limit, "limited to first files"); }
        self.process_files(data_dir, files)
    }

    fn process_files(&self, data_dir: &Path, files: Vec<PathBuf>) -> Result<Vec<SourceDocument>> {
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt files found");
            return Ok(vec![]);
        }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), "processing file {}/{}", file_index + 1, files.len());
            documents.push(self.load_text_file(file_path)?);
        }
        info!(files = documents.len(), dir = %data_dir.display(), "loaded text sources");
        Ok(documents)
    }

    pub fn load_text_file(&self, file_path: &Path) -> Result<SourceDocument> {
        let content = self.read_file_content(file_path)?;
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let page = DocumentPage { content, page_number: Some(1), metadata: ChunkMetadata::for_file(filename) };
        Ok(SourceDocument { path: file_path.to_path_buf(), pages: vec![page] })
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        let bytes = fs::read(file_path).map_err(|e| Error::Operation(format!("failed to read {}: {e}", file_path.display())))?;
        match String::from_utf8(bytes) {
            Ok(content) => Ok(content),
            Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).to_string()),
        }
    }

    fn list_txt_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}
