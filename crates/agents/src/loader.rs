//! Document loaders - turn files on disk into Documents

use crate::error::Service;
use crate::{AgentError, Result};
use async_trait::async_trait;
use docchat_core::{Document, SourceType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// Extracts text from one kind of file
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Lower-case extensions this loader handles
    fn extensions(&self) -> &[&'static str];

    async fn load(&self, path: &Path) -> Result<Document>;
}

/// PDF text extraction
pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    async fn load(&self, path: &Path) -> Result<Document> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AgentError::ingestion(path.display().to_string(), e))?;

        // pdf-extract is CPU bound and synchronous
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| AgentError::ingestion(path.display().to_string(), e))?
            .map_err(|e| AgentError::ingestion(path.display().to_string(), e))?;

        Ok(Document::from_file(path, SourceType::Pdf, text))
    }
}

/// Plain text and markdown
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "text", "md", "markdown"]
    }

    async fn load(&self, path: &Path) -> Result<Document> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::ingestion(path.display().to_string(), e))?;

        let source_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(SourceType::from_extension)
            .unwrap_or(SourceType::Text);

        Ok(Document::from_file(path, source_type, text))
    }
}

/// Walks a directory and dispatches files to loaders by extension
#[derive(Clone)]
pub struct DirectoryLoader {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self::new()
            .with_loader(Arc::new(PdfLoader))
            .with_loader(Arc::new(TextLoader))
    }
}

impl DirectoryLoader {
    /// A loader with no registered file types
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    fn loader_for(&self, path: &Path) -> Option<&Arc<dyn DocumentLoader>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.loaders
            .iter()
            .find(|loader| loader.extensions().contains(&ext.as_str()))
    }

    /// Supported files under `root`, sorted by path
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(AgentError::ingestion(
                root.display().to_string(),
                "not a readable directory",
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| {
                let item = e
                    .path()
                    .unwrap_or(root)
                    .display()
                    .to_string();
                AgentError::ingestion(item, e)
            })?;

            if !entry.file_type().is_file() {
                continue;
            }
            if self.loader_for(entry.path()).is_some() {
                files.push(entry.into_path());
            } else {
                debug!("Skipping unsupported file {}", entry.path().display());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Load every supported file under `root`.
    ///
    /// The first file that fails aborts the whole load.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub async fn load(&self, root: &Path) -> Result<Vec<Document>> {
        let files = self.discover(root)?;
        if files.is_empty() {
            warn!("No supported documents found under {}", root.display());
        }

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let Some(loader) = self.loader_for(&path) else {
                continue;
            };
            let document = loader.load(&path).await.map_err(|e| match e {
                AgentError::Ingestion { .. } => e,
                other => AgentError::ingestion(
                    path.display().to_string(),
                    AgentError::upstream(Service::DocumentLoader, other),
                ),
            })?;
            debug!(chars = document.text.len(), "Loaded {}", path.display());
            documents.push(document);
        }

        info!("Loaded {} documents from {}", documents.len(), root.display());
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_loads_supported_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.txt"), "second").unwrap();
        fs::write(dir.path().join("a.md"), "# first").unwrap();
        fs::write(dir.path().join("nested/c.txt"), "third").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let docs = DirectoryLoader::default().load(dir.path()).await.unwrap();
        let texts: Vec<_> = docs.iter().map(|d| d.text.as_str()).collect();

        assert_eq!(texts, vec!["# first", "second", "third"]);
        assert_eq!(docs[0].metadata.source_type, SourceType::Markdown);
        assert!(docs[1].source().ends_with("b.txt"));
    }

    #[tokio::test]
    async fn test_missing_directory_names_path() {
        let err = DirectoryLoader::default()
            .load(Path::new("/definitely/not/here"))
            .await
            .unwrap_err();

        match err {
            AgentError::Ingestion { item, .. } => assert_eq!(item, "/definitely/not/here"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_broken_pdf_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"not a pdf at all").unwrap();

        let err = DirectoryLoader::default().load(dir.path()).await.unwrap_err();

        match err {
            AgentError::Ingestion { item, .. } => assert!(item.ends_with("broken.pdf")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
