use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::search::feedback::FeedbackSnapshot;

/// Errors from the persistent vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A vector was saved for a document the store has never seen.
    #[error("document not found in store: {0}")]
    UnknownDocument(String),

    /// Stored vectors disagree with the stored vocabulary; retrieval
    /// refuses rather than returning vectors that would be scored against
    /// the wrong columns.
    #[error("stored vector dimension {stored} does not match vocabulary size {expected}")]
    DimensionMismatch { stored: usize, expected: usize },

    #[error("corrupt store file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// A persisted document with its change-detection hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_path: String,
    pub content: String,
    /// Hex blake3 digest of `content`.
    pub content_hash: String,
    pub service: String,
    pub category: String,
    pub indexed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VocabularyRecord {
    vector_type: String,
    feature_names: Vec<String>,
    idf_values: Option<Vec<f32>>,
}

/// Directory-backed store for documents, vectors, vocabularies,
/// vectorizer metadata and feedback state.
///
/// Documents, vocabularies and metadata are JSON; vectors live in one
/// binary file per vector type as contiguous little-endian f32 rows with
/// an explicit record count and dimension up front. Every record is
/// addressed by `doc_path`, which is unique per collection.
pub struct VectorStore {
    root: PathBuf,
}

/// Compute the content digest used for change detection.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

impl VectorStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn documents_path(&self) -> PathBuf {
        self.root.join("documents.json")
    }

    fn vectors_path(&self, vector_type: &str) -> PathBuf {
        self.root.join(format!("vectors_{vector_type}.bin"))
    }

    fn vocabulary_path(&self, vector_type: &str) -> PathBuf {
        self.root.join(format!("vocabulary_{vector_type}.json"))
    }

    fn metadata_path(&self, vector_type: &str) -> PathBuf {
        self.root.join(format!("metadata_{vector_type}.json"))
    }

    fn feedback_path(&self) -> PathBuf {
        self.root.join("feedback.json")
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Save or update a document. Returns `true` when the document is new
    /// or its content changed; a content change also drops every vector
    /// stored for the document, since they no longer describe it.
    pub fn save_document(
        &self,
        doc_path: &str,
        content: &str,
        service: &str,
        category: &str,
    ) -> Result<bool, StoreError> {
        let hash = content_hash(content);
        let mut documents = self.documents()?;
        let now = Utc::now();

        if let Some(existing) = documents.iter_mut().find(|d| d.doc_path == doc_path) {
            if existing.content_hash == hash {
                return Ok(false);
            }
            existing.content = content.to_string();
            existing.content_hash = hash;
            existing.service = service.to_string();
            existing.category = category.to_string();
            existing.updated_at = now;
            self.write_documents(&documents)?;
            self.drop_vectors_for(doc_path)?;
            debug!(doc_path, "document content changed, vectors dropped");
            return Ok(true);
        }

        documents.push(DocumentRecord {
            doc_path: doc_path.to_string(),
            content: content.to_string(),
            content_hash: hash,
            service: service.to_string(),
            category: category.to_string(),
            indexed_at: now,
            updated_at: now,
        });
        self.write_documents(&documents)?;
        Ok(true)
    }

    /// All persisted documents in first-indexed order.
    pub fn documents(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let path = self.documents_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn document(&self, doc_path: &str) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .documents()?
            .into_iter()
            .find(|d| d.doc_path == doc_path))
    }

    /// Delete a document and every vector stored for it.
    pub fn delete_document(&self, doc_path: &str) -> Result<(), StoreError> {
        let mut documents = self.documents()?;
        documents.retain(|d| d.doc_path != doc_path);
        self.write_documents(&documents)?;
        self.drop_vectors_for(doc_path)
    }

    fn write_documents(&self, documents: &[DocumentRecord]) -> Result<(), StoreError> {
        let file = File::create(self.documents_path())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, documents)?;
        writer.flush()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Vectors
    // ---------------------------------------------------------------

    /// Save one vector, replacing any previous vector for the same
    /// (document, type) pair.
    pub fn save_vector(
        &self,
        doc_path: &str,
        vector: &[f32],
        vector_type: &str,
    ) -> Result<(), StoreError> {
        if self.document(doc_path)?.is_none() {
            return Err(StoreError::UnknownDocument(doc_path.to_string()));
        }

        let mut records = self.read_vector_records(vector_type)?;
        records.retain(|(path, _)| path != doc_path);
        records.push((doc_path.to_string(), vector.to_vec()));
        self.write_vector_records(vector_type, &records)
    }

    /// Save a whole matrix at once; row `i` belongs to `doc_paths[i]`.
    /// Replaces the entire collection for this vector type.
    pub fn save_vectors_batch(
        &self,
        doc_paths: &[String],
        matrix: &[Vec<f32>],
        vector_type: &str,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(doc_paths.len(), matrix.len());

        let records: Vec<(String, Vec<f32>)> = doc_paths
            .iter()
            .cloned()
            .zip(matrix.iter().cloned())
            .collect();
        self.write_vector_records(vector_type, &records)
    }

    pub fn get_vector(
        &self,
        doc_path: &str,
        vector_type: &str,
    ) -> Result<Option<Vec<f32>>, StoreError> {
        let records = self.read_vector_records_checked(vector_type)?;
        Ok(records
            .into_iter()
            .find(|(path, _)| path == doc_path)
            .map(|(_, vector)| vector))
    }

    /// All vectors of a type, in stored order, as `(paths, matrix)`.
    pub fn get_all_vectors(
        &self,
        vector_type: &str,
    ) -> Result<(Vec<String>, Vec<Vec<f32>>), StoreError> {
        let records = self.read_vector_records_checked(vector_type)?;
        let mut paths = Vec::with_capacity(records.len());
        let mut matrix = Vec::with_capacity(records.len());
        for (path, vector) in records {
            paths.push(path);
            matrix.push(vector);
        }
        Ok((paths, matrix))
    }

    /// True when the persisted vector set for `vector_type` does not
    /// cover exactly the given document paths.
    pub fn needs_reindex(
        &self,
        current_paths: &[String],
        vector_type: &str,
    ) -> Result<bool, StoreError> {
        let records = match self.read_vector_records(vector_type) {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, vector_type, "unreadable vector file, forcing reindex");
                return Ok(true);
            }
        };

        if records.len() != current_paths.len() {
            return Ok(true);
        }

        let mut stored: Vec<&str> = records.iter().map(|(path, _)| path.as_str()).collect();
        let mut current: Vec<&str> = current_paths.iter().map(String::as_str).collect();
        stored.sort_unstable();
        current.sort_unstable();
        Ok(stored != current)
    }

    /// Remove every vector of the given type.
    pub fn clear_vector_type(&self, vector_type: &str) -> Result<(), StoreError> {
        let path = self.vectors_path(vector_type);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn drop_vectors_for(&self, doc_path: &str) -> Result<(), StoreError> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(vector_type) = name
                .strip_prefix("vectors_")
                .and_then(|rest| rest.strip_suffix(".bin"))
            else {
                continue;
            };

            let mut records = self.read_vector_records(vector_type)?;
            let before = records.len();
            records.retain(|(path, _)| path != doc_path);
            if records.len() != before {
                self.write_vector_records(vector_type, &records)?;
            }
        }
        Ok(())
    }

    /// Read raw records and verify their dimension against the stored
    /// vocabulary for this type (when one exists).
    fn read_vector_records_checked(
        &self,
        vector_type: &str,
    ) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let records = self.read_vector_records(vector_type)?;
        if let Some((features, _)) = self.get_vocabulary(vector_type)? {
            if let Some((_, vector)) = records.first() {
                if vector.len() != features.len() {
                    return Err(StoreError::DimensionMismatch {
                        stored: vector.len(),
                        expected: features.len(),
                    });
                }
            }
        }
        Ok(records)
    }

    fn read_vector_records(
        &self,
        vector_type: &str,
    ) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let path = self.vectors_path(vector_type);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let corrupt = |reason: &str| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let mut reader = BufReader::new(File::open(&path)?);
        let count = reader.read_u32::<LittleEndian>().map_err(StoreError::Io)? as usize;
        let dimension = reader.read_u32::<LittleEndian>().map_err(StoreError::Io)? as usize;

        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let path_len = reader.read_u32::<LittleEndian>().map_err(StoreError::Io)? as usize;
            let mut path_bytes = vec![0u8; path_len];
            std::io::Read::read_exact(&mut reader, &mut path_bytes)?;
            let doc_path =
                String::from_utf8(path_bytes).map_err(|_| corrupt("non-utf8 document path"))?;

            let mut vector = vec![0.0f32; dimension];
            reader
                .read_f32_into::<LittleEndian>(&mut vector)
                .map_err(StoreError::Io)?;
            records.push((doc_path, vector));
        }
        Ok(records)
    }

    fn write_vector_records(
        &self,
        vector_type: &str,
        records: &[(String, Vec<f32>)],
    ) -> Result<(), StoreError> {
        let dimension = records.first().map(|(_, v)| v.len()).unwrap_or(0);

        let file = File::create(self.vectors_path(vector_type))?;
        let mut writer = BufWriter::new(file);
        writer.write_u32::<LittleEndian>(records.len() as u32)?;
        writer.write_u32::<LittleEndian>(dimension as u32)?;
        for (doc_path, vector) in records {
            writer.write_u32::<LittleEndian>(doc_path.len() as u32)?;
            writer.write_all(doc_path.as_bytes())?;
            for value in vector {
                writer.write_f32::<LittleEndian>(*value)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Vocabulary and metadata
    // ---------------------------------------------------------------

    pub fn save_vocabulary(
        &self,
        vector_type: &str,
        feature_names: &[String],
        idf_values: Option<&[f32]>,
    ) -> Result<(), StoreError> {
        let record = VocabularyRecord {
            vector_type: vector_type.to_string(),
            feature_names: feature_names.to_vec(),
            idf_values: idf_values.map(<[f32]>::to_vec),
        };
        let file = File::create(self.vocabulary_path(vector_type))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &record)?;
        writer.flush()?;
        Ok(())
    }

    /// Feature names in index order plus IDF values when stored.
    #[allow(clippy::type_complexity)]
    pub fn get_vocabulary(
        &self,
        vector_type: &str,
    ) -> Result<Option<(Vec<String>, Option<Vec<f32>>)>, StoreError> {
        let path = self.vocabulary_path(vector_type);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        let record: VocabularyRecord = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some((record.feature_names, record.idf_values)))
    }

    pub fn save_metadata(
        &self,
        vector_type: &str,
        settings: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let file = File::create(self.metadata_path(vector_type))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, settings)?;
        writer.flush()?;
        Ok(())
    }

    pub fn get_metadata(&self, vector_type: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.metadata_path(vector_type);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        Ok(Some(serde_json::from_reader(BufReader::new(file))?))
    }

    // ---------------------------------------------------------------
    // Feedback
    // ---------------------------------------------------------------

    pub fn save_feedback(&self, snapshot: &FeedbackSnapshot) -> Result<(), StoreError> {
        let file = File::create(self.feedback_path())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, snapshot)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_feedback(&self) -> Result<Option<FeedbackSnapshot>, StoreError> {
        let path = self.feedback_path();
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        Ok(Some(serde_json::from_reader(BufReader::new(file))?))
    }
}
