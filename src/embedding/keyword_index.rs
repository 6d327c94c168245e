/// Tantivy keyword index for full-text search
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

/// Writer heap used when the caller has no preference
pub const DEFAULT_WRITER_HEAP: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// BM25 hit
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    /// Document id
    pub id: String,
    /// BM25 relevance score
    pub score: f32,
}

/// Tantivy keyword index wrapper
///
/// Indexes product title and body text; queries are parsed leniently so stray
/// punctuation in customer messages never fails a search.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: Field,
    title_field: Field,
    text_field: Field,
}

impl KeywordIndex {
    fn schema() -> (Schema, Field, Field, Field) {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let title_field = schema_builder.add_text_field("title", TEXT);
        let text_field = schema_builder.add_text_field("text", TEXT);
        (schema_builder.build(), id_field, title_field, text_field)
    }

    /// Create an index held entirely in memory
    ///
    /// Rebuilt from the catalog at every start.
    pub fn in_memory(writer_heap: usize) -> Result<Self, KeywordIndexError> {
        let (schema, id_field, title_field, text_field) = Self::schema();
        let index = Index::create_in_ram(schema);

        let writer = index
            .writer_with_num_threads(1, writer_heap)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: TantivyError| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            id_field,
            title_field,
            text_field,
        })
    }

    /// Add a document; visible to searches after [`commit`](Self::commit)
    pub fn insert(&mut self, id: &str, title: &str, text: &str) -> Result<(), KeywordIndexError> {
        let doc = doc!(
            self.id_field => id,
            self.title_field => title,
            self.text_field => text,
        );

        self.writer
            .add_document(doc)
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    /// Commit all pending changes and refresh the reader
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// BM25 search over title and text, best first
    ///
    /// Blank queries and `limit == 0` yield no hits rather than an error.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, KeywordIndexError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser =
            QueryParser::for_index(&self.index, vec![self.title_field, self.text_field]);
        let (parsed, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Lenient query parse dropped parts of '{}'", query);
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| KeywordIndexError::SearchError("Missing ID field".to_string()))?;

            results.push(KeywordHit {
                id: id.to_string(),
                score,
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        Ok(results)
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
