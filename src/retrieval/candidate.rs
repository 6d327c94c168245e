//! Scored candidates and ranked lists

use crate::catalog::Document;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Which stage produced a candidate's score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Lexical,
    Semantic,
    Fused,
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateSource::Lexical => "lexical",
            CandidateSource::Semantic => "semantic",
            CandidateSource::Fused => "fused",
        };
        f.write_str(name)
    }
}

/// A document with the score assigned by one stage
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub document: Arc<Document>,
    pub score: f32,
    pub source: CandidateSource,
}

impl ScoredCandidate {
    pub fn new(document: Arc<Document>, score: f32, source: CandidateSource) -> Self {
        Self {
            document,
            score,
            source,
        }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    /// First `max_chars` characters of the document text
    pub fn preview(&self, max_chars: usize) -> String {
        let text = &self.document.text;
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.clone(),
        }
    }
}

/// Candidates in rank order, unique by document id
///
/// Rank is the 1-based position. Construction keeps the first occurrence of an id.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RankedList {
    candidates: Vec<ScoredCandidate>,
}

impl RankedList {
    pub fn new(candidates: Vec<ScoredCandidate>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let candidates = candidates
            .into_iter()
            .filter(|c| seen.insert(c.document.id.clone()))
            .collect();
        Self { candidates }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredCandidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[ScoredCandidate] {
        &self.candidates
    }

    /// 1-based rank of a document id
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|c| c.document.id == id)
            .map(|p| p + 1)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.id()).collect()
    }

    pub fn truncate(&mut self, len: usize) {
        self.candidates.truncate(len);
    }

    pub fn into_vec(self) -> Vec<ScoredCandidate> {
        self.candidates
    }
}

impl IntoIterator for RankedList {
    type Item = ScoredCandidate;
    type IntoIter = std::vec::IntoIter<ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a ScoredCandidate;
    type IntoIter = std::slice::Iter<'a, ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentMetadata;

    fn candidate(id: &str, score: f32) -> ScoredCandidate {
        let doc = Document::new(id, format!("text {}", id), DocumentMetadata::default());
        ScoredCandidate::new(Arc::new(doc), score, CandidateSource::Lexical)
    }

    #[test]
    fn test_deduplication_keeps_first() {
        let list = RankedList::new(vec![
            candidate("1", 0.9),
            candidate("2", 0.8),
            candidate("1", 0.7),
        ]);

        assert_eq!(list.len(), 2);
        assert_eq!(list.ids(), vec!["1", "2"]);
        assert_eq!(list.as_slice()[0].score, 0.9);
    }

    #[test]
    fn test_rank_of_is_one_based() {
        let list = RankedList::new(vec![candidate("a", 2.0), candidate("b", 1.0)]);
        assert_eq!(list.rank_of("a"), Some(1));
        assert_eq!(list.rank_of("b"), Some(2));
        assert_eq!(list.rank_of("c"), None);
    }

    #[test]
    fn test_preview_is_char_safe() {
        let doc = Document::new("x", "Điện thoại", DocumentMetadata::default());
        let c = ScoredCandidate::new(Arc::new(doc), 1.0, CandidateSource::Fused);
        assert_eq!(c.preview(2), "Đi...");
        assert_eq!(c.preview(50), "Điện thoại");
    }
}
