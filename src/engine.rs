use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AggregationError;
use crate::models::{DocumentId, RankedRecord, RankingRecord, SourceDocument};
use crate::parse::ParserSet;

/// Merges department ranking lists into one faculty-wide ranking.
#[derive(Clone)]
pub struct AggregationEngine {
    parsers: ParserSet,
}

impl AggregationEngine {
    pub fn new(parsers: ParserSet) -> Self {
        Self { parsers }
    }

    /// All-or-nothing: the first unreadable document or duplicate student
    /// aborts the whole generation.
    pub async fn generate(
        &self,
        documents: &[Arc<SourceDocument>],
    ) -> Result<Vec<RankedRecord>, AggregationError> {
        if documents.is_empty() {
            return Err(AggregationError::EmptyInput);
        }

        let mut parsed = Vec::with_capacity(documents.len());
        for document in documents {
            let records = self.parse_document(document).await?;
            debug!(
                document_id = %document.id,
                records = records.len(),
                "parsed department ranking"
            );
            parsed.push(records);
        }

        let merged = merge(parsed)?;
        let ranked = rank(merged);
        info!(
            documents = documents.len(),
            records = ranked.len(),
            "faculty ranking generated"
        );
        Ok(ranked)
    }

    async fn parse_document(
        &self,
        document: &Arc<SourceDocument>,
    ) -> Result<Vec<RankingRecord>, AggregationError> {
        let document_id = document.id;
        let failure = |reason: String| AggregationError::ParseFailure {
            document_id,
            reason,
        };

        let media_type = document
            .media_type
            .ok_or_else(|| failure(format!("unsupported media type {}", document.declared_type)))?;
        let parser = self
            .parsers
            .for_media(media_type)
            .ok_or_else(|| failure(format!("no parser registered for {}", media_type.as_mime())))?;

        let owned = Arc::clone(document);
        tokio::task::spawn_blocking(move || parser.parse(&owned))
            .await
            .map_err(|e| failure(format!("parser stopped unexpectedly: {e}")))?
            .map_err(failure)
    }
}

/// Unions parsed documents, rejecting any student id seen twice.
pub fn merge(parsed: Vec<Vec<RankingRecord>>) -> Result<Vec<RankingRecord>, AggregationError> {
    let mut seen: HashMap<String, DocumentId> = HashMap::new();
    let mut merged = Vec::with_capacity(parsed.iter().map(Vec::len).sum());

    for record in parsed.into_iter().flatten() {
        if let Some(first) = seen.insert(record.student_id.clone(), record.source) {
            return Err(AggregationError::DuplicateStudent {
                student_id: record.student_id,
                first_document: first,
                second_document: record.source,
            });
        }
        merged.push(record);
    }

    Ok(merged)
}

/// GPA descending, then name, then student id. Ranks are strictly sequential.
pub fn compare_records(a: &RankingRecord, b: &RankingRecord) -> Ordering {
    b.gpa
        .total_cmp(&a.gpa)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.student_id.cmp(&b.student_id))
}

pub fn rank(mut records: Vec<RankingRecord>) -> Vec<RankedRecord> {
    records.sort_by(compare_records);
    records
        .into_iter()
        .zip(1u32..)
        .map(|(record, rank)| RankedRecord { rank, record })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeRegistry;

    fn csv(rows: &[(&str, &str, &str, &str)]) -> Vec<u8> {
        let mut out = String::from("student_id,name,department,gpa\n");
        for (id, name, department, gpa) in rows {
            out.push_str(&format!("{id},{name},{department},{gpa}\n"));
        }
        out.into_bytes()
    }

    fn engine() -> AggregationEngine {
        AggregationEngine::new(ParserSet::standard())
    }

    fn names(ranked: &[RankedRecord]) -> Vec<(u32, String)> {
        ranked
            .iter()
            .map(|r| (r.rank, r.record.name.clone()))
            .collect()
    }

    #[tokio::test]
    async fn empty_input_fails_without_work() {
        let err = engine().generate(&[]).await.unwrap_err();
        assert_eq!(err, AggregationError::EmptyInput);
    }

    #[tokio::test]
    async fn equal_gpa_breaks_ties_alphabetically() {
        let mut registry = IntakeRegistry::new();
        registry.submit(csv(&[("2", "Bob", "EE", "3.9")]), "ee.csv", "text/csv");
        registry.submit(csv(&[("1", "Alice", "CS", "3.9")]), "cs.csv", "text/csv");

        let ranked = engine()
            .generate(&registry.accepted_documents())
            .await
            .unwrap();
        assert_eq!(
            names(&ranked),
            vec![(1, "Alice".to_string()), (2, "Bob".to_string())]
        );
    }

    #[tokio::test]
    async fn merges_all_records_sorted_by_gpa() {
        let mut registry = IntakeRegistry::new();
        registry.submit(
            csv(&[("10", "Deniz", "CS", "3.10"), ("11", "Ece", "CS", "3.75")]),
            "cs.csv",
            "text/csv",
        );
        registry.submit(
            csv(&[("20", "Fatma", "ME", "3.95"), ("21", "Gul", "ME", "2.80")]),
            "me.csv",
            "text/csv",
        );

        let ranked = engine()
            .generate(&registry.accepted_documents())
            .await
            .unwrap();
        assert_eq!(ranked.len(), 4);
        assert_eq!(
            names(&ranked),
            vec![
                (1, "Fatma".to_string()),
                (2, "Ece".to_string()),
                (3, "Deniz".to_string()),
                (4, "Gul".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_student_fails_the_run() {
        let mut registry = IntakeRegistry::new();
        let first = registry.submit(csv(&[("42", "Alice", "CS", "3.9")]), "cs.csv", "text/csv");
        let second = registry.submit(csv(&[("42", "Alice", "EE", "3.1")]), "ee.csv", "text/csv");

        let err = engine()
            .generate(&registry.accepted_documents())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AggregationError::DuplicateStudent {
                student_id: "42".to_string(),
                first_document: first.id,
                second_document: second.id,
            }
        );
    }

    #[tokio::test]
    async fn duplicate_inside_one_document_names_it_twice() {
        let mut registry = IntakeRegistry::new();
        let only = registry.submit(
            csv(&[("7", "Alice", "CS", "3.9"), ("7", "Berk", "CS", "3.2")]),
            "cs.csv",
            "text/csv",
        );

        let err = engine()
            .generate(&registry.accepted_documents())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AggregationError::DuplicateStudent {
                student_id: "7".to_string(),
                first_document: only.id,
                second_document: only.id,
            }
        );
    }

    #[tokio::test]
    async fn one_unreadable_document_fails_everything() {
        let mut registry = IntakeRegistry::new();
        registry.submit(csv(&[("1", "Alice", "CS", "3.9")]), "cs.csv", "text/csv");
        let broken = registry.submit(b"name\nAlice\n".to_vec(), "bad.csv", "text/csv");

        match engine().generate(&registry.accepted_documents()).await {
            Err(AggregationError::ParseFailure { document_id, .. }) => {
                assert_eq!(document_id, broken.id)
            }
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_uploads_do_not_affect_generation() {
        let mut registry = IntakeRegistry::new();
        registry.submit(csv(&[("1", "Alice", "CS", "3.9")]), "cs.csv", "text/csv");
        let docx = registry.submit(
            b"PK".to_vec(),
            "letter.docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        );

        let accepted = registry.accepted_documents();
        assert!(accepted.iter().all(|d| d.id != docx.id));
        let ranked = engine().generate(&accepted).await.unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[tokio::test]
    async fn regenerating_unchanged_inputs_is_identical() {
        let mut registry = IntakeRegistry::new();
        registry.submit(
            csv(&[("3", "Cem", "CS", "3.5"), ("1", "Ayse", "CS", "3.5")]),
            "cs.csv",
            "text/csv",
        );
        registry.submit(csv(&[("2", "ayse", "EE", "3.5")]), "ee.csv", "text/csv");

        let documents = registry.accepted_documents();
        let first = engine().generate(&documents).await.unwrap();
        let second = engine().generate(&documents).await.unwrap();
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|r| r.record.student_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn tie_on_name_falls_back_to_student_id() {
        let source = DocumentId::new();
        let record = |id: &str| RankingRecord {
            student_id: id.to_string(),
            name: "Alice".to_string(),
            department: "CS".to_string(),
            gpa: 3.0,
            source,
        };
        let ranked = rank(vec![record("b"), record("a")]);
        assert_eq!(ranked[0].record.student_id, "a");
        assert_eq!(ranked[1].rank, 2);
    }
}
