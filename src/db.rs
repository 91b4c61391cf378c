use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ArtifactId, DocumentId, RankedRecord, RankingRecord, RunId};
use crate::publisher::PublishedArtifact;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores a published artifact. Returns `false` when it was already archived.
pub async fn archive_artifact(pool: &PgPool, artifact: &PublishedArtifact) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    let inputs: Vec<Uuid> = artifact.inputs.iter().map(|id| id.0).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO faculty_ranking.artifacts (id, run_id, generated_at, inputs)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(artifact.id.0)
    .bind(artifact.run_id.0)
    .bind(artifact.generated_at)
    .bind(&inputs)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    for entry in &artifact.records {
        sqlx::query(
            r#"
            INSERT INTO faculty_ranking.entries
            (artifact_id, rank, student_id, full_name, department, gpa, source_document)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(artifact.id.0)
        .bind(entry.rank as i32)
        .bind(&entry.record.student_id)
        .bind(&entry.record.name)
        .bind(&entry.record.department)
        .bind(entry.record.gpa)
        .bind(entry.record.source.0)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(true)
}

pub async fn fetch_artifact(
    pool: &PgPool,
    id: ArtifactId,
) -> anyhow::Result<Option<PublishedArtifact>> {
    let Some(header) = sqlx::query(
        "SELECT run_id, generated_at, inputs FROM faculty_ranking.artifacts WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let rows = sqlx::query(
        "SELECT rank, student_id, full_name, department, gpa, source_document \
         FROM faculty_ranking.entries WHERE artifact_id = $1 ORDER BY rank",
    )
    .bind(id.0)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(RankedRecord {
            rank: row.get::<i32, _>("rank") as u32,
            record: RankingRecord {
                student_id: row.get("student_id"),
                name: row.get("full_name"),
                department: row.get("department"),
                gpa: row.get("gpa"),
                source: DocumentId(row.get("source_document")),
            },
        });
    }

    let inputs: Vec<Uuid> = header.get("inputs");
    let generated_at: DateTime<Utc> = header.get("generated_at");
    Ok(Some(PublishedArtifact {
        id,
        run_id: RunId(header.get("run_id")),
        generated_at,
        inputs: inputs.into_iter().map(DocumentId).collect(),
        records,
    }))
}
