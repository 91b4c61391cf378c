use std::fmt::Write;

use clap::ValueEnum;

use crate::publisher::PublishedArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Markdown => "md",
        }
    }
}

pub fn render(artifact: &PublishedArtifact, format: ExportFormat) -> anyhow::Result<String> {
    match format {
        ExportFormat::Csv => render_csv(artifact),
        ExportFormat::Markdown => Ok(build_report(artifact)),
    }
}

pub fn render_csv(artifact: &PublishedArtifact) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "rank",
        "student_id",
        "name",
        "department",
        "gpa",
        "source_document",
    ])?;

    for entry in &artifact.records {
        writer.write_record([
            entry.rank.to_string(),
            entry.record.student_id.clone(),
            entry.record.name.clone(),
            entry.record.department.clone(),
            format!("{:.2}", entry.record.gpa),
            entry.record.source.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV export: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn build_report(artifact: &PublishedArtifact) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Faculty Graduation Ranking");
    let _ = writeln!(
        output,
        "Generated {} from {} department list(s) (artifact {})",
        artifact.generated_at.format("%Y-%m-%d %H:%M UTC"),
        artifact.inputs.len(),
        artifact.id
    );
    let _ = writeln!(output);

    if artifact.records.is_empty() {
        let _ = writeln!(output, "No students found in the uploaded lists.");
        return output;
    }

    let _ = writeln!(output, "| Rank | Student ID | Name | Department | GPA |");
    let _ = writeln!(output, "|---:|---|---|---|---:|");
    for entry in &artifact.records {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {:.2} |",
            entry.rank,
            entry.record.student_id,
            entry.record.name,
            entry.record.department,
            entry.record.gpa
        );
    }

    output
}
