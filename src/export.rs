use crate::batch::BatchSummary;
use crate::company::{CompanyRecord, OutcomeStatus, ProcessingOutcome};
use anyhow::{Context, Result};
use csv::Writer;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Export the batch summary as pretty-printed JSON
pub fn export_summary(summary: &BatchSummary, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize batch summary")?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create summary file: {}", output_path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("Failed to write batch summary to: {}", output_path.display()))?;

    info!("Wrote run summary to {}", output_path.display());
    Ok(())
}

/// Export the input companies with their logo outcome appended.
///
/// Rows keep input order. Companies with no outcome (filtered out before the
/// run) are written with empty outcome columns.
pub fn export_enriched_csv(
    companies: &[CompanyRecord],
    outcomes: &[ProcessingOutcome],
    output_path: &Path,
) -> Result<()> {
    debug!("Exporting {} companies to CSV: {}", companies.len(), output_path.display());

    let by_id: HashMap<&str, &ProcessingOutcome> = outcomes.iter().map(|o| (o.id.as_str(), o)).collect();

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create enriched output: {}", output_path.display()))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record([
        "ID",
        "CompanyName",
        "WebsiteURL",
        "Country",
        "Domain",
        "LogoGenerated",
        "LogoSource",
        "LogoService",
        "ElapsedMs",
        "Error",
    ])?;

    for company in companies {
        let outcome = by_id.get(company.id.as_str());
        let generated = outcome.is_some_and(|o| o.status.has_logo());
        let source = outcome.map(|o| o.status.label()).unwrap_or_default();
        let domain = outcome
            .and_then(|o| o.domain.as_ref())
            .map(|d| d.to_string())
            .unwrap_or_default();
        let service = outcome.and_then(|o| o.service.clone()).unwrap_or_default();
        let elapsed = match outcome {
            Some(o) if matches!(o.status, OutcomeStatus::Saved(_) | OutcomeStatus::Failed) => {
                o.elapsed_ms.to_string()
            }
            _ => String::new(),
        };
        let error = outcome.and_then(|o| o.error.clone()).unwrap_or_default();

        wtr.write_record([
            company.id.as_str(),
            company.name.as_str(),
            company.website.as_deref().unwrap_or_default(),
            company.country.as_deref().unwrap_or_default(),
            domain.as_str(),
            if generated { "true" } else { "false" },
            source,
            service.as_str(),
            elapsed.as_str(),
            error.as_str(),
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} companies to CSV: {}", companies.len(), output_path.display());

    Ok(())
}

/// Console summary printed at the end of a run
pub fn print_run_summary(summary: &BatchSummary, output_dir: &Path) {
    println!("\n=== Logo Summary ===");
    println!("Companies: {}", summary.total_companies);
    if summary.duplicates_removed > 0 {
        println!("Duplicate IDs ignored: {}", summary.duplicates_removed);
    }
    println!("Processed this run: {}", summary.attempted);
    for (source, count) in &summary.succeeded_by_source {
        println!("  {:<8} {}", source, count);
    }
    println!("Already present: {}", summary.skipped_existing);
    if summary.failed > 0 {
        println!("Failed to save: {}", summary.failed);
    }
    if summary.abandoned > 0 {
        println!("Abandoned (interrupted): {}", summary.abandoned);
    }
    if let Some(rate) = summary.success_rate() {
        println!("{} Success rate: {:.1}%", crate::batch::progress_band(rate), rate);
    }
    if let Some(rate) = summary.external_rate() {
        println!("From logo services: {:.1}%", rate);
    }
    println!(
        "Duration: {} over {} batch(es)",
        crate::batch::format_duration(std::time::Duration::from_secs_f64(summary.total_duration_secs)),
        summary.batches
    );
    println!("Logos: {}", output_dir.display());
    println!("====================\n");

    if summary.interrupted {
        println!("⚠️  Run interrupted. Re-run the same command to resume.");
    } else {
        println!("✅ Done.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::company::SourceTag;
    use crate::domain_utils::normalize_domain;
    use tempfile::TempDir;

    #[test]
    fn test_export_enriched_csv() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("enriched.csv");

        let companies = vec![
            CompanyRecord::new("1", "Acme").with_website("https://acme.com"),
            CompanyRecord::new("2", "Globex"),
            CompanyRecord::new("3", "Initech"),
        ];
        let outcomes = vec![
            ProcessingOutcome {
                id: "1".to_string(),
                status: OutcomeStatus::Saved(SourceTag::Primary),
                domain: normalize_domain("acme.com").ok(),
                service: Some("clearbit".to_string()),
                elapsed_ms: 120,
                error: None,
            },
            ProcessingOutcome::existing("2"),
            ProcessingOutcome::abandoned("3"),
        ];

        export_enriched_csv(&companies, &outcomes, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[6], "LogoSource");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][4], "acme.com");
        assert_eq!(&rows[0][5], "true");
        assert_eq!(&rows[0][6], "primary");
        assert_eq!(&rows[0][7], "clearbit");
        assert_eq!(&rows[0][8], "120");
        assert_eq!(&rows[1][5], "true");
        assert_eq!(&rows[1][6], "existing");
        assert_eq!(&rows[2][5], "false");
        assert_eq!(&rows[2][6], "abandoned");
        assert!(!rows[2][9].is_empty());
    }

    #[test]
    fn test_export_summary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("summary.json");
        let mut summary = BatchSummary::new();
        summary.record(&ProcessingOutcome::existing("1"));

        export_summary(&summary, &path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["skipped_existing"], 1);
        assert!(json["started_at"].is_string());
    }
}
