use logo_scraper::config::{AppConfig, BackoffStrategy};
use std::path::{Path, PathBuf};
use wiremock::MockServer;

/// Built-in configuration with every source pointed at `server`.
///
/// Routes: `/primary/<domain>`, `/ddg/<domain>.ico`, `/google/<domain>`.
/// Retries are fast so transient-failure tests finish quickly.
pub fn config_for(server: &MockServer, output_dir: &Path) -> AppConfig {
    let mut config = AppConfig::builtin().expect("built-in configuration is valid");
    let uri = server.uri();

    config.sources[0].url_template = format!("{}/primary/{{domain}}?size={{size}}", uri);
    config.sources[1].url_template = format!("{}/ddg/{{domain}}.ico", uri);
    config.sources[2].url_template = format!("{}/google/{{domain}}", uri);
    for source in &mut config.sources {
        source.requests_per_second = 0;
    }

    config.http.request_timeout_secs = 1;
    config.processing.output_dir = output_dir.to_path_buf();
    config.processing.output_size = 64;
    config.processing.batch_size = 2;
    config.processing.workers = 2;
    config.output.summary_file = "logo_summary.json".to_string();

    config.retry.max_retries = 2;
    config.retry.backoff_strategy = BackoffStrategy::Linear;
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config.retry.jitter_ratio = 0.0;

    config.validate().expect("test configuration is valid");
    config
}

/// Write a CSV company list using the column names real exports carry
pub fn write_companies_csv(dir: &Path, rows: &[(&str, &str, &str)]) -> PathBuf {
    let path = dir.join("companies.csv");
    let mut content = String::from("ID,CompanyName,WebsiteURL,Country\n");
    for (id, name, website) in rows {
        content.push_str(&format!("{},{},{},US\n", id, name, website));
    }
    std::fs::write(&path, content).expect("write companies CSV");
    path
}
