use libimgq::ImageResult;
use libimgq::config::OutputFormat;
use libimgq::format::{format_labels, format_timestamp, short_digest};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// One row of the pretty query table
#[derive(Debug, Tabled)]
pub struct ImageRow {
    #[tabled(rename = "TAG")]
    pub tag: String,
    #[tabled(rename = "PLATFORM")]
    pub platform: String,
    #[tabled(rename = "DIGEST")]
    pub digest: String,
    #[tabled(rename = "BUILT")]
    pub built: String,
    #[tabled(rename = "LABELS")]
    pub labels: String,
}

impl From<&ImageResult> for ImageRow {
    fn from(result: &ImageResult) -> Self {
        Self {
            tag: result.tag.clone(),
            platform: result.platform.clone(),
            digest: short_digest(&result.image_digest).to_string(),
            built: format_timestamp(&result.build_timestamp),
            labels: format_labels(&result.labels, ","),
        }
    }
}

/// Format query results for output
pub fn format_results(results: &[ImageResult], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Pretty => {
            let rows: Vec<ImageRow> = results.iter().map(ImageRow::from).collect();
            Ok(Table::new(&rows).with(Style::empty()).to_string())
        }
        _ => serialize(results, format),
    }
}

/// Format a tag list for output
pub fn format_tags(tags: &[String], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Pretty => Ok(tags.join("\n")),
        _ => serialize(tags, format),
    }
}

fn serialize<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|e| format!("Failed to serialize to YAML: {}", e))
        }
        _ => serde_json::to_string_pretty(value)
            .map_err(|e| format!("Failed to serialize to JSON: {}", e)),
    }
}

/// Digest references for `--quiet`, first occurrence order
pub fn quiet_lines(results: &[ImageResult]) -> Vec<&str> {
    let mut lines: Vec<&str> = Vec::with_capacity(results.len());
    for result in results {
        if !lines.contains(&result.digest_url.as_str()) {
            lines.push(&result.digest_url);
        }
    }
    lines
}

/// Render an error line for stderr
pub fn error_line(message: &str, color: bool) -> String {
    if color {
        format!("{} {}", "✗".red().bold(), message)
    } else {
        format!("✗ {}", message)
    }
}

/// Print an error message to stderr
pub fn error(message: &str, color: bool) {
    eprintln!("{}", error_line(message, color));
}
