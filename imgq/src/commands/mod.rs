//! Command handlers
//!
//! Handlers print to stdout, report failures on stderr and return the
//! process exit code.

use crate::context::AppContext;
use crate::format;
use libimgq::ImageQuery;
use libimgq::config::OutputFormat;
use tracing::{debug, info};

/// Arguments of `imgq query`
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub repository: String,
    pub tag: String,
    pub platforms: Vec<String>,
    pub labels: Vec<String>,
    pub most_recent: bool,
    pub format: Option<OutputFormat>,
    pub quiet: bool,
}

/// Splits a `key=value` label argument.
///
/// The value may itself contain `=`; the key may not be empty.
pub fn parse_label(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid label '{}': expected key=value", arg)),
    }
}

/// Builds the library query from CLI arguments.
pub fn build_query(args: &QueryArgs) -> Result<ImageQuery, String> {
    let mut query = ImageQuery::new(args.repository.as_str())
        .tag_pattern(args.tag.as_str())
        .most_recent_only(args.most_recent);

    for platform in &args.platforms {
        query = query.platform(platform.as_str());
    }
    for label in &args.labels {
        let (key, value) = parse_label(label)?;
        query = query.label(key, value);
    }

    Ok(query)
}

/// Handle `imgq query`
pub async fn handle_query(ctx: &AppContext, args: QueryArgs) -> i32 {
    let color = ctx.use_color();

    let query = match build_query(&args) {
        Ok(query) => query,
        Err(e) => {
            format::error(&e, color);
            return 1;
        }
    };

    let imgq = match ctx.engine() {
        Ok(imgq) => imgq,
        Err(e) => {
            format::error(&e.to_string(), color);
            return 1;
        }
    };

    info!(repository = %query.repository, pattern = %query.tag_pattern, "Running query");
    let outcome = imgq.query(&query).await;
    debug!(results = outcome.results.len(), complete = outcome.is_complete(), "Query finished");

    let format = args.format.unwrap_or_else(|| ctx.default_format());
    let mut code = 0;

    if args.quiet {
        for line in format::quiet_lines(&outcome.results) {
            println!("{}", line);
        }
    } else if outcome.results.is_empty() && format == OutputFormat::Pretty {
        if outcome.is_complete() {
            println!("No images found.");
        }
    } else {
        match format::format_results(&outcome.results, format) {
            Ok(output) => println!("{}", output.trim_end()),
            Err(e) => {
                format::error(&e, color);
                code = 1;
            }
        }
    }

    if let Some(error) = outcome.error {
        format::error(&error.to_string(), color);
        code = 1;
    }

    code
}

/// Handle `imgq tags`
pub async fn handle_tags(
    ctx: &AppContext,
    repository: &str,
    pattern: &str,
    format: Option<OutputFormat>,
) -> i32 {
    let color = ctx.use_color();

    let imgq = match ctx.engine() {
        Ok(imgq) => imgq,
        Err(e) => {
            format::error(&e.to_string(), color);
            return 1;
        }
    };

    let tags = match imgq.list_tags(repository, pattern).await {
        Ok(tags) => tags,
        Err(e) => {
            format::error(&e.to_string(), color);
            return 1;
        }
    };

    let format = format.unwrap_or_else(|| ctx.default_format());
    if tags.is_empty() && format == OutputFormat::Pretty {
        println!("No tags found.");
        return 0;
    }

    match format::format_tags(&tags, format) {
        Ok(output) => {
            println!("{}", output.trim_end());
            0
        }
        Err(e) => {
            format::error(&e, color);
            1
        }
    }
}

/// Version string for imgq and libimgq
pub fn version_string() -> String {
    format!(
        "imgq {}\nlibimgq {}",
        env!("CARGO_PKG_VERSION"),
        libimgq::version()
    )
}
