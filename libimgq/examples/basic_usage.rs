//! Basic usage example for the imgq library.
//!
//! Lists the tags of a repository on a local registry, then resolves every
//! `3.x` tag for two platforms and prints the newest images first.
//!
//! Run with: cargo run --example basic_usage

use libimgq::format::{format_labels, format_timestamp, short_digest};
use libimgq::{ImageQuery, Imgq};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("imgq Library - Basic Usage Example\n");

    let imgq = Imgq::connect("http://localhost:5000")?;
    let repository = "localhost:5000/alpine";

    println!("Fetching tags for '{}'...", repository);
    match imgq.list_tags(repository, "/.*/").await {
        Ok(tags) => {
            println!("✓ Found {} tags:\n", tags.len());
            for tag in tags.iter().take(5) {
                println!("  - {}:{}", repository, tag);
            }
            if tags.len() > 5 {
                println!("  ... and {} more", tags.len() - 5);
            }
            println!();
        }
        Err(e) => {
            eprintln!("✗ Failed to fetch tags: {}", e);
            eprintln!("  Make sure a registry is running at http://localhost:5000");
            return Ok(());
        }
    }

    let query = ImageQuery::new(repository)
        .tag_pattern(r"/^3\.\d+$/")
        .platform("linux/amd64")
        .platform("linux/arm64");

    println!("Resolving tags matching {}...", query.tag_pattern);
    let outcome = imgq.query(&query).await;
    for image in &outcome.results {
        println!(
            "  {:10} {:14} {} {:16} {}",
            image.tag,
            image.platform,
            short_digest(&image.image_digest),
            format_timestamp(&image.build_timestamp),
            format_labels(&image.labels, ",")
        );
    }

    if let Some(error) = outcome.error {
        eprintln!("✗ Query stopped early: {}", error);
    } else {
        println!("\n✓ Resolved {} images", outcome.results.len());
    }

    Ok(())
}
