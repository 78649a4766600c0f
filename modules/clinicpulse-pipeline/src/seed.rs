//! Establishment seeding from a JSON file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use clinicpulse_common::Establishment;
use clinicpulse_store::Store;

#[derive(Debug, Deserialize)]
struct SeedEstablishment {
    display_name: String,
    google_url: String,
    website: String,
}

/// Load establishments from a JSON array and upsert them, keyed by Google
/// URL. Rows with missing fields are skipped with a warning.
pub async fn seed_establishments(store: &Store, path: &Path) -> Result<u32> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let entries: Vec<SeedEstablishment> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))?;

    let mut seeded = 0u32;
    for entry in entries {
        if entry.display_name.trim().is_empty()
            || entry.google_url.trim().is_empty()
            || entry.website.trim().is_empty()
        {
            warn!(name = entry.display_name.as_str(), "Skipping seed row with missing data");
            continue;
        }

        let website = clean_website_url(&entry.website);
        let trustpilot_domain = match trustpilot_domain(&website) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(name = entry.display_name.as_str(), error = %e, "Skipping seed row with bad website");
                continue;
            }
        };

        let establishment = Establishment {
            id: Uuid::new_v4(),
            display_name: entry.display_name.trim().to_string(),
            google_url: entry.google_url.trim().to_string(),
            website,
            trustpilot_domain,
            google_last_scraped: None,
            trustpilot_last_scraped: None,
        };

        let id = store.upsert_establishment(&establishment).await?;
        info!(name = establishment.display_name.as_str(), id = %id, "Seeded establishment");
        seeded += 1;
    }

    info!(seeded, "Seeding complete");
    Ok(seeded)
}

/// Normalize a website URL: strip query parameters, force https, drop the
/// trailing slash.
fn clean_website_url(website: &str) -> String {
    let mut website = website.trim();
    if let Some((base, _query)) = website.split_once('?') {
        website = base;
    }
    let mut cleaned = if website.starts_with("http://") || website.starts_with("https://") {
        website.to_string()
    } else {
        format!("https://{website}")
    };
    while cleaned.ends_with('/') {
        cleaned.pop();
    }
    cleaned
}

/// The bare domain Trustpilot indexes a company under: the website host
/// without its `www.` prefix.
fn trustpilot_domain(website: &str) -> Result<String> {
    let parsed = url::Url::parse(website).context("Invalid website URL")?;
    let Some(host) = parsed.host_str() else {
        bail!("Website URL has no host: {website}");
    };
    Ok(host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_cleaning_strips_query_and_slash_and_forces_https() {
        assert_eq!(
            clean_website_url("www.clinic.example/?utm=x"),
            "https://www.clinic.example"
        );
        assert_eq!(
            clean_website_url("https://clinic.example/path/"),
            "https://clinic.example/path"
        );
        assert_eq!(
            clean_website_url("http://clinic.example"),
            "http://clinic.example"
        );
    }

    #[test]
    fn trustpilot_domain_drops_www() {
        assert_eq!(
            trustpilot_domain("https://www.clinic.example").unwrap(),
            "clinic.example"
        );
        assert_eq!(
            trustpilot_domain("https://clinic.example/about").unwrap(),
            "clinic.example"
        );
    }

    #[test]
    fn bad_website_is_an_error() {
        assert!(trustpilot_domain("not a url").is_err());
    }
}
