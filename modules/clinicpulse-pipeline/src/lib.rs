pub mod bridge;
pub mod enrichment;
pub mod oracle;
pub mod scrape;
pub mod seed;
pub mod unifier;
