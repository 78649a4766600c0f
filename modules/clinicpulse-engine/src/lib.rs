pub mod bayes;
pub mod composite;
pub mod nps;
pub mod samples;
pub mod scoring;
pub mod selector;

pub use bayes::{adjusted_rating, compute_priors, Prior};
pub use composite::composite_score;
pub use nps::nps_score;
pub use samples::{gather_samples, AttributeSamples, DataError};
pub use scoring::{
    compute_establishment_score, EstablishmentOutcome, ScoreStore, ScoringParams, ScoringRun,
    ScoringSummary,
};
pub use selector::select_pending;
