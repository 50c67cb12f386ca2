//! Similarity metrics driving the affine search.

pub mod trait_;
pub mod correlation;
pub mod mutual_information;

pub use trait_::{CostType, Metric};
pub use correlation::NormalizedCorrelation;
pub use mutual_information::MutualInformation;
