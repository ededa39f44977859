pub mod multilingual;
pub mod significance;
pub mod utm;

pub use multilingual::MultilingualText;
pub use significance::calculate_statistical_significance;
pub use utm::{capture_utm, UtmParams};
