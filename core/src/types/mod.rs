mod histogram;
mod hit_ratio;
mod top;

pub use histogram::{HistogramSnapshot, Percentile, RollingHistogram};
pub use hit_ratio::HitRatio;
pub use top::Top;
