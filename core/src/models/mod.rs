pub mod anomaly;
pub mod feature;
pub mod observation;
pub mod window;

pub use anomaly::AnomalyEvent;
pub use feature::{FeatureRecord, Stat, WindowStats};
pub use observation::Observation;
pub use window::{Thresholds, WindowSpec};
