//! patchcore: memory-bank anomaly detection over frozen patch features.
//!
//! A detector is fitted on normal images only. Each image is turned into an
//! S×S grid of patch descriptors taken from two depths of a frozen backbone;
//! a random subsample of all reference patches becomes the memory bank. A
//! query patch that lies far from every bank vector is anomalous.
//!
//! - [`feature`]: backbone taps → smoothed, aligned, concatenated patch grid
//! - [`memory`]: pooled + subsampled reference vectors, exact 1-NN search
//! - [`scoring`]: per-patch distances → image score, S×S map, heat map
//! - [`calibration`]: statistical (`mean + k·σ`) or metric-optimal threshold
//! - [`metrics`]: confusion matrix, ROC, AUC
//! - [`detector`]: fit / calibrate / predict in one type
//!
//! ```no_run
//! use patchcore::{AnomalyDetector, Image, PatchCoreConfig};
//!
//! # fn load() -> Vec<Image> { unimplemented!() }
//! let good: Vec<Image> = load();
//! let config = PatchCoreConfig::default();
//! let mut detector = AnomalyDetector::from_config(&config, &good)?;
//!
//! let labelled: Vec<Image> = load();
//! let labels = vec![false; labelled.len()];
//! detector.calibrate(&labelled, &labels)?;
//!
//! let p = detector.predict(&labelled[0])?;
//! println!("score {} anomalous {}", p.score, p.is_anomalous);
//! # Ok::<(), patchcore::AnomalyError>(())
//! ```
//!
//! # Critical Nuances
//!
//! ## Max, not mean
//!
//! The image score is the **largest** patch distance. Small defects touch a
//! handful of patches out of hundreds; any averaging drowns them in the
//! well-matched background.
//!
//! ## Why two taps
//!
//! Early activations are spatially precise but semantically shallow; late
//! activations are the opposite. Concatenating both after aligning them to a
//! common grid gives descriptors that catch both texture and structure
//! defects. The local average applied before alignment widens each patch's
//! receptive field without changing resolution.
//!
//! ## Exact search is the point
//!
//! The bank is small after subsampling (a few thousand vectors), so brute
//! force is fast and makes scores reproducible. Ties resolve to the lowest
//! bank index.
//!
//! ## Subsampling is uniform
//!
//! The kept set is a uniform random draw, not a coreset. With a fixed seed
//! two builds are identical; with no seed each build differs.

pub mod calibration;
pub mod config;
pub mod detector;
pub mod distance;
pub mod error;
pub mod feature;
pub mod image;
pub mod memory;
pub mod metrics;
pub mod scoring;
pub mod simd;

pub use calibration::{
    calibrate, calibrate_by_metric, calibrate_statistical, calibrate_with_metric,
    CalibrationConfig, CalibrationMetric, Threshold, ThresholdPolicy,
};
pub use config::PatchCoreConfig;
pub use detector::{AnomalyDetector, Prediction};
pub use error::{AnomalyError, Result};
pub use feature::{
    Backbone, ConvBackbone, ConvBackboneConfig, ExtractorConfig, FeatureExtractor, FeatureMap,
    GridAlignment, PatchGrid,
};
pub use image::{ChannelNorm, Image, ImageShape};
pub use memory::{BankConfig, BuildReport, MemoryBank, Neighbor};
pub use metrics::{roc_auc, roc_curve, ConfusionMatrix, RocPoint};
pub use scoring::{score_grid, AnomalyMap, AnomalyScorer, HeatMap, ScoredImage};
