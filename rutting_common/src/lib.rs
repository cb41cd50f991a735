pub mod asset;
pub mod chart;
pub mod chart_raster;
pub mod classifier;
pub mod config;
pub mod export;
pub mod font;
pub mod session;
pub mod severity;

pub use asset::{AssetId, AssetOrigin, AssetSet, FileInput, ImageAsset};
pub use chart::{render, ChartSpec};
pub use classifier::{Classifier, ClassifyError, HttpClassifier, PredictionResult};
pub use config::Config;
pub use export::{ExportArtifact, ExportComposer, RouteContext};
pub use session::{BoundResult, InferenceSession, SessionError, SessionStatus};
pub use severity::{SeverityClass, SeverityCounts};
