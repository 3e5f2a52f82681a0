//! Common helpers shared across the SmartFit crates.

/// Settings document for models, detectors and the try-on chain.
pub mod config;
/// Seam blur and luminance equalization for composites.
pub mod enhance;
/// Image loading, resizing, luma and tensor conversion.
pub mod image_utils;
/// Atomic image output.
pub mod output;
/// Laplacian-variance sharpness scoring.
pub mod quality;
/// Stage timing for optional performance tracing.
pub mod telemetry;

use anyhow::Result;
use log::LevelFilter;

pub use config::{
    AttributeSettings, FaceDetectionSettings, ModelInput, ModelPaths, PoseSettings,
    SegmentationSettings, SmartFitSettings, TelemetrySettings, TryOnSettings,
};
pub use enhance::{ClaheSettings, PostProcessSettings, post_process};
pub use image_utils::{
    TensorLayout, limit_dimensions, load_image, luminance, resize_image, rgb_to_tensor,
    validate_image,
};
pub use output::save_image;
pub use quality::{
    Quality, UploadQuality, assess_upload, laplacian_variance, normalize_variance,
    sharpness_score,
};
pub use telemetry::{StageTimer, configure as configure_telemetry, timing_guard};

/// Initialize logging once for any SmartFit host process.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Calling this
/// more than once is harmless.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}
