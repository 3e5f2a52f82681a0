use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use image::{RgbImage, imageops::FilterType};
use log::{debug, warn};
use smartfit_utils::{ModelInput, TensorLayout, resize_image, rgb_to_tensor, timing_guard};
use tract_onnx::prelude::*;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A pretrained ONNX graph prepared for repeated inference.
///
/// Construction parses and optimizes the graph, which is expensive; build one
/// per worker (or share one behind an `Arc`) and reuse it across calls.
#[derive(Debug)]
pub struct OnnxModel {
    name: &'static str,
    runnable: RunnableModel,
    input: ModelInput,
}

impl OnnxModel {
    /// Load `model_path`, pinning its first input to the shape described by `input`.
    pub fn load<P: AsRef<Path>>(
        name: &'static str,
        model_path: P,
        input: ModelInput,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(
            path.exists(),
            "{name} model file not found: {}",
            path.display()
        );
        anyhow::ensure!(
            input.width > 0 && input.height > 0,
            "{name} model input dimensions must be greater than zero"
        );

        let runnable = match load_runnable_model(path, input, true) {
            Ok(model) => {
                debug!(
                    "{name} model {} optimized ({}x{})",
                    path.display(),
                    input.width,
                    input.height
                );
                model
            }
            Err(opt_err) => {
                let optimize_msg = format!("{opt_err}");
                let mut chain_msg = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain_msg, "  - {cause}");
                }
                warn!(
                    "{name} model {} failed optimized load ({}); using decluttered graph.\nError chain:\n{}",
                    path.display(),
                    optimize_msg,
                    chain_msg.trim_end()
                );
                load_runnable_model(path, input, false).with_context(|| {
                    format!("fallback to decluttered {name} graph failed after: {optimize_msg}")
                })?
            }
        };

        Ok(Self {
            name,
            runnable,
            input,
        })
    }

    /// Resize `image` to the model input, normalise it and return every output tensor.
    pub fn run(&self, image: &RgbImage) -> Result<Vec<Tensor>> {
        let _guard = timing_guard(format!("smartfit_core::{}::run", self.name), log::Level::Debug);
        let (w, h) = image.dimensions();
        anyhow::ensure!(w > 0 && h > 0, "{} input image is empty", self.name);

        let resized;
        let source = if (w, h) == (self.input.width, self.input.height) {
            image
        } else {
            resized = resize_image(
                image,
                self.input.width,
                self.input.height,
                FilterType::Triangle,
            );
            &resized
        };
        let array = rgb_to_tensor(source, self.input.layout, self.input.mean, self.input.std);
        let shape = array.shape().to_vec();
        let (data, offset) = array.into_raw_vec_and_offset();
        debug_assert_eq!(offset, Some(0), "expected contiguous array");
        let tensor = Tensor::from_shape(&shape, &data)
            .map_err(|e| anyhow::anyhow!("failed to build {} input tensor: {e}", self.name))?;

        let outputs = self
            .runnable
            .run(tvec![tensor.into()])
            .map_err(|e| anyhow::anyhow!("{} execution failed: {e}", self.name))?;
        anyhow::ensure!(!outputs.is_empty(), "{} model produced no outputs", self.name);

        Ok(outputs.into_iter().map(|value| value.into_tensor()).collect())
    }

    pub fn input(&self) -> ModelInput {
        self.input
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Flatten an output tensor into `f32` values.
pub(crate) fn output_values<'a>(tensor: &'a Tensor, what: &str) -> Result<&'a [f32]> {
    tensor
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{what} output is not f32: {e}"))
}

fn input_shape(input: ModelInput) -> [usize; 4] {
    let (w, h) = (input.width as usize, input.height as usize);
    match input.layout {
        TensorLayout::Nchw => [1, 3, h, w],
        TensorLayout::Nhwc => [1, h, w, 3],
    }
}

fn load_runnable_model(path: &Path, input: ModelInput, optimized: bool) -> Result<RunnableModel> {
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("failed to parse ONNX graph from {}", path.display()))?
        .with_input_fact(0, f32::fact(input_shape(input)).into())
        .map_err(|e| anyhow::anyhow!("unable to pin input shape: {e}"))?;

    if optimized {
        model
            .into_optimized()
            .map_err(|e| anyhow::anyhow!("unable to optimize graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    } else {
        model
            .into_typed()
            .map_err(|e| anyhow::anyhow!("unable to type-check graph: {e}"))?
            .into_decluttered()
            .map_err(|e| anyhow::anyhow!("unable to declutter graph: {e}"))?
            .into_runnable()
            .map_err(|e| anyhow::anyhow!("unable to make graph runnable: {e}"))
    }
}
