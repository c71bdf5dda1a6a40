//! Correlation evaluator
//!
//! Predicts a whole split in chunks and scores the predictions with the
//! squared Pearson correlation against the ground truth.

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::backend::Backend;

use crate::dataset::generator::{FaceBatcher, FaceItem};
use crate::dataset::Dataset;
use crate::model::cnn::VggVariant;
use crate::utils::error::{FaceAttributeError, Result};
use crate::utils::metrics::r_squared;

/// Predictions for every example, in dataset order
pub fn predict<B: Backend>(
    model: &VggVariant<B>,
    dataset: &Dataset,
    chunk_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let batcher = FaceBatcher::<B>::new();
    let mut predictions = Vec::with_capacity(dataset.len());

    for chunk in dataset.examples().chunks(chunk_size.max(1)) {
        let items: Vec<FaceItem> = chunk.iter().map(FaceItem::from_example).collect();
        let batch = batcher.batch(items, device);
        let output = model.forward(batch.images);
        let values = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| FaceAttributeError::Model(format!("Failed to read predictions: {:?}", e)))?;
        predictions.extend(values);
    }

    Ok(predictions)
}

/// Predictions paired with the split's targets
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub targets: Vec<f32>,
    pub predictions: Vec<f32>,
    pub r_squared: f64,
}

/// Predict `dataset` and compute R²; NaN when either side has zero variance
pub fn evaluate<B: Backend>(
    model: &VggVariant<B>,
    dataset: &Dataset,
    chunk_size: usize,
    device: &B::Device,
) -> Result<Evaluation> {
    let predictions = predict(model, dataset, chunk_size, device)?;
    let targets = dataset.targets();
    let r_squared = r_squared(&targets, &predictions);
    Ok(Evaluation {
        targets,
        predictions,
        r_squared,
    })
}

/// Squared correlation of the model's predictions on `dataset`
pub fn correlation<B: Backend>(
    model: &VggVariant<B>,
    dataset: &Dataset,
    chunk_size: usize,
    device: &B::Device,
) -> Result<f64> {
    Ok(evaluate(model, dataset, chunk_size, device)?.r_squared)
}
