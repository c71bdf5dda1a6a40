//! VGG-style regression CNN
//!
//! The trunk is three groups of convolutional stages driven by the
//! hyperparameter space: every `conv0filters` and `conv1filters` entry adds a
//! stage of two 3x3 convolutions, every `conv2filters` entry a stage of three,
//! and every stage ends in 2x2 max pooling. The flattened features pass
//! through `num_fc` dense blocks (linear + ReLU + dropout) into a single
//! linear output. All weights use Xavier uniform initialisation.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};

use super::config::HyperparameterSpace;
use crate::utils::error::{FaceAttributeError, Result};

const KERNEL_SIZE: usize = 3;

fn xavier() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

/// 2x2 max pooling with stride 2
///
/// An odd trailing row or column is dropped, so `[N, C, H, W]` becomes
/// `[N, C, H / 2, W / 2]`. Built from reshape and `max_dim` rather than the
/// backend's pooling kernel.
pub fn max_pool_2x2<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let (h, w) = (height / 2, width / 2);

    let x = if height % 2 == 0 && width % 2 == 0 {
        x
    } else {
        x.slice([0..batch, 0..channels, 0..h * 2, 0..w * 2])
    };

    x.reshape([batch, channels, h, 2, w, 2])
        .max_dim(5)
        .max_dim(3)
        .reshape([batch, channels, h, w])
}

/// Same-padded convolutions with ReLU, followed by 2x2 max pooling
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    pub convs: Vec<Conv2d<B>>,
    pub relu: Relu,
}

impl<B: Backend> ConvStage<B> {
    pub fn new(in_channels: usize, out_channels: usize, depth: usize, device: &B::Device) -> Self {
        let convs = (0..depth)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                Conv2dConfig::new([input, out_channels], [KERNEL_SIZE, KERNEL_SIZE])
                    .with_padding(PaddingConfig2d::Same)
                    .with_initializer(xavier())
                    .init(device)
            })
            .collect();

        Self {
            convs,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(x, |x, conv| self.relu.forward(conv.forward(x)));
        max_pool_2x2(x)
    }
}

/// Linear layer with ReLU and dropout
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub linear: Linear<B>,
    pub dropout: Dropout,
    pub relu: Relu,
}

impl<B: Backend> DenseBlock<B> {
    pub fn new(inputs: usize, outputs: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(inputs, outputs)
                .with_initializer(xavier())
                .init(device),
            dropout: DropoutConfig::new(dropout).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.dropout.forward(self.relu.forward(self.linear.forward(x)))
    }
}

/// Attribute regressor
///
/// Input: `[batch, 1, height, width]`. Output: `[batch, 1]`.
#[derive(Module, Debug)]
pub struct VggVariant<B: Backend> {
    pub stages: Vec<ConvStage<B>>,
    pub dense: Vec<DenseBlock<B>>,
    pub head: Linear<B>,
    flatten_size: usize,
}

impl<B: Backend> VggVariant<B> {
    /// Build the network for `height` x `width` single-channel input
    ///
    /// The space is validated first; an invalid space allocates nothing.
    pub fn new(
        space: &HyperparameterSpace,
        height: usize,
        width: usize,
        device: &B::Device,
    ) -> Result<Self> {
        space.validate_for_input(height, width)?;

        let stage_plan = space
            .conv0filters
            .iter()
            .map(|&f| (f, 2))
            .chain(space.conv1filters.iter().map(|&f| (f, 2)))
            .chain(space.conv2filters.iter().map(|&f| (f, 3)));

        let mut channels = 1;
        let mut stages = Vec::with_capacity(space.num_pools());
        for (filters, depth) in stage_plan {
            stages.push(ConvStage::new(channels, filters, depth, device));
            channels = filters;
        }

        let (h, w) = space.pooled_dims(height, width);
        let flatten_size = channels * h * w;

        let mut features = flatten_size;
        let mut dense = Vec::with_capacity(space.num_fc);
        for _ in 0..space.num_fc {
            dense.push(DenseBlock::new(features, space.fcoutput, space.dropout, device));
            features = space.fcoutput;
        }

        let head = LinearConfig::new(features, 1)
            .with_initializer(xavier())
            .init(device);

        Ok(Self {
            stages,
            dense,
            head,
            flatten_size,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 1, height, width]
    ///
    /// # Returns
    /// * Predictions of shape [batch_size, 1]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.dense.iter().fold(x, |x, block| block.forward(x));
        self.head.forward(x)
    }

    /// Number of features entering the first dense layer
    pub fn flatten_size(&self) -> usize {
        self.flatten_size
    }

    /// One line per layer, Keras summary style
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (i, stage) in self.stages.iter().enumerate() {
            for conv in &stage.convs {
                let [out_channels, in_channels, _, _] = conv.weight.val().dims();
                lines.push(format!(
                    "stage {:<2} conv {}x{}  {:>4} -> {:<4} relu",
                    i, KERNEL_SIZE, KERNEL_SIZE, in_channels, out_channels
                ));
            }
            lines.push(format!("stage {:<2} maxpool 2x2", i));
        }
        lines.push(format!("flatten      {}", self.flatten_size));
        for block in &self.dense {
            let [inputs, outputs] = block.linear.weight.val().dims();
            lines.push(format!("dense        {:>6} -> {:<6} relu + dropout", inputs, outputs));
        }
        let [inputs, _] = self.head.weight.val().dims();
        lines.push(format!("output       {:>6} -> 1", inputs));
        lines.push(format!("parameters   {}", self.num_params()));
        lines
    }
}

/// Save with the compact recorder; the recorder appends `.mpk`
pub fn save_model<B: Backend>(model: &VggVariant<B>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    model
        .clone()
        .save_file(path, &CompactRecorder::new())
        .map_err(|e| FaceAttributeError::Model(format!("Failed to save model: {:?}", e)))
}

/// Rebuild the network for `space` and load weights saved by [`save_model`]
pub fn load_model<B: Backend>(
    space: &HyperparameterSpace,
    height: usize,
    width: usize,
    path: &Path,
    device: &B::Device,
) -> Result<VggVariant<B>> {
    VggVariant::new(space, height, width, device)?
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|e| FaceAttributeError::Model(format!("Failed to load model: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};
    use burn::tensor::TensorData;
    use tempfile::TempDir;

    type TestBackend = DefaultBackend;

    fn small_space() -> HyperparameterSpace {
        HyperparameterSpace {
            conv0filters: vec![16, 32],
            conv1filters: vec![],
            conv2filters: vec![],
            num_fc: 1,
            fcoutput: 64,
            dropout: 0.5,
            ..HyperparameterSpace::default()
        }
    }

    #[test]
    fn test_two_stage_model_shapes() {
        let device = Default::default();
        let model = VggVariant::<TestBackend>::new(&small_space(), IMAGE_HEIGHT, IMAGE_WIDTH, &device)
            .unwrap();

        // Two 2x2 pools: 150x130 -> 75x65 -> 37x32
        assert_eq!(model.stages.len(), 2);
        assert_eq!(model.flatten_size(), 32 * 37 * 32);
        assert_eq!(model.dense.len(), 1);

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, IMAGE_HEIGHT, IMAGE_WIDTH], &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 1]);
    }

    #[test]
    fn test_max_pool_floors_odd_sizes() {
        let device = Default::default();
        // 3x5 grid holding 0..15; the last row and column are dropped
        let values: Vec<f32> = (0..15).map(|v| v as f32).collect();
        let input =
            Tensor::<TestBackend, 4>::from_floats(TensorData::new(values, [1, 1, 3, 5]), &device);

        let pooled = max_pool_2x2(input);
        assert_eq!(pooled.dims(), [1, 1, 1, 2]);
        let pooled = pooled.into_data().to_vec::<f32>().unwrap();
        assert_eq!(pooled, vec![6.0, 8.0]);
    }

    #[test]
    fn test_backward_on_canonical_input() {
        let device = Default::default();
        let space = HyperparameterSpace {
            conv0filters: vec![2],
            conv1filters: vec![2],
            conv2filters: vec![],
            num_fc: 1,
            fcoutput: 4,
            dropout: 0.0,
            ..HyperparameterSpace::default()
        };
        let model =
            VggVariant::<TrainingBackend>::new(&space, IMAGE_HEIGHT, IMAGE_WIDTH, &device).unwrap();
        let input =
            Tensor::<TrainingBackend, 4>::ones([2, 1, IMAGE_HEIGHT, IMAGE_WIDTH], &device);

        let grads = model.forward(input).sum().backward();
        let grad = model.stages[0].convs[0].weight.grad(&grads).unwrap();
        assert_eq!(grad.dims(), [2, 1, 3, 3]);
        assert!(grad
            .into_data()
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .all(|g| g.is_finite()));
    }

    #[test]
    fn test_stage_depths() {
        let device = Default::default();
        let space = HyperparameterSpace {
            conv0filters: vec![4],
            conv1filters: vec![4],
            conv2filters: vec![8],
            num_fc: 0,
            ..HyperparameterSpace::default()
        };
        let model = VggVariant::<TestBackend>::new(&space, 32, 24, &device).unwrap();

        let depths: Vec<usize> = model.stages.iter().map(|s| s.convs.len()).collect();
        assert_eq!(depths, vec![2, 2, 3]);
        assert_eq!(model.flatten_size(), 8 * 4 * 3);
        assert!(model.dense.is_empty());

        let input = Tensor::<TestBackend, 4>::ones([3, 1, 32, 24], &device);
        assert_eq!(model.forward(input).dims(), [3, 1]);
    }

    #[test]
    fn test_invalid_space_rejected() {
        let device = Default::default();
        let space = HyperparameterSpace {
            dropout: 1.5,
            ..small_space()
        };
        let result = VggVariant::<TestBackend>::new(&space, IMAGE_HEIGHT, IMAGE_WIDTH, &device);
        assert!(matches!(result, Err(FaceAttributeError::Config(_))));
    }

    #[test]
    fn test_summary_lists_layers() {
        let device = Default::default();
        let model = VggVariant::<TestBackend>::new(&small_space(), IMAGE_HEIGHT, IMAGE_WIDTH, &device)
            .unwrap();
        let summary = model.summary();

        assert_eq!(summary.iter().filter(|l| l.contains("conv")).count(), 4);
        assert!(summary.iter().any(|l| l.contains("output")));
        assert!(summary.last().unwrap().starts_with("parameters"));
    }

    #[test]
    fn test_save_and_load() {
        let device = Default::default();
        let space = HyperparameterSpace {
            conv0filters: vec![2],
            conv1filters: vec![],
            conv2filters: vec![],
            num_fc: 1,
            fcoutput: 4,
            ..HyperparameterSpace::default()
        };
        let model = VggVariant::<TestBackend>::new(&space, 8, 8, &device).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Models").join("Dominance");
        save_model(&model, &path).unwrap();

        let loaded = load_model::<TestBackend>(&space, 8, 8, &path, &device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 1, 8, 8], &device);
        let expected = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        // Compact recorder stores half precision
        assert!((expected[0] - actual[0]).abs() < 1e-2);
    }
}
