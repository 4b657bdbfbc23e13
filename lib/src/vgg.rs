//! VGG19 feature extractor for the content and style losses.

use burn::module::{Module, Param};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::relu;
use safetensors::{Dtype, SafeTensors};
use std::path::Path;

use crate::errors::{Error, WeightError};

/// The activations the losses read from a single forward pass.
pub(crate) struct Features<B: Backend> {
    /// Taps after the first convolution of each block, shallow to deep
    pub(crate) style: [Tensor<B, 4>; 5],
    /// Tap after `block5_conv2`, the deepest layer the trunk keeps
    pub(crate) content: Tensor<B, 4>,
}

/// The convolutional trunk of VGG19, truncated after `block5_conv2`. The
/// classifier head and everything past that layer is left out.
#[derive(Module, Debug)]
pub(crate) struct Vgg19<B: Backend> {
    conv1_1: Conv2d<B>,
    conv1_2: Conv2d<B>,
    conv2_1: Conv2d<B>,
    conv2_2: Conv2d<B>,
    conv3_1: Conv2d<B>,
    conv3_2: Conv2d<B>,
    conv3_3: Conv2d<B>,
    conv3_4: Conv2d<B>,
    conv4_1: Conv2d<B>,
    conv4_2: Conv2d<B>,
    conv4_3: Conv2d<B>,
    conv4_4: Conv2d<B>,
    conv5_1: Conv2d<B>,
    conv5_2: Conv2d<B>,
}

impl<B: Backend> Vgg19<B> {
    /// A trunk with randomly initialized filters, the starting point of
    /// [`Self::from_file`]. Also handy for tests that don't care about the
    /// pre-trained features.
    pub(crate) fn new(device: &B::Device) -> Self {
        let conv = |in_ch: usize, out_ch: usize| {
            Conv2dConfig::new([in_ch, out_ch], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(true)
                .init(device)
        };

        Self {
            // Block 1: 3 -> 64
            conv1_1: conv(3, 64),
            conv1_2: conv(64, 64),
            // Block 2: 64 -> 128
            conv2_1: conv(64, 128),
            conv2_2: conv(128, 128),
            // Block 3: 128 -> 256
            conv3_1: conv(128, 256),
            conv3_2: conv(256, 256),
            conv3_3: conv(256, 256),
            conv3_4: conv(256, 256),
            // Block 4: 256 -> 512
            conv4_1: conv(256, 512),
            conv4_2: conv(512, 512),
            conv4_3: conv(512, 512),
            conv4_4: conv(512, 512),
            // Block 5: 512 -> 512
            conv5_1: conv(512, 512),
            conv5_2: conv(512, 512),
        }
    }

    /// Loads the pre-trained filters from a safetensors file that uses the
    /// torchvision tensor names (`features.0.weight` .. `features.30.bias`).
    /// Every tensor the trunk needs must be present, stored as F32 and have
    /// the expected shape; anything else is rejected with an error naming
    /// the offending tensor. Tensors beyond the trunk are ignored.
    pub(crate) fn from_file(path: &Path, device: &B::Device) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        let tensors = SafeTensors::deserialize(&bytes)
            .map_err(|err| WeightError::Format(err.to_string()))?;

        let vgg = Self::new(device);

        // torchvision indices of the conv layers inside `features`
        Ok(Self {
            conv1_1: with_filters(vgg.conv1_1, &tensors, 0, device)?,
            conv1_2: with_filters(vgg.conv1_2, &tensors, 2, device)?,
            conv2_1: with_filters(vgg.conv2_1, &tensors, 5, device)?,
            conv2_2: with_filters(vgg.conv2_2, &tensors, 7, device)?,
            conv3_1: with_filters(vgg.conv3_1, &tensors, 10, device)?,
            conv3_2: with_filters(vgg.conv3_2, &tensors, 12, device)?,
            conv3_3: with_filters(vgg.conv3_3, &tensors, 14, device)?,
            conv3_4: with_filters(vgg.conv3_4, &tensors, 16, device)?,
            conv4_1: with_filters(vgg.conv4_1, &tensors, 19, device)?,
            conv4_2: with_filters(vgg.conv4_2, &tensors, 21, device)?,
            conv4_3: with_filters(vgg.conv4_3, &tensors, 23, device)?,
            conv4_4: with_filters(vgg.conv4_4, &tensors, 25, device)?,
            conv5_1: with_filters(vgg.conv5_1, &tensors, 28, device)?,
            conv5_2: with_filters(vgg.conv5_2, &tensors, 30, device)?,
        })
    }

    /// Runs an image through the trunk and collects the style taps and the
    /// content tap. All taps are post-activation.
    pub(crate) fn forward(&self, x: Tensor<B, 4>) -> Features<B> {
        // Block 1
        let style1 = relu(self.conv1_1.forward(x));
        let x = relu(self.conv1_2.forward(style1.clone()));
        let x = max_pool2d(x);

        // Block 2
        let style2 = relu(self.conv2_1.forward(x));
        let x = relu(self.conv2_2.forward(style2.clone()));
        let x = max_pool2d(x);

        // Block 3
        let style3 = relu(self.conv3_1.forward(x));
        let x = relu(self.conv3_2.forward(style3.clone()));
        let x = relu(self.conv3_3.forward(x));
        let x = relu(self.conv3_4.forward(x));
        let x = max_pool2d(x);

        // Block 4
        let style4 = relu(self.conv4_1.forward(x));
        let x = relu(self.conv4_2.forward(style4.clone()));
        let x = relu(self.conv4_3.forward(x));
        let x = relu(self.conv4_4.forward(x));
        let x = max_pool2d(x);

        // Block 5
        let style5 = relu(self.conv5_1.forward(x));
        let content = relu(self.conv5_2.forward(style5.clone()));

        Features {
            style: [style1, style2, style3, style4, style5],
            content,
        }
    }
}

/// Swaps a convolution's filters for the `features.{index}` weight and bias
/// from the file, validating dtype and shape against the module itself.
fn with_filters<B: Backend>(
    conv: Conv2d<B>,
    tensors: &SafeTensors<'_>,
    index: usize,
    device: &B::Device,
) -> Result<Conv2d<B>, WeightError> {
    let weight = read_tensor(
        tensors,
        &format!("features.{}.weight", index),
        conv.weight.dims(),
        device,
    )?;
    let bias = read_tensor(
        tensors,
        &format!("features.{}.bias", index),
        [conv.weight.dims()[0]],
        device,
    )?;

    let mut conv = conv;
    conv.weight = Param::from_tensor(weight);
    conv.bias = Some(Param::from_tensor(bias));
    Ok(conv)
}

fn read_tensor<B: Backend, const D: usize>(
    tensors: &SafeTensors<'_>,
    name: &str,
    shape: [usize; D],
    device: &B::Device,
) -> Result<Tensor<B, D>, WeightError> {
    let view = tensors
        .tensor(name)
        .map_err(|_| WeightError::MissingTensor(name.to_owned()))?;

    if view.dtype() != Dtype::F32 {
        return Err(WeightError::Dtype {
            tensor: name.to_owned(),
            actual: format!("{:?}", view.dtype()),
        });
    }

    if view.shape() != shape.as_slice() {
        return Err(WeightError::Shape {
            tensor: name.to_owned(),
            expected: shape.to_vec(),
            actual: view.shape().to_vec(),
        });
    }

    let data: Vec<f32> = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Tensor::from_data(TensorData::new(data, shape), device))
}

/// 2x2 max pooling with stride 2, the downsampling between VGG blocks.
fn max_pool2d<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    burn::tensor::module::max_pool2d(x, [2, 2], [2, 2], [0, 0], [1, 1], false)
}

#[cfg(test)]
mod test {
    use super::*;
    use safetensors::tensor::TensorView;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn taps_have_the_documented_shapes() {
        let device = Default::default();
        let vgg = Vgg19::<TestBackend>::new(&device);

        let features = vgg.forward(Tensor::zeros([1, 3, 64, 48], &device));

        let expected = [
            [1, 64, 64, 48],
            [1, 128, 32, 24],
            [1, 256, 16, 12],
            [1, 512, 8, 6],
            [1, 512, 4, 3],
        ];
        for (tap, shape) in features.style.iter().zip(expected) {
            assert_eq!(tap.dims(), shape);
        }
        assert_eq!(features.content.dims(), [1, 512, 4, 3]);
    }

    #[test]
    fn odd_sizes_pool_down_by_flooring() {
        let device = Default::default();
        let vgg = Vgg19::<TestBackend>::new(&device);

        // 50x35 -> 25x17 -> 12x8 -> 6x4 -> 3x2
        let features = vgg.forward(Tensor::zeros([1, 3, 50, 35], &device));
        assert_eq!(features.content.dims(), [1, 512, 3, 2]);
    }

    #[test]
    fn rejects_files_that_are_not_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.safetensors");
        std::fs::write(&path, b"not a tensor file").unwrap();

        let device = Default::default();
        let err = Vgg19::<TestBackend>::from_file(&path, &device).unwrap_err();
        assert!(matches!(err, Error::Weights(WeightError::Format(_))), "{}", err);
    }

    #[test]
    fn names_the_first_missing_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.safetensors");
        write_file(&path, &[("unrelated", vec![1], vec![0.5])]);

        let device = Default::default();
        let err = Vgg19::<TestBackend>::from_file(&path, &device).unwrap_err();
        assert_eq!(
            err.to_string(),
            "weight file has no tensor 'features.0.weight'"
        );
    }

    #[test]
    fn names_tensors_with_the_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misshapen.safetensors");
        write_file(
            &path,
            &[(
                "features.0.weight",
                vec![64, 3, 2, 2],
                vec![0.0; 64 * 3 * 2 * 2],
            )],
        );

        let device = Default::default();
        let err = Vgg19::<TestBackend>::from_file(&path, &device).unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("features.0.weight") && msg.contains("[64, 3, 2, 2]"),
            "{}",
            msg
        );
    }

    #[test]
    fn rejects_tensors_that_are_not_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f64.safetensors");

        let data: Vec<u8> = std::iter::repeat(0.1f64.to_le_bytes())
            .take(64 * 3 * 9)
            .flatten()
            .collect();
        let view = TensorView::new(Dtype::F64, vec![64, 3, 3, 3], &data).unwrap();
        safetensors::serialize_to_file(vec![("features.0.weight", view)], &None, &path).unwrap();

        let device = Default::default();
        let err = Vgg19::<TestBackend>::from_file(&path, &device).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tensor 'features.0.weight' is stored as F64, but F32 is required"
        );
    }

    #[test]
    fn a_frozen_trunk_survives_an_optimizer_step() {
        use burn::optim::{AdamConfig, GradientsParams, Optimizer};

        type Diff = burn::backend::Autodiff<TestBackend>;

        let device = Default::default();
        let vgg = Vgg19::<Diff>::new(&device).no_grad();

        let before = vgg.conv1_1.weight.val().into_data().to_vec::<f32>().unwrap();

        let input = Tensor::<Diff, 4>::ones([1, 3, 32, 32], &device).require_grad();
        let total = vgg.forward(input).content.sum();
        let grads = GradientsParams::from_grads(total.backward(), &vgg);

        // no gradients reach the filters, so even a huge rate moves nothing
        let mut optimizer = AdamConfig::new().init();
        let vgg = optimizer.step(100.0, vgg, grads);

        let after = vgg.conv1_1.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(before, after);
    }

    fn write_file(path: &Path, tensors: &[(&str, Vec<usize>, Vec<f32>)]) {
        let bytes: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, shape, values)| {
                (
                    (*name).to_owned(),
                    shape.clone(),
                    values.iter().flat_map(|v| v.to_le_bytes()).collect(),
                )
            })
            .collect();

        let views: Vec<(&str, TensorView<'_>)> = bytes
            .iter()
            .map(|(name, shape, data)| {
                (
                    name.as_str(),
                    TensorView::new(Dtype::F32, shape.clone(), data).unwrap(),
                )
            })
            .collect();

        safetensors::serialize_to_file(views, &None, path).unwrap();
    }
}
