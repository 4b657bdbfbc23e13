use crate::Dims;
use burn::prelude::*;

/// Channel correlations of a feature map, the texture descriptor the style
/// term compares. The `[1, C, H, W]` activations are flattened to
/// `[C, H * W]` and multiplied with their own transpose.
pub(crate) fn gram_matrix<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 2> {
    let [_, channels, height, width] = features.dims();
    let features = features.reshape([channels, height * width]);

    features.clone().matmul(features.transpose())
}

/// Squared distance between a style layer's gram matrix and the gram matrix
/// of the matching combination layer. The normalization uses the channel and
/// pixel counts of the output *image*, not of the feature map.
pub(crate) fn style_loss<B: Backend>(
    style_gram: Tensor<B, 2>,
    combination: Tensor<B, 4>,
    output_size: Dims,
) -> Tensor<B, 1> {
    let channels = 3.0f32;
    let size = (output_size.width * output_size.height) as f32;

    (style_gram - gram_matrix(combination))
        .powf_scalar(2.0)
        .sum()
        .div_scalar(4.0 * channels * channels * size * size)
}

/// Squared distance between the deep layer activations of the base image and
/// of the combination image. Deliberately left unnormalized.
pub(crate) fn content_loss<B: Backend>(
    base: Tensor<B, 4>,
    combination: Tensor<B, 4>,
) -> Tensor<B, 1> {
    (combination - base).powf_scalar(2.0).sum()
}
