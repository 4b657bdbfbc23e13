use crate::Dims;
use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Per channel means of the ImageNet training set, in BGR order. The feature
/// extractor was trained on images centered with these, so everything fed to
/// it has to be centered the same way.
pub(crate) const MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Converts an image into a `[1, 3, height, width]` tensor in the layout the
/// feature extractor expects: BGR channel order, each channel centered on the
/// ImageNet mean. The alpha channel is dropped.
pub(crate) fn preprocess<B: Backend>(
    img: &image::RgbaImage,
    device: &B::Device,
) -> Tensor<B, 4> {
    let (width, height) = img.dimensions();

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for pixel in img.pixels() {
        rgb.push(f32::from(pixel[0]));
        rgb.push(f32::from(pixel[1]));
        rgb.push(f32::from(pixel[2]));
    }

    preprocess_raw(&rgb, Dims::new(width, height), device)
}

/// [`preprocess`] for pixels that aren't `u8` yet: takes interleaved RGB
/// values in `0.0..=255.0`, row major.
pub(crate) fn preprocess_raw<B: Backend>(
    rgb: &[f32],
    size: Dims,
    device: &B::Device,
) -> Tensor<B, 4> {
    let plane = (size.width * size.height) as usize;

    let mut data = vec![0.0f32; 3 * plane];
    for i in 0..plane {
        data[i] = rgb[i * 3 + 2] - MEAN_BGR[0];
        data[plane + i] = rgb[i * 3 + 1] - MEAN_BGR[1];
        data[2 * plane + i] = rgb[i * 3] - MEAN_BGR[2];
    }

    Tensor::from_data(
        TensorData::new(data, [1, 3, size.height as usize, size.width as usize]),
        device,
    )
}

/// Inverse of [`preprocess`]: adds the channel means back, reorders BGR to
/// RGB and clamps into `0..=255`. Values are truncated, not rounded, to match
/// a plain `uint8` cast.
pub(crate) fn deprocess<B: Backend>(tensor: Tensor<B, 4>) -> image::RgbaImage {
    let [_, _, height, width] = tensor.dims();
    let plane = height * width;

    let data = tensor.into_data().to_vec::<f32>().unwrap();

    let mut img = image::RgbaImage::new(width as u32, height as u32);
    for (i, pixel) in img.pixels_mut().enumerate() {
        let b = (data[i] + MEAN_BGR[0]).clamp(0.0, 255.0) as u8;
        let g = (data[plane + i] + MEAN_BGR[1]).clamp(0.0, 255.0) as u8;
        let r = (data[2 * plane + i] + MEAN_BGR[2]).clamp(0.0, 255.0) as u8;
        *pixel = image::Rgba([r, g, b, 255]);
    }

    img
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn centers_and_swaps_channels() {
        let img = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 128, 64, 255]));

        let device = Default::default();
        let tensor = preprocess::<TestBackend>(&img, &device);
        assert_eq!(tensor.dims(), [1, 3, 1, 2]);

        let data = tensor.into_data().to_vec::<f32>().unwrap();
        // blue plane first, then green, then red
        assert_abs_diff_eq!(data[0], 64.0 - 103.939, epsilon = 1e-4);
        assert_abs_diff_eq!(data[2], 128.0 - 116.779, epsilon = 1e-4);
        assert_abs_diff_eq!(data[4], 255.0 - 123.68, epsilon = 1e-4);
    }

    #[test]
    fn raw_pixels_keep_their_fractions() {
        let rgb = [10.5f32, 20.25, 30.125];

        let device = Default::default();
        let tensor = preprocess_raw::<TestBackend>(&rgb, Dims::new(1, 1), &device);

        let data = tensor.into_data().to_vec::<f32>().unwrap();
        assert_abs_diff_eq!(data[0], 30.125 - 103.939, epsilon = 1e-4);
        assert_abs_diff_eq!(data[1], 20.25 - 116.779, epsilon = 1e-4);
        assert_abs_diff_eq!(data[2], 10.5 - 123.68, epsilon = 1e-4);
    }

    #[test]
    fn roundtrip_preserves_pixels() {
        let img = image::RgbaImage::from_fn(5, 4, |x, y| {
            let v = (x * 53 + y * 17) as u8;
            image::Rgba([v, v.wrapping_add(91), v.wrapping_add(182), 255])
        });

        let device = Default::default();
        let restored = deprocess(preprocess::<TestBackend>(&img, &device));

        assert_eq!(img, restored);
    }

    #[test]
    fn deprocess_clamps_out_of_range_values() {
        let data = vec![-500.0f32, 500.0, -500.0, 500.0, -500.0, 500.0];
        let device = Default::default();
        let tensor =
            Tensor::<TestBackend, 4>::from_data(TensorData::new(data, [1, 3, 1, 2]), &device);

        let img = deprocess(tensor);
        assert_eq!(*img.get_pixel(0, 0), image::Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(1, 0), image::Rgba([255, 255, 255, 255]));
    }
}
