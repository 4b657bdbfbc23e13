use burn::module::{Module, Param};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::session::{GeneratorProgress, LossBreakdown, ProgressStat, ProgressUpdate};
use crate::vgg::Vgg19;
use crate::{imagenet, loss, optim::ExponentialDecay, Dims};

/// All the tweakable knobs of a single generation run
#[derive(Debug)]
pub struct GeneratorParams {
    /// Weight of the style term, split evenly across the five style taps
    pub(crate) style_weight: f32,
    /// Weight of the content term
    pub(crate) content_weight: f32,
    /// Number of gradient descent steps
    pub(crate) iterations: u32,
    /// Seed for the noise mixed into the initial canvas
    pub(crate) seed: u64,
    /// Learning rate at the first step
    pub(crate) learning_rate: f64,
    /// Steps over which the learning rate decays by `decay_rate`
    pub(crate) decay_steps: u32,
    pub(crate) decay_rate: f64,
}

/// The image being optimized, wrapped in a module so the optimizer treats
/// its pixels as parameters.
#[derive(Module, Debug)]
struct Canvas<B: Backend> {
    pixels: Param<Tensor<B, 4>>,
}

/// The central worker: owns the frozen feature extractor and the two
/// reference images, and descends a canvas towards both of them.
#[derive(Debug)]
pub struct Generator<B: AutodiffBackend> {
    vgg: Vgg19<B>,
    content: image::RgbaImage,
    style: image::RgbaImage,
    output_size: Dims,
    device: B::Device,
}

impl<B: AutodiffBackend> Generator<B> {
    pub(crate) fn new(
        vgg: Vgg19<B>,
        content: image::RgbaImage,
        style: image::RgbaImage,
        output_size: Dims,
        device: B::Device,
    ) -> Self {
        Self {
            // only the canvas learns, never the network
            vgg: vgg.no_grad(),
            content,
            style,
            output_size,
            device,
        }
    }

    pub(crate) fn resolve(
        self,
        params: &GeneratorParams,
        mut progress: Option<Box<dyn GeneratorProgress>>,
    ) -> (image::RgbaImage, LossBreakdown) {
        // The reference activations never change, so both images go through
        // the network exactly once, before the loop.
        let base = imagenet::preprocess::<B>(&self.content, &self.device);
        let content_target = self.vgg.forward(base).content.detach();

        let reference = imagenet::preprocess::<B>(&self.style, &self.device);
        let style_targets = self
            .vgg
            .forward(reference)
            .style
            .map(|features| loss::gram_matrix(features).detach());

        let mut canvas = Canvas {
            pixels: Param::from_tensor(self.initial_pixels(params.seed)),
        };

        // Keras' Adam epsilon, not burn's default
        let mut optimizer = AdamConfig::new().with_epsilon(1e-7).init();
        let schedule = ExponentialDecay::new(
            params.learning_rate,
            params.decay_steps,
            params.decay_rate,
        );

        let mut losses = LossBreakdown {
            total: 0.0,
            content: 0.0,
            style: 0.0,
        };

        for iteration in 1..=params.iterations {
            let features = self.vgg.forward(canvas.pixels.val());

            let content = loss::content_loss(content_target.clone(), features.content)
                .mul_scalar(params.content_weight);

            let mut style = content.zeros_like();
            for (target, combination) in style_targets.iter().zip(features.style) {
                let layer = loss::style_loss(target.clone(), combination, self.output_size);
                style = style + layer.mul_scalar(params.style_weight / 5.0);
            }

            let total = content.clone() + style.clone();
            losses = LossBreakdown {
                total: scalar(&total),
                content: scalar(&content),
                style: scalar(&style),
            };

            let learning_rate = schedule.lr_at(iteration - 1);
            let grads = total.backward();
            let grads = GradientsParams::from_grads(grads, &canvas);
            canvas = optimizer.step(learning_rate, canvas, grads);

            if let Some(ref mut progress) = progress {
                let image = imagenet::deprocess(canvas.pixels.val());
                progress.update(ProgressUpdate {
                    image: &image,
                    iter: ProgressStat {
                        current: iteration as usize,
                        total: params.iterations as usize,
                    },
                    losses,
                    learning_rate,
                });
            }
        }

        (imagenet::deprocess(canvas.pixels.val()), losses)
    }

    /// The initial canvas: `0.2 * noise + 0.7 * content`, blended per channel
    /// in RGB space before centering. The noise is uniform integers in
    /// `0..256`, drawn from a seeded PCG so runs are repeatable.
    fn initial_pixels(&self, seed: u64) -> Tensor<B, 4> {
        let mut rng = Pcg32::seed_from_u64(seed);

        let capacity = (self.output_size.width * self.output_size.height * 3) as usize;
        let mut rgb = Vec::with_capacity(capacity);
        for pixel in self.content.pixels() {
            for channel in 0..3 {
                let noise = rng.gen_range(0..256) as f32;
                rgb.push(0.2 * noise + 0.7 * f32::from(pixel[channel]));
            }
        }

        imagenet::preprocess_raw(&rgb, self.output_size, &self.device)
    }
}

fn scalar<B: Backend>(value: &Tensor<B, 1>) -> f32 {
    value.clone().into_data().to_vec::<f32>().unwrap()[0]
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    struct Recorder {
        iterations: Arc<Mutex<Vec<usize>>>,
        rates: Arc<Mutex<Vec<f64>>>,
    }

    impl GeneratorProgress for Recorder {
        fn update(&mut self, info: ProgressUpdate<'_>) {
            assert!(info.losses.total.is_finite());
            assert_eq!(info.image.dimensions(), (24, 32));
            assert_eq!(info.iter.total, 3);

            self.iterations.lock().unwrap().push(info.iter.current);
            self.rates.lock().unwrap().push(info.learning_rate);
        }
    }

    #[test]
    fn reports_every_iteration_and_decays_the_rate() {
        let device = Default::default();
        let vgg = Vgg19::<TestBackend>::new(&device);

        let content = image::RgbaImage::from_fn(24, 32, |x, y| {
            image::Rgba([(x * 10) as u8, (y * 7) as u8, 128, 255])
        });
        let style = image::RgbaImage::from_pixel(24, 32, image::Rgba([200, 40, 40, 255]));

        let generator = Generator::new(vgg, content, style, Dims::new(24, 32), device);

        let iterations = Arc::new(Mutex::new(Vec::new()));
        let rates = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            iterations: iterations.clone(),
            rates: rates.clone(),
        };

        let params = GeneratorParams {
            style_weight: 0.2,
            content_weight: 0.025,
            iterations: 3,
            seed: 11,
            learning_rate: 1.0,
            decay_steps: 1,
            decay_rate: 0.5,
        };

        let (image, losses) = generator.resolve(&params, Some(Box::new(recorder)));

        assert_eq!(image.dimensions(), (24, 32));
        assert!(losses.total.is_finite());
        assert!(losses.total > 0.0);
        assert_eq!(*iterations.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(*rates.lock().unwrap(), vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn the_seed_picks_the_initial_noise() {
        let device = burn::backend::ndarray::NdArrayDevice::default();
        let content = image::RgbaImage::from_pixel(8, 8, image::Rgba([50, 100, 150, 255]));
        let style = content.clone();

        let generator = |seed: u64| {
            let vgg = Vgg19::<TestBackend>::new(&device);
            let styler = Generator::new(
                vgg,
                content.clone(),
                style.clone(),
                Dims::new(8, 8),
                device,
            );
            styler.initial_pixels(seed)
        };

        let a = generator(3).into_data().to_vec::<f32>().unwrap();
        let b = generator(3).into_data().to_vec::<f32>().unwrap();
        let c = generator(4).into_data().to_vec::<f32>().unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
