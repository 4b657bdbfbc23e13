use crate::*;
use std::path::{Path, PathBuf};

/// Style transfer session.
///
/// Calling `run()` will optimize a combination image and return it, consuming
/// the session in the process. You can provide a `GeneratorProgress`
/// implementation to get an update after every iteration with the current
/// image, the loss breakdown and the learning rate that was used.
///
/// # Example
/// ```no_run
/// let styler = neural_style::Session::builder()
///     .content(&"imgs/content.jpg")
///     .style(&"imgs/style.jpg")
///     .vgg_weights("vgg19.safetensors")
///     .build().expect("failed to build session");
///
/// let generated_img = styler.run(None);
/// generated_img.save("my_stylized_img.jpg").expect("failed to save image");
/// ```
#[derive(Debug)]
pub struct Session {
    generator: Generator<CpuBackend>,
    params: Parameters,
}

impl Session {
    /// Creates a new session with default parameters.
    pub fn builder<'a>() -> SessionBuilder<'a> {
        SessionBuilder::default()
    }

    /// Runs the generator and outputs the stylized image.
    pub fn run(self, progress: Option<Box<dyn GeneratorProgress>>) -> GeneratedImage {
        let (image, losses) = self
            .generator
            .resolve(&self.params.to_generator_params(), progress);

        GeneratedImage { image, losses }
    }
}

/// Builds a session by setting parameters and providing the input images and
/// network weights, calling `build` will check all of the provided inputs to
/// verify that style transfer will provide valid output
#[derive(Default)]
pub struct SessionBuilder<'a> {
    content: Option<ImageSource<'a>>,
    style: Option<ImageSource<'a>>,
    weights: Option<PathBuf>,
    params: Parameters,
}

impl<'a> SessionBuilder<'a> {
    /// Creates a new `SessionBuilder`, can also be created via
    /// `Session::builder()`
    pub fn new() -> Self {
        Self::default()
    }

    /// The image whose scene layout survives into the output.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let styler = neural_style::Session::builder()
    ///     .content(&"imgs/content.jpg")
    ///     .style(&"imgs/style.jpg")
    ///     .vgg_weights("vgg19.safetensors")
    ///     .build().expect("failed to build session");
    /// ```
    pub fn content<I: Into<ImageSource<'a>>>(mut self, img: I) -> Self {
        self.content = Some(img.into());
        self
    }

    /// The image whose colors and texture are transferred onto the content.
    pub fn style<I: Into<ImageSource<'a>>>(mut self, img: I) -> Self {
        self.style = Some(img.into());
        self
    }

    /// Path to the pre-trained VGG19 weights, a safetensors file using the
    /// torchvision tensor names. `build` fails if any tensor of the
    /// convolutional trunk is missing, has the wrong shape, or isn't F32.
    pub fn vgg_weights<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.weights = Some(path.as_ref().to_path_buf());
        self
    }

    /// How much of the style image's texture ends up in the output. The
    /// weight is split evenly across the five style taps.
    ///
    /// Default: 0.2
    pub fn style_weight(mut self, value: f32) -> Self {
        self.params.style_weight = value;
        self
    }

    /// How strongly the output is held to the content image's structure.
    ///
    /// Default: 0.025
    pub fn content_weight(mut self, value: f32) -> Self {
        self.params.content_weight = value;
        self
    }

    /// The number of gradient descent steps.
    ///
    /// Default: 2000
    pub fn iterations(mut self, count: u32) -> Self {
        self.params.iterations = count;
        self
    }

    /// Height of the generated image in pixels. The width is not
    /// configurable: it follows from the content image's aspect ratio.
    ///
    /// Default: 400
    pub fn output_height(mut self, rows: u32) -> Self {
        self.params.output_height = rows;
        self
    }

    /// Changes the deterministic seed for the noise that is mixed into the
    /// initial canvas. Reruns with the same inputs and seed produce the same
    /// image.
    pub fn seed(mut self, value: u64) -> Self {
        self.params.seed = value;
        self
    }

    /// The Adam learning rate at the first step.
    ///
    /// Default: 1.0
    pub fn learning_rate(mut self, value: f64) -> Self {
        self.params.learning_rate = value;
        self
    }

    /// The number of steps over which the learning rate decays by
    /// `decay_rate`. The decay is continuous, not a staircase.
    ///
    /// Default: 100
    pub fn decay_steps(mut self, count: u32) -> Self {
        self.params.decay_steps = count;
        self
    }

    /// The multiplicative learning rate decay. A value of 1.0 keeps the
    /// learning rate constant.
    ///
    /// Default: 0.96
    pub fn decay_rate(mut self, value: f64) -> Self {
        self.params.decay_rate = value;
        self
    }

    /// Creates a `Session`, or returns an error if invalid parameters or
    /// input images were specified.
    pub fn build(self) -> Result<Session, Error> {
        self.check_parameters_validity()?;

        let content = self.content.ok_or(Error::NoContent)?;
        let style = self.style.ok_or(Error::NoStyle)?;
        let weights = self.weights.ok_or(Error::NoWeights)?;

        // the rows are fixed by the builder, the columns follow the content
        // image's aspect ratio
        let content_img = load_dynamic_image(content)?;
        let output_size = derive_output_size(&content_img, self.params.output_height)?;

        let content_img = load_image(ImageSource::Image(content_img), Some(output_size))?;
        let style_img = load_image(style, Some(output_size))?;

        let device = Default::default();
        let vgg = vgg::Vgg19::from_file(&weights, &device)?;

        Ok(Session {
            generator: Generator::new(vgg, content_img, style_img, output_size, device),
            params: self.params,
        })
    }

    fn check_parameters_validity(&self) -> Result<(), Error> {
        if self.params.style_weight <= 0.0 || self.params.style_weight > 100.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 100.0,
                value: self.params.style_weight,
                name: "style-weight",
            }));
        }

        if self.params.content_weight <= 0.0 || self.params.content_weight > 100.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 100.0,
                value: self.params.content_weight,
                name: "content-weight",
            }));
        }

        if self.params.iterations == 0 || self.params.iterations > 100_000 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: 100_000.0,
                value: self.params.iterations as f32,
                name: "iterations",
            }));
        }

        if self.params.output_height < MIN_OUTPUT_DIM || self.params.output_height > MAX_OUTPUT_DIM
        {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: MIN_OUTPUT_DIM as f32,
                max: MAX_OUTPUT_DIM as f32,
                value: self.params.output_height as f32,
                name: "output-height",
            }));
        }

        if self.params.learning_rate <= 0.0 || self.params.learning_rate > 100.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 100.0,
                value: self.params.learning_rate as f32,
                name: "learning-rate",
            }));
        }

        if self.params.decay_steps == 0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 1.0,
                max: 1_000_000.0,
                value: self.params.decay_steps as f32,
                name: "decay-steps",
            }));
        }

        if self.params.decay_rate <= 0.0 || self.params.decay_rate > 1.0 {
            return Err(Error::InvalidRange(errors::InvalidRange {
                min: 0.0,
                max: 1.0,
                value: self.params.decay_rate as f32,
                name: "decay-rate",
            }));
        }

        Ok(())
    }
}

/// The four pooling stages of the feature extractor each halve the input, so
/// anything below this leaves the deepest taps without pixels.
const MIN_OUTPUT_DIM: u32 = 32;
const MAX_OUTPUT_DIM: u32 = 8192;

fn derive_output_size(img: &image::DynamicImage, output_height: u32) -> Result<Dims, Error> {
    use image::GenericImageView;
    let (width, height) = img.dimensions();

    // truncating division
    let output_width = (f64::from(width) * f64::from(output_height) / f64::from(height)) as u32;

    if output_width < MIN_OUTPUT_DIM || output_width > MAX_OUTPUT_DIM {
        return Err(Error::InvalidRange(errors::InvalidRange {
            min: MIN_OUTPUT_DIM as f32,
            max: MAX_OUTPUT_DIM as f32,
            value: output_width as f32,
            name: "output-width",
        }));
    }

    Ok(Dims::new(output_width, output_height))
}

/// Helper struct for passing progress information to external callers
pub struct ProgressStat {
    /// The current amount of work that has been done
    pub current: usize,
    /// The total amount of work to do
    pub total: usize,
}

/// The loss totals of a single iteration
#[derive(Debug, Clone, Copy)]
pub struct LossBreakdown {
    /// The weighted sum of the two terms below
    pub total: f32,
    /// The weighted content term
    pub content: f32,
    /// The weighted style term, summed over the five style taps
    pub style: f32,
}

/// The current state of the image generator
pub struct ProgressUpdate<'a> {
    /// The current combination image
    pub image: &'a image::RgbaImage,
    /// Which optimization step this update was emitted from
    pub iter: ProgressStat,
    /// The loss values of this step
    pub losses: LossBreakdown,
    /// The learning rate this step used
    pub learning_rate: f64,
}

/// Allows the generator to update external callers with the current
/// progress of the optimization
pub trait GeneratorProgress {
    fn update(&mut self, info: ProgressUpdate<'_>);
}

impl<G> GeneratorProgress for G
where
    G: FnMut(ProgressUpdate<'_>) + Send,
{
    fn update(&mut self, info: ProgressUpdate<'_>) {
        self(info)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn blank(width: u32, height: u32) -> image::DynamicImage {
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height))
    }

    #[test]
    fn output_width_follows_the_content_aspect() {
        let size = derive_output_size(&blank(640, 480), 400).unwrap();
        assert_eq!((size.width, size.height), (533, 400));

        let size = derive_output_size(&blank(480, 640), 400).unwrap();
        assert_eq!((size.width, size.height), (300, 400));

        let size = derive_output_size(&blank(100, 100), 400).unwrap();
        assert_eq!((size.width, size.height), (400, 400));
    }

    #[test]
    fn extreme_aspect_ratios_are_rejected() {
        let err = derive_output_size(&blank(10, 1000), 400).unwrap_err();
        assert!(err.to_string().contains("output-width"), "{}", err);
    }
}
