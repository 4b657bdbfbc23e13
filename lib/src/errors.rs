use std::fmt;

#[derive(Debug)]
pub struct InvalidRange {
    pub(crate) min: f32,
    pub(crate) max: f32,
    pub(crate) value: f32,
    pub(crate) name: &'static str,
}

impl fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter '{}' - value '{}' is outside the range of {}-{}",
            self.name, self.value, self.min, self.max
        )
    }
}

/// Details for why a feature extractor weight file was rejected
#[derive(Debug)]
pub enum WeightError {
    /// The file could not be parsed as a safetensors container
    Format(String),
    /// A tensor the network needs is not present in the file
    MissingTensor(String),
    /// A tensor was present but had the wrong shape
    Shape {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A tensor was present but not stored as 32 bit floats
    Dtype { tensor: String, actual: String },
}

impl fmt::Display for WeightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(reason) => write!(f, "unable to parse weight file: {}", reason),
            Self::MissingTensor(name) => write!(f, "weight file has no tensor '{}'", name),
            Self::Shape {
                tensor,
                expected,
                actual,
            } => write!(
                f,
                "tensor '{}' has shape {:?}, but {:?} is required",
                tensor, actual, expected
            ),
            Self::Dtype { tensor, actual } => write!(
                f,
                "tensor '{}' is stored as {}, but F32 is required",
                tensor, actual
            ),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// An error in the image library occurred, eg failed to load/save
    Image(image::ImageError),
    /// An input parameter had an invalid range specified
    InvalidRange(InvalidRange),
    /// The feature extractor weight file was missing a tensor, or contained
    /// one with an unexpected shape or data type
    Weights(WeightError),
    /// Io is notoriously error free with no problems, but we cover it just in case!
    Io(std::io::Error),
    /// The user specified an image format we don't support as the output
    UnsupportedOutputFormat(String),
    /// No content image was provided to source the output structure from
    NoContent,
    /// No style image was provided to source the output texture from
    NoStyle,
    /// No weight file was provided for the feature extractor
    NoWeights,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Image(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(ie) => write!(f, "{}", ie),
            Self::InvalidRange(ir) => write!(f, "{}", ir),
            Self::Weights(we) => write!(f, "{}", we),
            Self::Io(io) => write!(f, "{}", io),
            Self::UnsupportedOutputFormat(fmt) => {
                write!(f, "the output format '{}' is not supported", fmt)
            }
            Self::NoContent => write!(f, "a content image must be provided"),
            Self::NoStyle => write!(f, "a style image must be provided"),
            Self::NoWeights => write!(
                f,
                "a weight file for the feature extractor must be provided"
            ),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(ie: image::ImageError) -> Self {
        Self::Image(ie)
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::Io(io)
    }
}

impl From<WeightError> for Error {
    fn from(we: WeightError) -> Self {
        Self::Weights(we)
    }
}
