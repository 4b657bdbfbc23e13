// BEGIN - Embark standard lints v0.4
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v0.4

//! `neural-style` is a light API for neural style transfer, a gradient-based
//! algorithm that combines the scene of one photograph with the look of
//! another.
//!
//! First, you build a `Session` via a `SessionBuilder`, which follows the builder pattern. Calling
//! `build` on the `SessionBuilder` loads the two input images and the network weights and checks
//! for various errors.
//!
//! `Session` has a `run()` method that takes all of the parameters and inputs added in the session
//! builder and optimizes an image, which is returned as a `GeneratedImage`.
//!
//! You can save, stream, or inspect the image from `GeneratedImage`.
//!
//! ## How it works
//!
//! A frozen VGG19 network turns images into feature activations. The content
//! image is described by a single deep activation; the style image is
//! described by the gram matrices of five taps spread across the network.
//! Starting from the content image blended with noise, gradient descent
//! (Adam, with an exponentially decaying learning rate) pushes the canvas
//! towards both descriptions at once.
//!
//! The pre-trained weights are loaded from a safetensors file that uses the
//! torchvision tensor names; see the `fetch-weights` command of the CLI for
//! a way to get them.
//!
//! ## Usage
//! Session follows a "builder pattern" for defining parameters, meaning you chain functions together.
//!
//! ```no_run
//! // Create a new session with default parameters
//! let session = neural_style::Session::builder()
//!     // Set some parameters
//!     .seed(10)
//!     .style_weight(0.6)
//!     // Specify the input images and the network weights
//!     .content(&"imgs/content.jpg")
//!     .style(&"imgs/style.jpg")
//!     .vgg_weights("vgg19.safetensors")
//!     // Build the session
//!     .build().expect("failed to build session");
//!
//! // Optimize a new image
//! let generated_img = session.run(None);
//!
//! // Save the generated image to disk
//! generated_img.save("my_stylized_img.jpg").expect("failed to save generated image");
//! ```
mod errors;
mod imagenet;
mod loss;
mod optim;
mod utils;
use utils::*;
mod styler;
use styler::*;
mod vgg;
pub mod session;

pub use image;
use std::path::Path;

pub use errors::Error;
pub use session::{
    GeneratorProgress, LossBreakdown, ProgressStat, ProgressUpdate, Session, SessionBuilder,
};
pub use utils::{load_dynamic_image, ImageSource};

/// The tensor backend sessions run on. Everything below the session is
/// generic over burn backends, but the shipped path is the CPU `NdArray`
/// backend with autodiff layered on top.
type CpuBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Simple dimensions struct
#[derive(Copy, Clone, Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug)]
struct Parameters {
    style_weight: f32,
    content_weight: f32,
    iterations: u32,
    output_height: u32,
    seed: u64,
    learning_rate: f64,
    decay_steps: u32,
    decay_rate: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            style_weight: 0.2,
            content_weight: 0.025,
            iterations: 2000,
            output_height: 400,
            seed: 0,
            learning_rate: 1.0,
            decay_steps: 100,
            decay_rate: 0.96,
        }
    }
}

impl Parameters {
    fn to_generator_params(&self) -> GeneratorParams {
        GeneratorParams {
            style_weight: self.style_weight,
            content_weight: self.content_weight,
            iterations: self.iterations,
            seed: self.seed,
            learning_rate: self.learning_rate,
            decay_steps: self.decay_steps,
            decay_rate: self.decay_rate,
        }
    }
}

/// An image generated by a `Session::run()`
pub struct GeneratedImage {
    image: image::RgbaImage,
    losses: LossBreakdown,
}

impl GeneratedImage {
    /// Saves the generated image to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent_path) = path.parent() {
            std::fs::create_dir_all(parent_path)?;
        }

        self.image.save(path)?;
        Ok(())
    }

    /// Writes the generated image to the specified stream
    pub fn write<W: std::io::Write>(
        self,
        writer: &mut W,
        fmt: image::ImageOutputFormat,
    ) -> Result<(), Error> {
        let dyn_img = self.into_image();
        Ok(dyn_img.write_to(writer, fmt)?)
    }

    /// The loss breakdown of the final iteration, useful for comparing runs
    /// with different weights or schedules.
    pub fn losses(&self) -> &LossBreakdown {
        &self.losses
    }

    /// Returns the generated output image
    pub fn into_image(self) -> image::DynamicImage {
        image::DynamicImage::ImageRgba8(self.image)
    }
}

impl AsRef<image::RgbaImage> for GeneratedImage {
    fn as_ref(&self) -> &image::RgbaImage {
        &self.image
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_reference_settings() {
        let params = Parameters::default();

        assert_eq!(params.style_weight, 0.2);
        assert_eq!(params.content_weight, 0.025);
        assert_eq!(params.iterations, 2000);
        assert_eq!(params.output_height, 400);
        assert_eq!(params.learning_rate, 1.0);
        assert_eq!(params.decay_steps, 100);
        assert_eq!(params.decay_rate, 0.96);
    }
}
