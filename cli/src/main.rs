use structopt::StructOpt;

use neural_style::{
    image::ImageOutputFormat as ImgFmt, Error, GeneratorProgress, ProgressUpdate, Session,
};
use std::path::{Path, PathBuf};

fn parse_img_fmt(input: &str) -> Result<ImgFmt, String> {
    let fmt = match input {
        "png" => ImgFmt::Png,
        "jpg" => ImgFmt::Jpeg(75),
        "bmp" => ImgFmt::Bmp,
        other => {
            return Err(format!(
                "image format `{}` not one of: 'png', 'jpg', 'bmp'",
                other
            ))
        }
    };

    Ok(fmt)
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Tweaks {
    /// How much of the style image's texture ends up in the output. The
    /// weight is split evenly across the five style layers.
    #[structopt(long, default_value = "0.2")]
    style_weight: f32,
    /// How strongly the output is held to the content image's structure
    #[structopt(long, default_value = "0.025")]
    content_weight: f32,
    /// The number of gradient descent steps
    #[structopt(long, default_value = "2000")]
    iterations: u32,
    /// Height of the generated image in pixels, the width follows from the
    /// content image's aspect ratio
    #[structopt(long, default_value = "400")]
    output_height: u32,
    /// A seed value for the noise that is mixed into the initial canvas, so
    /// that reruns produce the same image
    #[structopt(long)]
    seed: Option<u64>,
    /// The Adam learning rate at the first step
    #[structopt(long, default_value = "1.0")]
    learning_rate: f64,
    /// The number of steps over which the learning rate decays by decay-rate
    #[structopt(long, default_value = "100")]
    decay_steps: u32,
    /// The multiplicative learning rate decay, 1.0 keeps the rate constant
    #[structopt(long, default_value = "0.96")]
    decay_rate: f64,
    /// Print plain log lines instead of drawing a progress bar
    #[structopt(long)]
    no_progress: bool,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct Transfer {
    /// The image whose scene layout survives into the output
    #[structopt(long, parse(from_os_str))]
    content: PathBuf,
    /// The image whose colors and texture are transferred onto the content
    #[structopt(long, parse(from_os_str))]
    style: PathBuf,
    /// Path to the pre-trained VGG19 weights in safetensors format, see the
    /// `fetch-weights` subcommand
    #[structopt(long, parse(from_os_str))]
    weights: PathBuf,
    /// Additionally save the in-progress image every N iterations, next to
    /// the output path as `<name>_at_<iteration>.<ext>`
    #[structopt(long)]
    save_every: Option<u32>,
    /// The format to save the generated image as.
    ///
    /// NOTE: this will only apply when stdout is specified via `-o -`, otherwise the image
    /// format is determined by the file extension of the path provided to `-o`
    #[structopt(
        long,
        default_value = "png",
        parse(try_from_str = parse_img_fmt)
    )]
    out_fmt: ImgFmt,
    /// The path to save the generated image to, the file extension of the path determines
    /// the image format used. You may use `-` for stdout.
    #[structopt(long = "out", short, parse(from_os_str))]
    output_path: PathBuf,
    #[structopt(flatten)]
    tweaks: Tweaks,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
struct FetchWeights {
    /// The Hugging Face Hub repository to download from
    #[structopt(long, default_value = "timm/vgg19.tv_in1k")]
    repo: String,
    /// The weight file within the repository
    #[structopt(long, default_value = "model.safetensors")]
    file: String,
}

#[derive(StructOpt)]
enum Subcommand {
    /// Combines the content of one image with the style of another
    #[structopt(name = "transfer")]
    Transfer(Transfer),
    /// Downloads pre-trained VGG19 weights from the Hugging Face Hub and
    /// prints the cached path
    #[structopt(name = "fetch-weights")]
    FetchWeights(FetchWeights),
}

#[derive(StructOpt)]
#[structopt(
    name = "neural-style",
    about = "Combines the content of one image with the style of another",
    rename_all = "kebab-case"
)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Subcommand,
}

fn main() {
    if let Err(e) = real_main() {
        if atty::is(atty::Stream::Stderr) {
            eprintln!("\x1b[31merror\x1b[0m: {}", e);
        } else {
            eprintln!("error: {}", e);
        }

        std::process::exit(1);
    }
}

fn real_main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Opt::from_args();

    match args.cmd {
        Subcommand::Transfer(args) => transfer(args),
        Subcommand::FetchWeights(args) => fetch_weights(args),
    }
}

fn fetch_weights(args: FetchWeights) -> Result<(), Box<dyn std::error::Error>> {
    let api = hf_hub::api::sync::Api::new()?;
    let path = api.model(args.repo).get(&args.file)?;

    // the path is the only stdout output so that scripts can capture it
    println!("{}", path.display());

    Ok(())
}

fn transfer(args: Transfer) -> Result<(), Box<dyn std::error::Error>> {
    // Check that the extension for the path supplied by the user is one of the ones we support
    {
        match args.output_path.extension().and_then(|ext| ext.to_str()) {
            Some("png") | Some("jpg") | Some("bmp") => {}
            None => {}
            Some(other) => return Err(Error::UnsupportedOutputFormat(other.to_owned()).into()),
        }
    }

    let to_stdout = args.output_path.to_str() == Some("-");

    let saver = match args.save_every {
        Some(0) => return Err("--save-every must be at least 1".into()),
        Some(_) if to_stdout => {
            return Err("--save-every needs a file output path, not stdout".into())
        }
        Some(every) => Some(IntermediateSaver {
            every: every as usize,
            output_path: args.output_path.clone(),
        }),
        None => None,
    };

    let session = Session::builder()
        .content(&args.content)
        .style(&args.style)
        .vgg_weights(&args.weights)
        .style_weight(args.tweaks.style_weight)
        .content_weight(args.tweaks.content_weight)
        .iterations(args.tweaks.iterations)
        .output_height(args.tweaks.output_height)
        .seed(args.tweaks.seed.unwrap_or_default())
        .learning_rate(args.tweaks.learning_rate)
        .decay_steps(args.tweaks.decay_steps)
        .decay_rate(args.tweaks.decay_rate)
        .build()?;

    let progress: Option<Box<dyn GeneratorProgress>> = if !args.tweaks.no_progress {
        Some(Box::new(ProgressBars::new(args.tweaks.iterations, saver)))
    } else {
        // stdout may be carrying the image bytes, so the plain log goes to stderr
        Some(Box::new(PlainLog { saver }))
    };

    let generated = session.run(progress);

    if to_stdout {
        let out = std::io::stdout();
        let mut out = out.lock();
        generated.write(&mut out, args.out_fmt)?;
    } else {
        // This won't respect the output format specified by the user,
        // only the extension on the path they specify, but that makes
        // more sense, and is probably better than detecting and emitting
        // an error
        generated.save(&args.output_path)?;
    }

    Ok(())
}

use indicatif::{ProgressBar, ProgressStyle};

/// Writes the in-progress image next to the final output path every
/// `every` iterations
struct IntermediateSaver {
    every: usize,
    output_path: PathBuf,
}

impl IntermediateSaver {
    fn maybe_save(&self, update: &ProgressUpdate<'_>) -> Result<(), Error> {
        if update.iter.current % self.every != 0 {
            return Ok(());
        }

        let path = intermediate_path(&self.output_path, update.iter.current);
        update.image.save(path)?;

        Ok(())
    }
}

fn intermediate_path(output: &Path, iteration: usize) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    let ext = output.extension().and_then(|s| s.to_str()).unwrap_or("png");

    output.with_file_name(format!("{}_at_{}.{}", stem, iteration, ext))
}

struct ProgressBars {
    pb: ProgressBar,
    saver: Option<IntermediateSaver>,
}

impl ProgressBars {
    fn new(iterations: u32, saver: Option<IntermediateSaver>) -> Self {
        let pb = ProgressBar::new(u64::from(iterations));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .progress_chars("##-"),
        );

        Self { pb, saver }
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        self.pb.finish();
    }
}

impl GeneratorProgress for ProgressBars {
    fn update(&mut self, update: ProgressUpdate<'_>) {
        self.pb.set_position(update.iter.current as u64);
        self.pb.set_message(&format!(
            "loss {:.2} (content {:.2}, style {:.2}) lr {:.3}",
            update.losses.total, update.losses.content, update.losses.style, update.learning_rate
        ));

        if let Some(ref saver) = self.saver {
            if let Err(e) = saver.maybe_save(&update) {
                self.pb
                    .println(format!("unable to save intermediate image: {}", e));
            }
        }
    }
}

/// The `--no-progress` fallback, one log line every 100 iterations
struct PlainLog {
    saver: Option<IntermediateSaver>,
}

impl GeneratorProgress for PlainLog {
    fn update(&mut self, update: ProgressUpdate<'_>) {
        if update.iter.current % 100 == 0 || update.iter.current == update.iter.total {
            eprintln!(
                "{}/{}: loss {:.2} (content {:.2}, style {:.2}) lr {:.3}",
                update.iter.current,
                update.iter.total,
                update.losses.total,
                update.losses.content,
                update.losses.style,
                update.learning_rate
            );
        }

        if let Some(ref saver) = self.saver {
            if let Err(e) = saver.maybe_save(&update) {
                eprintln!("unable to save intermediate image: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn intermediate_paths_keep_the_extension() {
        assert_eq!(
            intermediate_path(Path::new("out/final.jpg"), 500),
            Path::new("out/final_at_500.jpg")
        );
        assert_eq!(
            intermediate_path(Path::new("result"), 100),
            Path::new("result_at_100.png")
        );
    }

    #[test]
    fn unsupported_output_extensions_are_rejected_up_front() {
        let args = Transfer::from_iter(vec![
            "transfer",
            "--content",
            "content.png",
            "--style",
            "style.png",
            "--weights",
            "vgg19.safetensors",
            "--out",
            "out.tiff",
        ]);

        // none of the input paths exist, the extension must be checked
        // before anything tries to read them
        let err = transfer(args).unwrap_err();
        assert_eq!(err.to_string(), "the output format 'tiff' is not supported");
    }
}
