use neural_style as ns;

fn main() -> Result<(), ns::Error> {
    let styler = ns::Session::builder()
        .content(&"imgs/content.jpg")
        .style(&"imgs/style.jpg")
        .vgg_weights("vgg19.safetensors")
        .iterations(1000)
        .build()?;

    // print the loss every 100 steps and keep a copy of the image so far
    let progress = |update: ns::ProgressUpdate<'_>| {
        if update.iter.current % 100 != 0 {
            return;
        }

        println!(
            "{}/{}: loss {:.2} (content {:.2}, style {:.2}) lr {:.3}",
            update.iter.current,
            update.iter.total,
            update.losses.total,
            update.losses.content,
            update.losses.style,
            update.learning_rate
        );

        if let Err(e) = update.image.save(format!("out/02_at_{}.png", update.iter.current)) {
            eprintln!("unable to save intermediate image: {}", e);
        }
    };

    let generated = styler.run(Some(Box::new(progress)));

    generated.save("out/02.png")
}
