use neural_style as ns;

fn main() -> Result<(), ns::Error> {
    let styler = ns::Session::builder()
        .content(&"imgs/content.jpg")
        .style(&"imgs/style.jpg")
        .vgg_weights("vgg19.safetensors")
        // lean much harder on the style image than the defaults do
        .style_weight(1.0)
        .content_weight(0.01)
        // start slower and decay more gently
        .learning_rate(0.5)
        .decay_steps(200)
        .decay_rate(0.9)
        .seed(42)
        .output_height(512)
        .build()?;

    let generated = styler.run(None);

    println!("final loss: {:.2}", generated.losses().total);

    generated.save("out/03.png")
}
