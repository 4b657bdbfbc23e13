fn main() -> Result<(), neural_style::Error> {
    //create a new session
    let styler = neural_style::Session::builder()
        //load the image whose layout we keep
        .content(&"imgs/content.jpg")
        //load the image whose look we borrow
        .style(&"imgs/style.jpg")
        //pre-trained VGG19 weights, see `neural-style fetch-weights`
        .vgg_weights("vgg19.safetensors")
        .build()?;

    //generate an image
    let generated = styler.run(None);

    //save the image to the disk
    generated.save("out/01.png")
}
