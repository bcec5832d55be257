use anyhow::Result;
use gneiss::prelude::*;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> Result<PathBuf> {
    let path = dir.join(name);
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    ImageHandle::new(DynamicImage::ImageRgba8(pixels)).save_auto(&path)?;
    Ok(path)
}

#[test]
fn test_resize_to_width_keeps_aspect() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    let input = write_image(dir.path(), "landscape.png", 1600, 1200)?;
    let out_dir = dir.path().join("out");

    let report = BatchProcessor::new().resize_images(
        &[&input],
        ResizeOptions::width(800),
        Some(&out_dir),
        &BatchConfig::new(),
    )?;

    assert!(report.is_complete_success());
    let resized = ImageHandle::load(out_dir.join("landscape_resized.png"))?;
    assert_eq!(resized.dimensions(), (800, 600));
    Ok(())
}

#[test]
fn test_pipeline_from_settings() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    let inputs = vec![
        write_image(dir.path(), "a.png", 64, 32)?,
        write_image(dir.path(), "b.png", 32, 64)?,
    ];

    let text = format!(
        r#"
        [batch]
        max_workers = 2

        [output]
        dir = "{}"
        format = "jpeg"
        suffix = ""
        quality = 75

        [[pipeline]]
        op = "resize"
        width = 16
        height = 16

        [[pipeline]]
        op = "rotate"
        degrees = 90

        [[pipeline]]
        op = "grayscale"
        "#,
        dir.path().join("web").display()
    );
    let settings = Settings::from_toml_str(&text)?;
    let pipeline = settings.build_pipeline()?;
    let layout = settings.output_layout()?;

    let report = BatchProcessor::new().process(
        layout.plan(&inputs),
        &pipeline,
        &settings.batch_config()?,
    )?;
    assert_eq!(report.success, 2);

    // Fit inside 16x16, then a quarter turn swaps the sides.
    let a = ImageHandle::load(dir.path().join("web/a.jpg"))?;
    assert_eq!(a.format(), Some(ImageFormat::Jpeg));
    assert_eq!(a.dimensions(), (8, 16));
    let b = ImageHandle::load(dir.path().join("web/b.jpg"))?;
    assert_eq!(b.dimensions(), (16, 8));
    Ok(())
}

#[test]
fn test_watermark_images() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    let input = write_image(dir.path(), "photo.png", 40, 40)?;
    let mark_path = dir.path().join("mark.png");
    ImageHandle::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        8,
        8,
        Rgba([255, 255, 255, 255]),
    )))
    .save_auto(&mark_path)?;

    let options = WatermarkOptions::from_path(&mark_path)?
        .with_position(Position::TopLeft)
        .with_opacity(1.0)
        .with_padding(0);
    let report =
        BatchProcessor::new().watermark_images(&[&input], options, None, &BatchConfig::new())?;
    assert_eq!(report.success, 1);

    let out = ImageHandle::load(dir.path().join("photo_watermarked.png"))?;
    assert_eq!(out.image().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    assert_eq!(out.image().get_pixel(20, 20), Rgba([20, 20, 128, 255]));
    Ok(())
}

#[test]
fn test_convert_format_drops_alpha_for_jpeg() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    let input = write_image(dir.path(), "icon.png", 10, 10)?;

    let report = BatchProcessor::new().convert_format(
        &[&input],
        ImageFormat::Jpeg,
        Quality::new(90),
        None,
        &BatchConfig::new(),
    )?;
    assert_eq!(report.success, 1);

    let converted = ImageHandle::load(dir.path().join("icon.jpg"))?;
    assert_eq!(converted.format(), Some(ImageFormat::Jpeg));
    assert!(!converted.has_alpha());
    Ok(())
}

#[test]
fn test_invalid_geometry_is_operation_failure() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    let input = write_image(dir.path(), "small.png", 10, 10)?;

    let pipeline = OperationPipeline::new().crop(CropRect::new(0, 0, 50, 50));
    let report = BatchProcessor::new().process(
        OutputLayout::new().plan([&input]),
        &pipeline,
        &BatchConfig::new(),
    )?;

    assert_eq!(report.failed, 1);
    assert_eq!(report.results[0].error_kind(), Some(ErrorKind::Operation));
    assert!(!dir.path().join("small_processed.png").exists());
    Ok(())
}

#[test]
fn test_discovered_inputs_feed_a_batch() -> Result<()> {
    init();
    let dir = TempDir::new()?;
    write_image(dir.path(), "one.png", 4, 4)?;
    write_image(dir.path(), "two.bmp", 4, 4)?;
    std::fs::write(dir.path().join("readme.txt"), "not an image")?;

    let inputs = find_images(dir.path(), false)?;
    assert_eq!(inputs.len(), 2);

    let pattern = format!("{}/*.png", dir.path().display());
    assert_eq!(expand_globs(&[pattern])?.len(), 1);

    let report = BatchProcessor::new().process(
        OutputLayout::new().with_output_dir(dir.path().join("out")).plan(&inputs),
        &OperationPipeline::new().invert(),
        &BatchConfig::new(),
    )?;
    assert_eq!(report.success, 2);
    assert!(dir.path().join("out/two_processed.bmp").exists());
    Ok(())
}
