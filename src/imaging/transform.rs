//! Pixel-level helpers used around engine calls

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// Mid-value of an 8-bit channel; luma below it becomes black.
pub const BINARY_THRESHOLD: u8 = 128;

/// Resample to exactly `width` x `height` with bicubic filtering.
///
/// Returns the image untouched when it already has that size.
pub fn resize_to(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        return image;
    }
    image.resize_exact(width, height, FilterType::CatmullRom)
}

/// A white RGB canvas
pub fn blank_canvas(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
}

/// Grayscale threshold producing a strict two-level RGB image
pub fn binarize(image: &DynamicImage) -> DynamicImage {
    let mut gray = image.to_luma8();
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < BINARY_THRESHOLD { 0 } else { 255 };
    }
    DynamicImage::ImageLuma8(gray).into_rgb8().into()
}

/// Sobel gradient magnitude, inverted so edges are dark on white.
pub fn sobel_lines(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let mut out = GrayImage::from_pixel(width, height, Luma([255]));

    if width < 3 || height < 3 {
        return DynamicImage::ImageLuma8(out);
    }

    let at = |x: u32, y: u32| i32::from(gray.get_pixel(x, y).0[0]);

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2 * at(x, y - 1) + at(x + 1, y - 1));
            let magnitude = ((gx * gx + gy * gy) as f32).sqrt().min(255.0) as u8;
            out.put_pixel(x, y, Luma([255 - magnitude]));
        }
    }

    DynamicImage::ImageLuma8(out)
}
