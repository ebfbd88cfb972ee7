use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use ticket_core::CleaningConfig;

/// Grayscale + fixed global threshold: ink black, paper white.
pub fn clean(image: &DynamicImage, config: &CleaningConfig) -> GrayImage {
    let gray: GrayImage = image.to_luma8();
    let threshold = config.threshold;
    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Swap ink and paper so ink becomes the foreground.
pub fn invert(binary: &GrayImage) -> GrayImage {
    ImageBuffer::from_fn(binary.width(), binary.height(), |x, y| {
        Luma([255 - binary.get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn output_is_binary_and_same_size() {
        let img: GrayImage = ImageBuffer::from_fn(256, 3, |x, _| Luma([x as u8]));
        let out = clean(&DynamicImage::ImageLuma8(img), &CleaningConfig::default());
        assert_eq!(out.dimensions(), (256, 3));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let img: GrayImage = ImageBuffer::from_fn(3, 1, |x, _| Luma([[126u8, 127, 128][x as usize]]));
        let out = clean(&DynamicImage::ImageLuma8(img), &CleaningConfig::default());
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 0);
        assert_eq!(out.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn dark_ink_on_colored_paper() {
        let img = RgbImage::from_fn(4, 1, |x, _| {
            if x < 2 { Rgb([20, 30, 25]) } else { Rgb([250, 235, 200]) }
        });
        let out = clean(&DynamicImage::ImageRgb8(img), &CleaningConfig::default());
        let row: Vec<u8> = out.pixels().map(|p| p[0]).collect();
        assert_eq!(row, vec![0, 0, 255, 255]);
    }

    #[test]
    fn invert_swaps_ink_and_paper() {
        let img: GrayImage = ImageBuffer::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        let inv = invert(&img);
        assert_eq!(inv.get_pixel(0, 0)[0], 255);
        assert_eq!(inv.get_pixel(1, 0)[0], 0);
    }
}
