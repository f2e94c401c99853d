//! Perceptual content fingerprints
//!
//! The content id of an image combines two perceptual hashes (a coarse color
//! histogram and an 8x8 average hash) with the source URL, so the same visual
//! content fetched from the same URL always gets the same id.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use xxhash_rust::xxh3::xxh3_128;

/// Bits per value of the color hash
const COLOR_BINBITS: u32 = 3;

/// Hue bins per saturation class
const HUE_BINS: usize = 12;

/// Side of the average-hash thumbnail
const AVERAGE_HASH_SIZE: u32 = 8;

/// ITU-R 601-2 luma, in 16.16 fixed point
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let l = (u32::from(r) * 19_595 + u32::from(g) * 38_470 + u32::from(b) * 7_471 + 0x8000) >> 16;
    l.min(255) as u8
}

/// Hue and saturation on a 0..=255 scale
fn hue_saturation(r: u8, g: u8, b: u8) -> (u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return (0, 0);
    }

    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let (maxf, minf) = (f64::from(max), f64::from(min));
    let chroma = maxf - minf;
    let s = chroma / maxf;
    let rc = (maxf - r) / chroma;
    let gc = (maxf - g) / chroma;
    let bc = (maxf - b) / chroma;

    let h = if r == maxf {
        bc - gc
    } else if g == maxf {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    let h = (h / 6.0 + 1.0).rem_euclid(1.0);

    ((h * 255.0) as u8, (s * 255.0) as u8)
}

fn grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

fn quantise(count: usize, total: usize) -> u32 {
    let max_value = 1usize << COLOR_BINBITS;
    let scaled = if total == 0 { 0 } else { count * max_value / total };
    scaled.min(max_value - 1) as u32
}

/// Color-distribution hash: black fraction, gray fraction and two
/// hue histograms (faint and bright colors), 3 bits per value
#[must_use]
pub fn color_hash(image: &RgbImage) -> Vec<bool> {
    let total = (image.width() * image.height()) as usize;
    let mut black = 0usize;
    let mut gray = 0usize;
    let mut colored = 0usize;
    let mut faint = [0usize; HUE_BINS];
    let mut bright = [0usize; HUE_BINS];

    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        if luma(r, g, b) < 32 {
            black += 1;
            continue;
        }
        let (h, s) = hue_saturation(r, g, b);
        if s < 85 {
            gray += 1;
            continue;
        }
        colored += 1;
        let bin = (usize::from(h) * HUE_BINS / 255).min(HUE_BINS - 1);
        if s < 170 {
            faint[bin] += 1;
        } else if s > 170 {
            bright[bin] += 1;
        }
    }

    let colored = colored.max(1);
    let mut values = vec![quantise(black, total), quantise(gray, total)];
    values.extend(faint.iter().chain(bright.iter()).map(|&count| quantise(count, colored)));

    values
        .into_iter()
        .flat_map(|v| {
            (0..COLOR_BINBITS).map(move |i| {
                (v / 2u32.pow(COLOR_BINBITS - i - 1)) % 2u32.pow(COLOR_BINBITS - i) > 0
            })
        })
        .collect()
}

/// Average hash: 8x8 grayscale thumbnail, one bit per pixel above the mean
#[must_use]
pub fn average_hash(image: &RgbImage) -> Vec<bool> {
    let small = imageops::resize(
        &grayscale(image),
        AVERAGE_HASH_SIZE,
        AVERAGE_HASH_SIZE,
        FilterType::Lanczos3,
    );
    let pixels: Vec<u32> = small.pixels().map(|p| u32::from(p.0[0])).collect();
    let mean = f64::from(pixels.iter().sum::<u32>()) / pixels.len().max(1) as f64;
    pixels.into_iter().map(|p| f64::from(p) > mean).collect()
}

/// Both perceptual hashes as a string: `0` for a set bit, `I` for a clear one
#[must_use]
pub fn perceptual_signature(image: &RgbImage) -> String {
    color_hash(image)
        .into_iter()
        .chain(average_hash(image))
        .map(|bit| if bit { '0' } else { 'I' })
        .collect()
}

/// Content id of an image fetched from `url`: 32 hex digits
#[must_use]
pub fn content_id(url: &str, image: &RgbImage) -> String {
    let mut input = String::with_capacity(url.len() + 106);
    input.push_str(url);
    input.push_str(&perceptual_signature(image));
    format!("{:032x}", xxh3_128(input.as_bytes()))
}
