//! Turns uploaded image bytes into the `(1, H, W, 3)` tensor the classifier expects.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader};
use ndarray::Array4;

/// Model input size in pixels, written `W,H` in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl Default for TargetSize {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
        }
    }
}

impl FromStr for TargetSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(',')
            .ok_or_else(|| format!("expected W,H but got {s:?}"))?;
        let dimension = |v: &str| match v.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid dimension {v:?}")),
            Ok(n) => Ok(n),
        };
        Ok(Self {
            width: dimension(width)?,
            height: dimension(height)?,
        })
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

/// Pixel value scaling applied after resize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Normalization {
    /// `v / 255`
    #[default]
    ZeroToOne,
    /// `v / 127.5 - 1`
    MinusOneToOne,
}

impl Normalization {
    pub fn scale(self, value: u8) -> f32 {
        match self {
            Normalization::ZeroToOne => f32::from(value) / 255.0,
            Normalization::MinusOneToOne => f32::from(value) / 127.5 - 1.0,
        }
    }
}

impl FromStr for Normalization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0_1" => Ok(Normalization::ZeroToOne),
            "-1_1" => Ok(Normalization::MinusOneToOne),
            other => Err(format!("unknown normalization {other:?}")),
        }
    }
}

/// Clockwise rotation needed to display an image upright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Only pure rotations are honoured; mirrored orientations are left as decoded.
    pub fn from_orientation(orientation: Orientation) -> Option<Self> {
        match orientation {
            Orientation::Rotate90 => Some(Rotation::Clockwise90),
            Orientation::Rotate180 => Some(Rotation::Clockwise180),
            Orientation::Rotate270 => Some(Rotation::Clockwise270),
            _ => None,
        }
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Clockwise180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        }
    }
}

/// A decoded upload together with the rotation its metadata asks for.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub rotation: Option<Rotation>,
}

impl DecodedImage {
    /// Fails only when the bytes are not a decodable image. Unreadable orientation data yields `None`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_decoder()?;
        let rotation = decoder
            .orientation()
            .ok()
            .and_then(Rotation::from_orientation);
        let image = DynamicImage::from_decoder(decoder)?;
        Ok(Self { image, rotation })
    }

    pub fn upright(self) -> DynamicImage {
        match self.rotation {
            Some(rotation) => rotation.apply(self.image),
            None => self.image,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Preprocessor {
    pub size: TargetSize,
    pub normalization: Normalization,
}

impl Preprocessor {
    pub fn new(size: TargetSize, normalization: Normalization) -> Self {
        Self {
            size,
            normalization,
        }
    }

    pub fn tensor(&self, decoded: DecodedImage) -> Array4<f32> {
        let rgb = decoded.upright().to_rgb8();
        let TargetSize { width, height } = self.size;
        let resized = imageops::resize(&rgb, width, height, FilterType::Triangle);

        Array4::from_shape_fn(
            (1, height as usize, width as usize, 3),
            |(_, y, x, c)| {
                self.normalization
                    .scale(resized.get_pixel(x as u32, y as u32)[c])
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    /// Encodes a 4x2 JPEG and inserts an APP1 Exif segment carrying `orientation` after SOI.
    fn jpeg_with_orientation(orientation: u16, magic: &[u8; 6]) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([0, 128, 255])));
        let jpeg = encode(&image, ImageFormat::Jpeg);

        // Little-endian TIFF header, one IFD entry: 0x0112 SHORT x1.
        let mut tiff = vec![b'I', b'I', 0x2a, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00];
        tiff.extend_from_slice(&[0x12, 0x01, 0x03, 0x00, 0x01, 0x00, 0x00, 0x00]);
        tiff.extend_from_slice(&orientation.to_le_bytes());
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let mut payload = magic.to_vec();
        payload.extend_from_slice(&tiff);
        let length = u16::try_from(payload.len() + 2).unwrap();

        let mut bytes = jpeg[..2].to_vec();
        bytes.extend_from_slice(&[0xff, 0xe1]);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&jpeg[2..]);
        bytes
    }

    #[test]
    fn exif_rotations_are_detected_from_jpeg_bytes() {
        let cases = [
            (1, None, (4, 2)),
            (3, Some(Rotation::Clockwise180), (4, 2)),
            (6, Some(Rotation::Clockwise90), (2, 4)),
            (8, Some(Rotation::Clockwise270), (2, 4)),
        ];
        for (orientation, expected, upright_dims) in cases {
            let bytes = jpeg_with_orientation(orientation, b"Exif\0\0");
            let decoded = DecodedImage::from_bytes(&bytes).unwrap();
            assert_eq!(decoded.rotation, expected, "orientation {orientation}");
            assert_eq!(decoded.image.to_rgb8().dimensions(), (4, 2));
            assert_eq!(decoded.upright().to_rgb8().dimensions(), upright_dims);
        }
    }

    #[test]
    fn corrupt_exif_is_ignored() {
        let bytes = jpeg_with_orientation(6, b"Exix\0\0");
        let decoded = DecodedImage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.rotation, None);

        let tensor = Preprocessor::default().tensor(decoded);
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
    }

    fn assert_unit_range(tensor: &Array4<f32>) {
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn any_size_and_mode_yields_configured_shape() {
        let preprocessor = Preprocessor::default();
        let images = [
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 31, Luma([128]))),
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 500, Rgba([0, 255, 0, 10]))),
        ];

        for image in images {
            let bytes = encode(&image, ImageFormat::Png);
            let tensor = preprocessor.tensor(DecodedImage::from_bytes(&bytes).unwrap());
            assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
            assert_unit_range(&tensor);
        }
    }

    #[test]
    fn non_square_target_is_height_then_width() {
        let preprocessor = Preprocessor::new(
            TargetSize {
                width: 32,
                height: 16,
            },
            Normalization::ZeroToOne,
        );
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 9, Rgb([1, 2, 3])));
        let tensor = preprocessor.tensor(DecodedImage {
            image,
            rotation: None,
        });
        assert_eq!(tensor.shape(), &[1, 16, 32, 3]);
    }

    #[test]
    fn solid_red_jpeg_keeps_channel_order() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let bytes = encode(&image, ImageFormat::Jpeg);
        let decoded = DecodedImage::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.rotation, None);

        let tensor = Preprocessor::default().tensor(decoded);
        assert_unit_range(&tensor);
        let (r, g, b) = (tensor[[0, 112, 112, 0]], tensor[[0, 112, 112, 1]], tensor[[0, 112, 112, 2]]);
        assert!(r > 0.9, "red channel was {r}");
        assert!(g < 0.1 && b < 0.1, "green {g} blue {b}");
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        assert!(DecodedImage::from_bytes(b"definitely not an image").is_err());
        assert!(DecodedImage::from_bytes(&[]).is_err());
    }

    #[test]
    fn normalization_modes() {
        assert_eq!(Normalization::ZeroToOne.scale(0), 0.0);
        assert_eq!(Normalization::ZeroToOne.scale(255), 1.0);
        assert_eq!(Normalization::MinusOneToOne.scale(0), -1.0);
        assert_eq!(Normalization::MinusOneToOne.scale(255), 1.0);
        assert!((Normalization::MinusOneToOne.scale(127) + 0.0039).abs() < 1e-3);

        let preprocessor = Preprocessor::new(TargetSize::default(), Normalization::MinusOneToOne);
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([0])));
        let tensor = preprocessor.tensor(DecodedImage {
            image,
            rotation: None,
        });
        assert!(tensor.iter().all(|&v| v == -1.0));
    }

    #[test]
    fn only_pure_rotations_are_honoured() {
        assert_eq!(
            Rotation::from_orientation(Orientation::Rotate90),
            Some(Rotation::Clockwise90)
        );
        assert_eq!(
            Rotation::from_orientation(Orientation::Rotate180),
            Some(Rotation::Clockwise180)
        );
        assert_eq!(
            Rotation::from_orientation(Orientation::Rotate270),
            Some(Rotation::Clockwise270)
        );
        assert_eq!(Rotation::from_orientation(Orientation::NoTransforms), None);
        assert_eq!(Rotation::from_orientation(Orientation::FlipHorizontal), None);
        assert_eq!(Rotation::from_orientation(Orientation::Rotate90FlipH), None);
    }

    #[test]
    fn quarter_turns_expand_the_canvas() {
        // 2x1: red on the left, blue on the right.
        let mut strip = RgbImage::new(2, 1);
        strip.put_pixel(0, 0, Rgb([255, 0, 0]));
        strip.put_pixel(1, 0, Rgb([0, 0, 255]));

        let turned = DecodedImage {
            image: DynamicImage::ImageRgb8(strip.clone()),
            rotation: Some(Rotation::Clockwise90),
        }
        .upright()
        .to_rgb8();
        assert_eq!(turned.dimensions(), (1, 2));
        assert_eq!(turned.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(turned.get_pixel(0, 1), &Rgb([0, 0, 255]));

        let flipped = Rotation::Clockwise180
            .apply(DynamicImage::ImageRgb8(strip))
            .to_rgb8();
        assert_eq!(flipped.dimensions(), (2, 1));
        assert_eq!(flipped.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn target_size_parsing() {
        assert_eq!(
            "224,224".parse::<TargetSize>(),
            Ok(TargetSize {
                width: 224,
                height: 224
            })
        );
        assert_eq!(
            " 300 , 200 ".trim().parse::<TargetSize>(),
            Ok(TargetSize {
                width: 300,
                height: 200
            })
        );
        assert!("224".parse::<TargetSize>().is_err());
        assert!("0,224".parse::<TargetSize>().is_err());
        assert!("a,b".parse::<TargetSize>().is_err());
        assert_eq!(TargetSize::default().to_string(), "224,224");
    }
}
