//! Frame conversion and transformation utilities.

use image::RgbImage;

use super::types::{Frame, FrameFormat};

/// Convert a nokhwa buffer into an RGB image.
///
/// Handles the camera's native formats (MJPEG, YUYV, NV12, ...) through
/// nokhwa's `decode_image`. Returns `None` if the conversion fails.
#[cfg(feature = "native")]
pub fn decode_rgb(buffer: &nokhwa::Buffer) -> Option<RgbImage> {
    use nokhwa::pixel_format::RgbFormat;

    let decoded = buffer.decode_image::<RgbFormat>().ok()?;
    let resolution = buffer.resolution();
    RgbImage::from_raw(resolution.width(), resolution.height(), decoded.into_raw())
}

/// Copy a preview frame into an image buffer.
///
/// Returns `None` if the pixel data does not match the frame dimensions.
pub fn frame_to_image(frame: &Frame) -> Option<RgbImage> {
    match frame.format {
        FrameFormat::Rgb => RgbImage::from_raw(frame.width, frame.height, frame.data.clone()),
    }
}

/// Mirror a frame horizontally (flip left-right) for selfie mode.
pub fn mirror_horizontal(frame: &mut Frame) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let bpp = frame.bytes_per_pixel();

    for y in 0..height {
        let row_start = y * width * bpp;
        let row = &mut frame.data[row_start..row_start + width * bpp];

        for x in 0..width / 2 {
            let left = x * bpp;
            let right = (width - 1 - x) * bpp;
            for i in 0..bpp {
                row.swap(left + i, right + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::DevicePosition;
    use std::time::Instant;

    fn frame(data: Vec<u8>, width: u32, height: u32) -> Frame {
        Frame {
            data,
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
            sequence: 1,
            position: DevicePosition::Front,
        }
    }

    #[test]
    fn test_mirror_horizontal_2x1() {
        let mut f = frame(vec![1, 2, 3, 4, 5, 6], 2, 1);
        mirror_horizontal(&mut f);
        assert_eq!(f.data, vec![4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_mirror_horizontal_3x2() {
        // Row 0: [A, B, C], Row 1: [D, E, F]
        let mut f = frame(
            vec![
                1, 1, 1, 2, 2, 2, 3, 3, 3, //
                4, 4, 4, 5, 5, 5, 6, 6, 6,
            ],
            3,
            2,
        );
        mirror_horizontal(&mut f);
        assert_eq!(
            f.data,
            vec![
                3, 3, 3, 2, 2, 2, 1, 1, 1, //
                6, 6, 6, 5, 5, 5, 4, 4, 4,
            ]
        );
    }

    #[test]
    fn test_mirror_horizontal_single_pixel() {
        let mut f = frame(vec![1, 2, 3], 1, 1);
        mirror_horizontal(&mut f);
        assert_eq!(f.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_frame_to_image() {
        let f = frame(vec![10, 20, 30, 40, 50, 60], 2, 1);
        let image = frame_to_image(&f).unwrap();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(1, 0).0, [40, 50, 60]);
    }

    #[test]
    fn test_frame_to_image_size_mismatch() {
        let f = frame(vec![1, 2, 3], 2, 2);
        assert!(frame_to_image(&f).is_none());
    }
}
