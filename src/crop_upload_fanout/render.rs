//! Crop and annotate the best frame

use crate::error::Result;
use crate::models::BoundingBox;
use crate::snapshot_service::encode_jpeg;
use image::{DynamicImage, Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
const ARTIFACT_QUALITY: u8 = 95;

/// Encoded artifacts of one best frame
#[derive(Debug)]
pub struct RenderedFrame {
    /// One entry per valid box, `None` when the box has no area in the frame
    pub crops: Vec<Option<Vec<u8>>>,
    /// Full frame with every box drawn
    pub annotated: Vec<u8>,
}

/// Decode once, crop every box, draw every box on a copy
pub fn render(frame: &[u8], boxes: &[BoundingBox]) -> Result<RenderedFrame> {
    let img = image::load_from_memory(frame)?;
    let (width, height) = (img.width(), img.height());

    let mut crops = Vec::with_capacity(boxes.len());
    for bbox in boxes {
        let crop = match bbox.pixel_rect(width, height) {
            Some((x, y, w, h)) => Some(encode_jpeg(&img.crop_imm(x, y, w, h), ARTIFACT_QUALITY)?),
            None => None,
        };
        crops.push(crop);
    }

    let mut canvas = img.to_rgb8();
    for bbox in boxes {
        if let Some(rect) = bbox.pixel_rect(width, height) {
            draw_rectangle(&mut canvas, rect, BOX_COLOR);
        }
    }
    let annotated = encode_jpeg(&DynamicImage::ImageRgb8(canvas), ARTIFACT_QUALITY)?;

    Ok(RenderedFrame { crops, annotated })
}

fn draw_rectangle(canvas: &mut RgbImage, (x, y, w, h): (u32, u32, u32, u32), color: Rgb<u8>) {
    let right = (x + w).min(canvas.width()).saturating_sub(1);
    let bottom = (y + h).min(canvas.height()).saturating_sub(1);

    for t in 0..BOX_THICKNESS {
        let top = (y + t).min(bottom);
        let low = bottom.saturating_sub(t).max(y);
        let left = (x + t).min(right);
        let rgt = right.saturating_sub(t).max(x);

        for px in x..=right {
            canvas.put_pixel(px, top, color);
            canvas.put_pixel(px, low, color);
        }
        for py in y..=bottom {
            canvas.put_pixel(left, py, color);
            canvas.put_pixel(rgt, py, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_service::testing::solid_jpeg;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox {
            x1,
            y1,
            x2,
            y2,
            score: 0.9,
        }
    }

    #[test]
    fn test_crops_have_box_dimensions() {
        let frame = solid_jpeg(64, 48);
        let rendered = render(&frame, &[bbox(4.0, 4.0, 20.0, 12.0), bbox(70.0, 0.0, 90.0, 10.0)]).unwrap();

        assert_eq!(rendered.crops.len(), 2);
        let crop = image::load_from_memory(rendered.crops[0].as_ref().unwrap()).unwrap();
        assert_eq!((crop.width(), crop.height()), (16, 8));
        // Entirely outside the frame
        assert!(rendered.crops[1].is_none());
    }

    #[test]
    fn test_annotation_keeps_frame_size() {
        let frame = solid_jpeg(64, 48);
        let rendered = render(&frame, &[bbox(0.0, 0.0, 64.0, 48.0)]).unwrap();

        let annotated = image::load_from_memory(&rendered.annotated).unwrap();
        assert_eq!((annotated.width(), annotated.height()), (64, 48));
    }

    #[test]
    fn test_rectangle_draws_edges() {
        let mut canvas = RgbImage::new(10, 10);
        draw_rectangle(&mut canvas, (2, 2, 5, 5), BOX_COLOR);

        assert_eq!(*canvas.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(6, 6), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(4, 3), BOX_COLOR);
        // Interior untouched
        assert_eq!(*canvas.get_pixel(4, 4), Rgb([0, 0, 0]));
        assert_eq!(*canvas.get_pixel(8, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_garbage_frame_is_error() {
        assert!(render(b"not a jpeg", &[]).is_err());
    }
}
