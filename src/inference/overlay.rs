//! Prediction overlay drawn onto video frames.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::Text,
};
use image::{Rgb, RgbImage};

use crate::landmarks::{Bounds, LandmarkSet, HAND_CONNECTIONS};

const BONE_COLOR: Rgb888 = Rgb888::WHITE;
const JOINT_COLOR: Rgb888 = Rgb888::RED;
const LABEL_BOX_COLOR: Rgb888 = Rgb888::BLUE;
const LABEL_TEXT_COLOR: Rgb888 = Rgb888::WHITE;

/// Label box placement relative to the hand's top-left corner, in pixels.
const LABEL_OFFSET: (i32, i32) = (-10, -60);
const LABEL_SIZE: (u32, u32) = (175, 40);
const TEXT_OFFSET: (i32, i32) = (5, 30);

/// Draws the hand skeleton: a line per bone and a dot per landmark.
pub fn draw_hand(image: &mut RgbImage, landmarks: &LandmarkSet) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let to_point = |x: f32, y: f32| Point::new((x * w) as i32, (y * h) as i32);
    let mut target = Target(image);

    let bone_style = PrimitiveStyle::with_stroke(BONE_COLOR, 2);
    for (a, b) in HAND_CONNECTIONS {
        let (Some(a), Some(b)) = (landmarks.get(*a), landmarks.get(*b)) else {
            continue;
        };
        draw(
            Line::new(to_point(a.x, a.y), to_point(b.x, b.y)).into_styled(bone_style),
            &mut target,
        );
    }

    let joint_style = PrimitiveStyle::with_fill(JOINT_COLOR);
    for lm in landmarks.points() {
        draw(
            Circle::with_center(to_point(lm.x, lm.y), 5).into_styled(joint_style),
            &mut target,
        );
    }
}

/// Draws a filled box with `Predicted: <letter>` just above the hand.
pub fn draw_label(image: &mut RgbImage, hand: &Bounds, letter: char) {
    let x = (hand.x_min * image.width() as f32) as i32 + LABEL_OFFSET.0;
    let y = (hand.y_min * image.height() as f32) as i32 + LABEL_OFFSET.1;
    let mut target = Target(image);

    draw(
        Rectangle::new(Point::new(x, y), Size::new(LABEL_SIZE.0, LABEL_SIZE.1))
            .into_styled(PrimitiveStyle::with_fill(LABEL_BOX_COLOR)),
        &mut target,
    );

    let text = format!("Predicted: {}", letter);
    draw(
        Text::new(
            &text,
            Point::new(x + TEXT_OFFSET.0, y + TEXT_OFFSET.1),
            MonoTextStyle::new(&FONT_10X20, LABEL_TEXT_COLOR),
        ),
        &mut target,
    );
}

fn draw<D: Drawable<Color = Rgb888>>(item: D, target: &mut Target<'_>) {
    match item.draw(target) {
        Ok(_) => {}
        Err(infallible) => match infallible {},
    }
}

/// Clips drawing to the image; anything off-frame is dropped.
struct Target<'a>(&'a mut RgbImage);

impl OriginDimensions for Target<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Target<'_> {
    type Color = Rgb888;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = (self.0.width(), self.0.height());
        for Pixel(point, color) in pixels {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < width
                && (point.y as u32) < height
            {
                self.0.put_pixel(
                    point.x as u32,
                    point.y as u32,
                    Rgb([color.r(), color.g(), color.b()]),
                );
            }
        }
        Ok(())
    }
}
