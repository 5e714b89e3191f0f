use palette::{FromColor, Hsv, Srgb};

use crate::effects::to_pixel;
use crate::operation::{Effect, Parameter};
use crate::pixel::Pixel;

/// Hue gradient along the strip that scrolls a little every frame.
pub struct Rainbow {
    speed: f64,
    width: i64,
    brightness: f64,
    hue_offset: f64,
}

impl Rainbow {
    pub fn new() -> Rainbow {
        Rainbow {
            speed: 1.0,
            width: 300,
            brightness: 1.0,
            hue_offset: 0.0,
        }
    }
}

impl Effect for Rainbow {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::float("speed", &mut self.speed),
            Parameter::integer("width", &mut self.width),
            Parameter::float("brightness", &mut self.brightness),
        ]
    }

    fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String> {
        let step = 360.0 / self.width.max(1) as f64;
        let value = self.brightness.clamp(0.0, 1.0) as f32;

        for (i, pixel) in pixels.iter_mut().enumerate() {
            let hue = (self.hue_offset + step * i as f64).rem_euclid(360.0);
            let color = Srgb::from_color(Hsv::new(hue as f32, 1.0, value));
            *pixel = to_pixel(color.into_format::<u8>());
        }

        self.hue_offset = (self.hue_offset + self.speed).rem_euclid(360.0);
        Ok(())
    }
}
