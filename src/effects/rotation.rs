use crate::operation::{Effect, Parameter};
use crate::pixel::Pixel;

/// Turns the strip by `speed` pixels per second.
pub struct Rotation {
    speed: f64,
    fps: f64,
    offset: f64,
}

impl Rotation {
    pub fn new(speed: f64, fps: u32) -> Rotation {
        Rotation {
            speed,
            fps: fps.max(1) as f64,
            offset: 0.0,
        }
    }
}

impl Effect for Rotation {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![Parameter::float("speed", &mut self.speed)]
    }

    fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String> {
        if pixels.is_empty() {
            return Ok(());
        }

        let len = pixels.len() as f64;
        self.offset = (self.offset + self.speed / self.fps).rem_euclid(len);
        // rem_euclid rounds tiny negatives up to `len`.
        if !self.offset.is_finite() || self.offset >= len {
            self.offset = 0.0;
        }

        pixels.rotate_right(self.offset as usize);
        Ok(())
    }
}
