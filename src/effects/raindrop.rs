use rand::Rng;

use crate::effects::{blend, HexColor};
use crate::operation::{Effect, Parameter};
use crate::pixel::Pixel;

struct Droplet {
    position: usize,
    intensity: f32,
}

/// Drops that light up a random pixel and fade out, drawn over whatever
/// the previous operations rendered.
pub struct Raindrop {
    rate: f64,
    decay: f64,
    color: String,
    enabled: bool,
    resolved: HexColor,
    drops: Vec<Droplet>,
}

impl Raindrop {
    pub fn new() -> Raindrop {
        let color = "#ffffff".to_string();
        Raindrop {
            rate: 0.5,
            decay: 0.92,
            resolved: HexColor::new(&color),
            color,
            enabled: true,
            drops: vec![],
        }
    }

    fn spawn_drops(&mut self, pixel_count: usize) {
        if pixel_count == 0 {
            return;
        }

        let mut rng = rand::thread_rng();
        let rate = self.rate.max(0.0);
        let mut count = rate.trunc() as usize;
        if rng.gen::<f64>() < rate.fract() {
            count += 1;
        }

        for _ in 0..count.min(pixel_count) {
            self.drops.push(Droplet {
                position: rng.gen_range(0..pixel_count),
                intensity: 1.0,
            });
        }

        // At most one drop per pixel; the oldest go first.
        let excess = self.drops.len().saturating_sub(pixel_count);
        self.drops.drain(..excess);
    }
}

impl Effect for Raindrop {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::float("rate", &mut self.rate),
            Parameter::float("decay", &mut self.decay),
            Parameter::text("color", &mut self.color),
            Parameter::bool("enabled", &mut self.enabled),
        ]
    }

    fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String> {
        if !self.enabled {
            self.drops.clear();
            return Ok(());
        }

        let decay = self.decay.clamp(0.0, 1.0) as f32;
        for drop in &mut self.drops {
            drop.intensity *= decay;
        }
        self.drops
            .retain(|drop| drop.intensity > 0.02 && drop.position < pixels.len());
        self.spawn_drops(pixels.len());

        let color = self.resolved.resolve(&self.color);
        for drop in &self.drops {
            pixels[drop.position] = blend(pixels[drop.position], color, drop.intensity);
        }
        Ok(())
    }
}
