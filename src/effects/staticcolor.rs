use crate::effects::{to_pixel, HexColor};
use crate::operation::{Effect, Parameter};
use crate::pixel::Pixel;

pub struct StaticColor {
    color: String,
    enabled: bool,
    resolved: HexColor,
}

impl StaticColor {
    pub fn new(color: &str) -> StaticColor {
        StaticColor {
            color: color.to_string(),
            enabled: true,
            resolved: HexColor::new(color),
        }
    }
}

impl Effect for StaticColor {
    fn parameters(&mut self) -> Vec<Parameter<'_>> {
        vec![
            Parameter::text("color", &mut self.color),
            Parameter::bool("enabled", &mut self.enabled),
        ]
    }

    fn render(&mut self, pixels: &mut [Pixel]) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        let color = to_pixel(self.resolved.resolve(&self.color));
        pixels.fill(color);
        Ok(())
    }
}
