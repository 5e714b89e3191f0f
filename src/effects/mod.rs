pub(crate) mod rainbow;
pub(crate) mod raindrop;
pub(crate) mod rotation;
pub(crate) mod staticcolor;

use std::str::FromStr;

use palette::{LinSrgb, Mix, Srgb, WithAlpha};

use crate::error::ConfigError;
use crate::operation::{Operation, Pipeline};
use crate::pixel::Pixel;

use rainbow::Rainbow;
use raindrop::Raindrop;
use rotation::Rotation;
use staticcolor::StaticColor;

/// What lightsd runs when the config does not say otherwise.
pub const DEFAULT_PIPELINE: [&str; 3] = ["rainbow", "raindrop", "rotation"];

/// Builds the pipeline from effect names, in render order. Each effect is
/// addressed by its own name.
pub fn build_pipeline(names: &[String], fps: u32) -> Result<Pipeline, ConfigError> {
    let mut operations = Vec::with_capacity(names.len());
    for name in names {
        let operation = match name.as_str() {
            "rainbow" => Operation::new(name, Rainbow::new()),
            "raindrop" => Operation::new(name, Raindrop::new()),
            "rotation" => Operation::new(name, Rotation::new(60.0, fps)),
            "static" => Operation::new(name, StaticColor::new("#ffffff")),
            _ => return Err(ConfigError::UnknownEffect(name.clone())),
        };
        operations.push(operation);
    }
    Pipeline::new(operations)
}

/// A colour parameter kept as text. Remembers the last colour that parsed
/// so a typo does not black out the strip.
pub(crate) struct HexColor {
    source: String,
    color: Srgb<u8>,
}

impl HexColor {
    pub fn new(text: &str) -> HexColor {
        HexColor {
            source: text.to_string(),
            color: Srgb::<u8>::from_str(text.trim()).unwrap_or(Srgb::<u8>::new(255, 255, 255)),
        }
    }

    pub fn resolve(&mut self, text: &str) -> Srgb<u8> {
        if text != self.source {
            match Srgb::<u8>::from_str(text.trim()) {
                Ok(color) => self.color = color,
                Err(err) => log::warn!("Keeping previous colour, cannot parse {text:?}: {err}"),
            }
            self.source = text.to_string();
        }
        self.color
    }
}

pub(crate) fn to_pixel(color: Srgb<u8>) -> Pixel {
    color.with_alpha(255)
}

/// Linear-light mix of `color` over `pixel` with weight `amount` in 0..1.
pub(crate) fn blend(pixel: Pixel, color: Srgb<u8>, amount: f32) -> Pixel {
    let base: LinSrgb = pixel.color.into_format::<f32>().into_linear();
    let top: LinSrgb = color.into_format::<f32>().into_linear();
    let mixed: Srgb = Srgb::from_linear(base.mix(top, amount.clamp(0.0, 1.0)));
    mixed.into_format::<u8>().with_alpha(pixel.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_color_keeps_last_good_value() {
        let mut color = HexColor::new("#0a141e");
        assert_eq!(color.resolve("#0a141e"), Srgb::<u8>::new(10, 20, 30));
        assert_eq!(color.resolve("ff0000"), Srgb::<u8>::new(255, 0, 0));
        assert_eq!(color.resolve("not a colour"), Srgb::<u8>::new(255, 0, 0));
    }

    #[test]
    fn blend_ends() {
        let base = Pixel::new(0, 0, 0, 255);
        let red = Srgb::<u8>::new(255, 0, 0);
        assert_eq!(blend(base, red, 0.0), base);
        assert_eq!(blend(base, red, 1.0), Pixel::new(255, 0, 0, 255));
        assert_eq!(blend(base, red, 7.0), Pixel::new(255, 0, 0, 255));
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn default_pipeline_registers() {
        let pipeline = build_pipeline(&names(&DEFAULT_PIPELINE), 60).unwrap();
        let built: Vec<&str> = pipeline.operations().iter().map(|op| op.name()).collect();
        assert_eq!(built, DEFAULT_PIPELINE);

        let registry = crate::registry::ParameterRegistry::new(&pipeline).unwrap();
        let exported: Vec<&str> = registry.names().collect();
        assert_eq!(
            exported,
            vec![
                "rainbow/brightness",
                "rainbow/speed",
                "rainbow/width",
                "raindrop/color",
                "raindrop/decay",
                "raindrop/enabled",
                "raindrop/rate",
                "rotation/speed",
            ]
        );
    }

    #[test]
    fn unknown_effects_are_rejected() {
        assert_eq!(
            build_pipeline(&names(&["rainbow", "sparkle"]), 60).err(),
            Some(ConfigError::UnknownEffect("sparkle".to_string()))
        );
    }

    #[test]
    fn the_same_effect_twice_is_rejected() {
        assert_eq!(
            build_pipeline(&names(&["static", "static"]), 60).err(),
            Some(ConfigError::DuplicateOperation("static".to_string()))
        );
    }
}
