use std::sync::Arc;

/// One LED. Only the colour channels leave the process; alpha is scratch
/// space for effects that want to blend.
pub type Pixel = palette::Srgba<u8>;

pub fn black() -> Pixel {
    Pixel::new(0, 0, 0, 255)
}

/// The strip. Its length is set once and effects only ever see a slice of
/// it, so nothing downstream can grow or shrink it.
pub struct PixelBuffer {
    pixels: Vec<Pixel>,
}

impl PixelBuffer {
    pub fn new(pixel_count: usize) -> PixelBuffer {
        PixelBuffer {
            pixels: vec![black(); pixel_count],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    pub fn snapshot(&self) -> Frame {
        Frame {
            values: self
                .pixels
                .iter()
                .map(|pixel| [pixel.red, pixel.green, pixel.blue])
                .collect(),
        }
    }
}

/// Colour channels of the strip at one tick, in strip order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    values: Arc<[[u8; 3]]>,
}

impl Frame {
    pub fn values(&self) -> &[[u8; 3]] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `{"values":[[r,g,b],...]}`
    pub fn encode(&self) -> EncodedFrame {
        let values: Vec<json::JsonValue> = self
            .values()
            .iter()
            .map(|[r, g, b]| json::array![*r, *g, *b])
            .collect();
        let payload = json::object! {
            values: values,
        };

        EncodedFrame(Arc::from(json::stringify(payload)))
    }
}

/// Wire form of a frame, shared between all viewers of a tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame(Arc<str>);

impl EncodedFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
