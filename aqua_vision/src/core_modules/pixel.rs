// THEORY (Single-Pixel Colour Heuristics):
// The `Pixel` module is the most fundamental unit of the vision system. It is a
// "dumb" data container for one RGB sample plus the handful of single-pixel metrics
// the detector needs: a gray level, a brightness, a saturation and a channel range.
// Nothing here reads neighbours or history; anything comparative (motion, edge
// variance, colour ratios over a region) lives in higher-level modules.
//
// All metrics stay in the raw 0..255 sRGB domain. The heuristics downstream were
// tuned against these exact definitions, so there is no linearisation or gamma
// handling here:
// - gray:        floor((r + g + b) / 3), an integer intensity for edge and motion maps
// - brightness:  (r + g + b) / 3 as a float
// - saturation:  HSV-style (max - min) / max, 0 for black
// - range:       max - min, used to spot flat, uniform regions

pub mod pixel {
    pub type Channel = u8;
    pub type Gray = u8;
    pub type Brightness = f32;
    pub type Saturation = f32;

    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing the colour of a single pixel.
    /// Alpha is dropped at ingestion; nothing in the pipeline reads it.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Builds a pixel from one RGBA quadruple. Returns `None` if the slice is
        /// not exactly one pixel long.
        pub fn from_rgba(bytes: &[u8]) -> Option<Self> {
            match bytes {
                [r, g, b, _a] => Some(Pixel::new(*r, *g, *b)),
                _ => None,
            }
        }

        /// =================================Heuristics==================================

        /// Integer intensity, the value the edge and motion maps are built from.
        pub fn gray(&self) -> Gray {
            ((self.red as u16 + self.green as u16 + self.blue as u16) / 3) as Gray
        }

        /// Mean of the three channels, 0.0..=255.0.
        pub fn brightness(&self) -> Brightness {
            (self.red as f32 + self.green as f32 + self.blue as f32) / 3.0
        }

        pub fn max_channel(&self) -> Channel {
            self.red.max(self.green.max(self.blue))
        }

        pub fn min_channel(&self) -> Channel {
            self.red.min(self.green.min(self.blue))
        }

        /// Spread between the strongest and weakest channel (chroma in 0..255 units).
        pub fn channel_range(&self) -> Channel {
            self.max_channel() - self.min_channel()
        }

        /// Saturation (HSV): chroma / value. 0.0 for black and for perfect grays.
        pub fn saturation(&self) -> Saturation {
            let maximum = self.max_channel();
            if maximum == 0 {
                return 0.0;
            }
            self.channel_range() as Saturation / maximum as Saturation
        }
    }

    impl From<[Channel; 3]> for Pixel {
        fn from(rgb: [Channel; 3]) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }
}
