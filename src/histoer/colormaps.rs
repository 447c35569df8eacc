use image::Rgba;

#[derive(PartialEq, Debug, Copy, Clone, serde::Serialize, serde::Deserialize, Default)]
pub enum ColorMap {
    #[default]
    Viridis,
    /// Diverging map, used for pass/fail ratios
    SmoothCoolWarm,
}

#[derive(Debug, Copy, Clone, serde::Serialize, serde::Deserialize)]
pub struct ColormapOptions {
    pub log_norm: bool,
    pub reverse: bool,
}

impl Default for ColormapOptions {
    fn default() -> Self {
        ColormapOptions {
            log_norm: true,
            reverse: false,
        }
    }
}

// scalar, r, g, b
type ColorStop = (f64, u8, u8, u8);

const VIRIDIS: [ColorStop; 17] = [
    (0.0000, 68, 1, 84),
    (0.0645, 72, 25, 107),
    (0.1290, 71, 46, 124),
    (0.1935, 65, 66, 134),
    (0.2581, 58, 84, 140),
    (0.3226, 50, 101, 142),
    (0.3871, 43, 117, 142),
    (0.4516, 37, 133, 142),
    (0.5161, 32, 148, 140),
    (0.5806, 32, 163, 134),
    (0.6452, 45, 178, 125),
    (0.7097, 72, 193, 110),
    (0.7742, 106, 205, 91),
    (0.8387, 146, 215, 66),
    (0.9032, 190, 223, 38),
    (0.9677, 233, 228, 26),
    (1.0000, 253, 231, 37),
];

const SMOOTH_COOL_WARM: [ColorStop; 17] = [
    (0.0000, 59, 76, 192),
    (0.0645, 78, 105, 216),
    (0.1290, 99, 132, 235),
    (0.1935, 121, 156, 248),
    (0.2581, 144, 178, 254),
    (0.3226, 167, 196, 254),
    (0.3871, 188, 210, 247),
    (0.4516, 208, 218, 234),
    (0.5161, 225, 219, 215),
    (0.5806, 239, 207, 190),
    (0.6452, 246, 191, 165),
    (0.7097, 247, 169, 139),
    (0.7742, 242, 144, 113),
    (0.8387, 230, 115, 89),
    (0.9032, 214, 82, 67),
    (0.9677, 192, 41, 47),
    (1.0000, 180, 4, 38),
];

impl ColorMap {
    fn stops(&self) -> &'static [ColorStop] {
        match self {
            ColorMap::Viridis => &VIRIDIS,
            ColorMap::SmoothCoolWarm => &SMOOTH_COOL_WARM,
        }
    }

    /// Colour of `value` on the `[min, max]` scale.
    ///
    /// With `log_norm`, non-positive values are transparent.
    pub fn color(&self, value: f64, min: f64, max: f64, options: ColormapOptions) -> Rgba<u8> {
        if options.log_norm && value <= 0.0 {
            return Rgba([0, 0, 0, 0]);
        }

        let normalized = if max > min {
            if options.log_norm {
                let min = min.max(f64::MIN_POSITIVE);
                (value.log10() - min.log10()) / (max.log10() - min.log10())
            } else {
                (value - min) / (max - min)
            }
        } else {
            0.0
        }
        .clamp(0.0, 1.0);
        // reversing the map keeps the stops and mirrors the lookup
        let normalized = if options.reverse { 1.0 - normalized } else { normalized };

        let stops = self.stops();
        let mut lower = stops[0];
        let mut upper = stops[0];
        for stop in stops.iter().skip(1) {
            if stop.0 >= normalized {
                upper = *stop;
                break;
            }
            lower = *stop;
        }

        let scale = if upper.0 > lower.0 {
            (normalized - lower.0) / (upper.0 - lower.0)
        } else {
            0.0
        };
        let mix = |a: u8, b: u8| (a as f64 + scale * (b as f64 - a as f64)).clamp(0.0, 255.0) as u8;
        Rgba([mix(lower.1, upper.1), mix(lower.2, upper.2), mix(lower.3, upper.3), 255])
    }
}
