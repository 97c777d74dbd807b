//! Cave carving density fields.
//!
//! Two carvers run over every column: *tunnel* caves, where two offset 3-D
//! noise samples combined by sum-of-squares dip under a threshold (the near
//! zero-crossing of both fields traces winding tubes), and *cavern* caves,
//! where a 2-octave fractal sample exceeds a threshold. Both receive a
//! Gaussian bonus centered at a configured depth, so caves concentrate in a
//! band instead of shredding the surface.
//!
//! The same [`CaveField`] drives live carving and standalone prediction, so
//! structure placement can ask "is there a cave here" without generating
//! the chunk and always agree with what the carver would have done.

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Cave carving parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveConfig {
    /// Sum-of-squares below this carves a tunnel
    pub tunnel_threshold: f64,
    /// Horizontal/vertical wavelength of the tunnel noise
    pub tunnel_scale: f64,
    /// Sample offset separating the two tunnel fields
    pub tunnel_offset: f64,
    /// Fractal sample above this carves a cavern
    pub cavern_threshold: f64,
    /// Wavelength of the cavern noise
    pub cavern_scale: f64,
    /// Depth (world Y) where the carve bonus peaks
    pub gaussian_center: f64,
    /// Standard deviation of the bonus band
    pub gaussian_width: f64,
    /// Bonus added to both thresholds at the band center
    pub gaussian_bonus: f64,
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            tunnel_threshold: 0.012,
            tunnel_scale: 48.0,
            tunnel_offset: 1000.0,
            cavern_threshold: 0.62,
            cavern_scale: 96.0,
            gaussian_center: 40.0,
            gaussian_width: 24.0,
            gaussian_bonus: 0.008,
        }
    }
}

/// Seeded cave density field shared by the carver and the predictor.
#[derive(Debug)]
pub struct CaveField {
    config: CaveConfig,
    tunnel_a: Perlin,
    tunnel_b: Perlin,
    cavern: Fbm<Perlin>,
}

impl CaveField {
    /// Creates a field for the given seed.
    #[must_use]
    pub fn new(seed: u32, config: CaveConfig) -> Self {
        let cavern = Fbm::<Perlin>::new(seed.wrapping_add(2)).set_octaves(2);
        Self {
            config,
            tunnel_a: Perlin::new(seed),
            tunnel_b: Perlin::new(seed.wrapping_add(1)),
            cavern,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &CaveConfig {
        &self.config
    }

    /// Sum-of-squares tunnel density; small values mean "inside a tunnel".
    #[must_use]
    pub fn tunnel_density(&self, x: i64, y: i64, z: i64) -> f64 {
        let s = self.config.tunnel_scale;
        let p = [x as f64 / s, y as f64 / s, z as f64 / s];
        let q = [
            (x as f64 + self.config.tunnel_offset) / s,
            (y as f64 + self.config.tunnel_offset) / s,
            (z as f64 + self.config.tunnel_offset) / s,
        ];
        let a = self.tunnel_a.get(p);
        let b = self.tunnel_b.get(q);
        a * a + b * b
    }

    /// 2-octave cavern density; large values mean "inside a cavern".
    #[must_use]
    pub fn cavern_density(&self, x: i64, y: i64, z: i64) -> f64 {
        let s = self.config.cavern_scale;
        self.cavern.get([x as f64 / s, y as f64 / s, z as f64 / s])
    }

    /// Gaussian depth bonus applied to both thresholds.
    #[must_use]
    pub fn height_bonus(&self, y: i64) -> f64 {
        let d = y as f64 - self.config.gaussian_center;
        let w = self.config.gaussian_width;
        self.config.gaussian_bonus * (-(d * d) / (2.0 * w * w)).exp()
    }

    /// Whether the carvers remove the block at this world position.
    ///
    /// This is the single source of truth: the live carver calls it per
    /// cell, and cave prediction calls it without any chunk present.
    #[must_use]
    pub fn carves(&self, x: i64, y: i64, z: i64) -> bool {
        let bonus = self.height_bonus(y);
        if self.tunnel_density(x, y, z) < self.config.tunnel_threshold + bonus {
            return true;
        }
        self.cavern_density(x, y, z) > self.config.cavern_threshold - bonus
    }

    /// Predicts whether any cave intersects the (x, z) pillar between the
    /// two world heights, without materializing a chunk.
    #[must_use]
    pub fn predict_cave_in_pillar(&self, x: i64, z: i64, y_min: i64, y_max: i64) -> bool {
        (y_min..=y_max).any(|y| self.carves(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_per_seed() {
        let a = CaveField::new(77, CaveConfig::default());
        let b = CaveField::new(77, CaveConfig::default());
        for (x, y, z) in [(0, 40, 0), (123, 10, -456), (-9000, 60, 31)] {
            assert_eq!(a.carves(x, y, z), b.carves(x, y, z));
            assert_eq!(a.tunnel_density(x, y, z), b.tunnel_density(x, y, z));
            assert_eq!(a.cavern_density(x, y, z), b.cavern_density(x, y, z));
        }
    }

    #[test]
    fn test_seeds_differ() {
        let a = CaveField::new(1, CaveConfig::default());
        let b = CaveField::new(2, CaveConfig::default());
        let mut diverged = false;
        for x in 0..200 {
            if a.carves(x, 40, 0) != b.carves(x, 40, 0) {
                diverged = true;
                break;
            }
        }
        assert!(diverged);
    }

    #[test]
    fn test_bonus_peaks_at_center() {
        let field = CaveField::new(0, CaveConfig::default());
        let at_center = field.height_bonus(40);
        assert!(at_center > field.height_bonus(0));
        assert!(at_center > field.height_bonus(120));
        assert!((at_center - field.config().gaussian_bonus).abs() < 1e-12);
    }

    #[test]
    fn test_prediction_matches_pointwise_carving() {
        let field = CaveField::new(42, CaveConfig::default());
        for x in (-64..64).step_by(7) {
            for z in (-64..64).step_by(11) {
                let expected = (5..=80).any(|y| field.carves(x, y, z));
                assert_eq!(field.predict_cave_in_pillar(x, z, 5, 80), expected);
            }
        }
    }

    #[test]
    fn test_density_stable_at_random_far_coords() {
        fastrand::seed(99);
        let a = CaveField::new(7, CaveConfig::default());
        let b = CaveField::new(7, CaveConfig::default());
        for _ in 0..256 {
            let x = fastrand::i64(-1_000_000..1_000_000);
            let y = fastrand::i64(0..128);
            let z = fastrand::i64(-1_000_000..1_000_000);
            assert_eq!(a.carves(x, y, z), b.carves(x, y, z));
        }
    }
}
