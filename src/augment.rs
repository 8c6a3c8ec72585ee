//! Train-time image augmentation: random horizontal flips and small
//! spatial shifts, applied per image before normalization.

use burn::prelude::*;
use rand::Rng;

/// Largest shift, as a fraction of each spatial dimension. For 32 pixel
/// images this allows up to 5 pixels in either direction.
const DEFAULT_SHIFT_FRACTION: f64 = 5.0 / 32.0;

#[derive(Clone, Debug)]
pub struct Augmenter {
    horizontal_flip: bool,
    shift_fraction: f64,
}

impl Default for Augmenter {
    fn default() -> Self {
        Self {
            horizontal_flip: true,
            shift_fraction: DEFAULT_SHIFT_FRACTION,
        }
    }
}

impl Augmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_horizontal_flip(mut self, enabled: bool) -> Self {
        self.horizontal_flip = enabled;
        self
    }

    pub fn with_shift_fraction(mut self, fraction: f64) -> Self {
        self.shift_fraction = fraction;
        self
    }

    /// Perturbs one `[channels, height, width]` image. The output keeps the
    /// input shape; shifted-in pixels are zero.
    pub fn apply<B: Backend>(&self, image: Tensor<B, 3>, rng: &mut impl Rng) -> Tensor<B, 3> {
        let mut image = image;

        if self.horizontal_flip && rng.random_bool(0.5) {
            image = image.flip([2]);
        }

        let [channels, height, width] = image.dims();
        let max_dy = (self.shift_fraction * height as f64).floor() as usize;
        let max_dx = (self.shift_fraction * width as f64).floor() as usize;
        if max_dy == 0 && max_dx == 0 {
            return image;
        }

        // Zero-pad by the maximal shift, then crop back at a random offset.
        let dy = rng.random_range(0..=2 * max_dy);
        let dx = rng.random_range(0..=2 * max_dx);
        let fill: B::FloatElem = 0.0.elem();
        let padded = image.pad((max_dx, max_dx, max_dy, max_dy), fill);

        padded.slice([0..channels, dy..dy + height, dx..dx + width])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray;

    fn image(values: [f32; 4]) -> Tensor<TestBackend, 3> {
        Tensor::<TestBackend, 1>::from_floats(values, &Default::default()).reshape([1, 2, 2])
    }

    #[test]
    fn keeps_the_image_shape() {
        let augmenter = Augmenter::new();

        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = augmenter.apply(image([0.1, 0.2, 0.3, 0.4]), &mut rng);
            assert_eq!(out.dims(), [1, 2, 2]);
        }
    }

    #[test]
    fn identity_when_disabled() {
        let augmenter = Augmenter::new()
            .with_horizontal_flip(false)
            .with_shift_fraction(0.0);
        let mut rng = StdRng::seed_from_u64(7);

        let input = image([0.1, 0.2, 0.3, 0.4]);
        let output = augmenter.apply(input.clone(), &mut rng);

        assert_eq!(output.into_data(), input.into_data());
    }

    #[test]
    fn flips_reverse_columns() {
        let augmenter = Augmenter::new().with_shift_fraction(0.0);
        let input = image([1.0, 2.0, 3.0, 4.0]);
        let flipped = input.clone().flip([2]);

        let mut seen_flipped = false;
        let mut seen_original = false;
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let output = augmenter.apply(input.clone(), &mut rng).into_data();
            if output == flipped.clone().into_data() {
                seen_flipped = true;
            } else {
                assert_eq!(output, input.clone().into_data());
                seen_original = true;
            }
        }

        assert!(seen_flipped);
        assert!(seen_original);
    }

    #[test]
    fn shifts_stay_within_bounds() {
        // 2x2 image with shift fraction 0.5 shifts by at most one pixel, so
        // every output pixel is either zero or one of the inputs.
        let augmenter = Augmenter::new()
            .with_horizontal_flip(false)
            .with_shift_fraction(0.5);
        let input = image([1.0, 2.0, 3.0, 4.0]);

        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let output = augmenter.apply(input.clone(), &mut rng);
            let values = output.into_data().to_vec::<f32>().unwrap();

            assert_eq!(values.len(), 4);
            for value in values {
                assert!(
                    value == 0.0 || [1.0, 2.0, 3.0, 4.0].contains(&value),
                    "unexpected pixel {value}"
                );
            }
        }
    }

    #[test]
    fn same_seed_gives_the_same_result() {
        let augmenter = Augmenter::new();
        let input = image([0.5, 0.25, 0.75, 1.0]);

        let mut rng_a = StdRng::seed_from_u64(11);
        let mut rng_b = StdRng::seed_from_u64(11);

        let a = augmenter.apply(input.clone(), &mut rng_a).into_data();
        let b = augmenter.apply(input, &mut rng_b).into_data();

        assert_eq!(a, b);
    }
}
