use crate::core::Result;
use candle_core::{IndexOp, Tensor, D};

/// Lower bound on the norm, so an all-zero row maps to zeros instead of NaN.
const NORMALIZE_EPS: f64 = 1e-12;

/// Hidden state of the first token in every sequence: `(B, L, H)` to `(B, H)`.
pub fn first_token(hidden_states: &Tensor) -> Result<Tensor> {
    Ok(hidden_states.i((.., 0))?)
}

/// L2-normalizes along the last dimension.
pub fn l2_normalize(xs: &Tensor) -> Result<Tensor> {
    let norm = xs
        .sqr()?
        .sum_keepdim(D::Minus1)?
        .sqrt()?
        .maximum(NORMALIZE_EPS)?;
    Ok(xs.broadcast_div(&norm)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_first_token() {
        let hidden = Tensor::arange(0f32, 12.0, &Device::Cpu)
            .unwrap()
            .reshape((2, 3, 2))
            .unwrap();
        let first = first_token(&hidden).unwrap();
        assert_eq!(first.to_vec2::<f32>().unwrap(), vec![vec![0.0, 1.0], vec![6.0, 7.0]]);
    }

    #[test]
    fn test_l2_normalize() {
        let xs = Tensor::new(&[[3f32, 4.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let normalized = l2_normalize(&xs).unwrap().to_vec2::<f32>().unwrap();
        assert!((normalized[0][0] - 0.6).abs() < 1e-6);
        assert!((normalized[0][1] - 0.8).abs() < 1e-6);
        assert_eq!(normalized[1], vec![0.0, 0.0]);
    }
}
