use crate::core::model::{HeadMask, InputMetadata};
use crate::core::{ModelError, Result};
use candle_core::{DType, Tensor, D};
use half::f16;

/// Dtype of the additive attention mask.
///
/// Fixed to half precision regardless of the compute dtype, so masked positions
/// always receive `f16::MIN` (-65504) rather than the compute dtype's minimum.
/// Changing this changes numeric output.
pub const MASK_DTYPE: DType = DType::F16;

/// 0/1 mask over `(batch, seq_len)`: 1 wherever the slot is in use.
pub fn attention_mask_from_slots(slot_mapping: &Tensor) -> Result<Tensor> {
    let mask = slot_mapping
        .ne(InputMetadata::UNUSED_SLOT)?
        .to_dtype(DType::U32)?;
    Ok(mask)
}

/// Turns a 2D `(B, L)` or 3D `(B, L, L)` 0/1 mask into an additive bias of
/// shape `(B, 1, 1, L)` or `(B, 1, L, L)`.
pub fn extended_attention_mask(attention_mask: &Tensor, input_shape: &[usize]) -> Result<Tensor> {
    let extended = match attention_mask.rank() {
        3 => attention_mask.unsqueeze(1)?,
        2 => attention_mask.unsqueeze(1)?.unsqueeze(1)?,
        _ => {
            return Err(ModelError::InvalidMaskShape {
                input_shape: input_shape.to_vec(),
                mask_shape: attention_mask.dims().to_vec(),
            })
        }
    };

    // (1 - mask) * min
    let fill = f16::MIN.to_f64();
    let extended = extended.to_dtype(MASK_DTYPE)?.affine(-fill, fill)?;
    Ok(extended)
}

/// Expands an optional `(heads)` or `(layers, heads)` mask into one entry per layer.
pub fn head_mask(
    head_mask: Option<&Tensor>,
    num_hidden_layers: usize,
    is_attention_chunked: bool,
) -> Result<HeadMask> {
    let Some(mask) = head_mask else {
        return Ok(vec![None; num_hidden_layers]);
    };

    let mut mask = head_mask_to_5d(mask, num_hidden_layers)?;
    if is_attention_chunked {
        mask = mask.unsqueeze(D::Minus1)?;
    }

    (0..num_hidden_layers)
        .map(|layer| Ok(Some(mask.get(layer)?)))
        .collect()
}

fn head_mask_to_5d(mask: &Tensor, num_hidden_layers: usize) -> Result<Tensor> {
    match mask.rank() {
        1 => {
            let heads = mask.dim(0)?;
            let mask = mask
                .reshape((1, 1, heads, 1, 1))?
                .broadcast_as((num_hidden_layers, 1, heads, 1, 1))?;
            Ok(mask)
        }
        2 => {
            let (layers, heads) = mask.dims2()?;
            if layers != num_hidden_layers {
                return Err(ModelError::InvalidHeadMask(mask.dims().to_vec()));
            }
            Ok(mask.reshape((layers, 1, heads, 1, 1))?)
        }
        _ => Err(ModelError::InvalidHeadMask(mask.dims().to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_slot_mask() {
        let slots = Tensor::new(&[[4i64, 5, -1], [7, -1, -1]], &Device::Cpu).unwrap();
        let mask = attention_mask_from_slots(&slots).unwrap();
        assert_eq!(mask.dtype(), DType::U32);
        assert_eq!(mask.to_vec2::<u32>().unwrap(), vec![vec![1, 1, 0], vec![1, 0, 0]]);
    }

    #[test]
    fn test_extended_mask_rank2() {
        let mask = Tensor::new(&[[1u32, 1, 0], [1, 0, 0]], &Device::Cpu).unwrap();
        let extended = extended_attention_mask(&mask, &[2, 3]).unwrap();
        assert_eq!(extended.dims(), &[2, 1, 1, 3]);
        assert_eq!(extended.dtype(), DType::F16);

        let values = extended
            .to_dtype(DType::F32)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(values, vec![0.0, 0.0, -65504.0, 0.0, -65504.0, -65504.0]);
    }

    #[test]
    fn test_extended_mask_rank3() {
        let mask = Tensor::ones((2, 4, 4), DType::U32, &Device::Cpu).unwrap();
        let extended = extended_attention_mask(&mask, &[2, 4]).unwrap();
        assert_eq!(extended.dims(), &[2, 1, 4, 4]);
    }

    #[test]
    fn test_extended_mask_rejects_other_ranks() {
        let rank1 = Tensor::ones(4, DType::U32, &Device::Cpu).unwrap();
        let err = extended_attention_mask(&rank1, &[1, 4]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidMaskShape { .. }));

        let rank4 = Tensor::ones((1, 1, 4, 4), DType::U32, &Device::Cpu).unwrap();
        let err = extended_attention_mask(&rank4, &[1, 4]).unwrap_err();
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_head_mask_none() {
        let masks = head_mask(None, 3, false).unwrap();
        assert_eq!(masks.len(), 3);
        assert!(masks.iter().all(Option::is_none));
    }

    #[test]
    fn test_head_mask_1d_is_shared() {
        let mask = Tensor::new(&[1f32, 0.0, 1.0, 1.0], &Device::Cpu).unwrap();
        let masks = head_mask(Some(&mask), 2, false).unwrap();
        assert_eq!(masks.len(), 2);
        for layer in &masks {
            assert_eq!(layer.as_ref().unwrap().dims(), &[1, 4, 1, 1]);
        }
    }

    #[test]
    fn test_head_mask_2d_per_layer() {
        let mask = Tensor::new(&[[1f32, 0.0], [0.0, 1.0], [1.0, 1.0]], &Device::Cpu).unwrap();
        let masks = head_mask(Some(&mask), 3, true).unwrap();
        let second = masks[1].as_ref().unwrap();
        assert_eq!(second.dims(), &[1, 2, 1, 1, 1]);
        assert_eq!(
            second.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn test_head_mask_rejects_rank3() {
        let mask = Tensor::ones((1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            head_mask(Some(&mask), 1, false),
            Err(ModelError::InvalidHeadMask(_))
        ));
    }
}
