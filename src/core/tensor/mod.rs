pub mod mask;
pub mod ops;

pub use mask::{
    attention_mask_from_slots, extended_attention_mask, head_mask, MASK_DTYPE,
};
pub use ops::{first_token, l2_normalize};
