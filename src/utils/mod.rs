use candle_core::Device;

/// First available accelerator, falling back to the CPU.
pub fn select_device(force_cpu: bool) -> candle_core::Result<Device> {
    if force_cpu {
        return Ok(Device::Cpu);
    }
    if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0)
    } else if candle_core::utils::metal_is_available() {
        Device::new_metal(0)
    } else {
        Ok(Device::Cpu)
    }
}

/// Right-pads token sequences with `pad_id` and builds the matching slot mapping,
/// numbering real tokens consecutively and marking padding as unused.
pub fn pad_batch(sequences: &[Vec<u32>], pad_id: u32) -> (Vec<u32>, Vec<i64>, usize) {
    let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut ids = Vec::with_capacity(sequences.len() * seq_len);
    let mut slots = Vec::with_capacity(sequences.len() * seq_len);
    let mut next_slot = 0i64;

    for sequence in sequences {
        for i in 0..seq_len {
            match sequence.get(i) {
                Some(&id) => {
                    ids.push(id);
                    slots.push(next_slot);
                    next_slot += 1;
                }
                None => {
                    ids.push(pad_id);
                    slots.push(crate::core::InputMetadata::UNUSED_SLOT);
                }
            }
        }
    }

    (ids, slots, seq_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_cpu() {
        assert!(select_device(true).unwrap().is_cpu());
    }

    #[test]
    fn test_pad_batch() {
        let (ids, slots, seq_len) = pad_batch(&[vec![0, 5, 2], vec![0, 2]], 1);
        assert_eq!(seq_len, 3);
        assert_eq!(ids, vec![0, 5, 2, 0, 2, 1]);
        assert_eq!(slots, vec![0, 1, 2, 3, 4, -1]);
    }
}
