use candle_core::{Device, Result, Tensor};

use super::{causal_mask, source_padding_mask, target_mask, MASK_DTYPE};

#[test]
fn causal_mask_is_lower_triangular() -> Result<()> {
    let device = Device::Cpu;
    let mask = causal_mask(&device, 4)?;
    assert_eq!(mask.dims(), &[4, 4]);
    assert_eq!(mask.dtype(), MASK_DTYPE);

    let rows = mask.to_vec2::<f32>()?;
    for (q, row) in rows.iter().enumerate() {
        for (k, &value) in row.iter().enumerate() {
            let expected = if k <= q { 1.0 } else { 0.0 };
            assert_eq!(value, expected, "entry ({q}, {k})");
        }
    }
    Ok(())
}

#[test]
fn source_padding_mask_drops_pad_positions() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::from_slice(&[2i64, 2, 4, 1], (1, 4), &device)?;
    let mask = source_padding_mask(&ids, 1)?;
    assert_eq!(mask.dims(), &[1, 1, 4]);

    let values = mask.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(values, vec![1.0, 1.0, 1.0, 0.0]);
    Ok(())
}

#[test]
fn target_mask_combines_causal_and_padding() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::from_slice(&[2i64, 1, 4], (1, 3), &device)?;
    let mask = target_mask(&ids, 1)?;
    assert_eq!(mask.dims(), &[1, 3, 3]);

    let rows = mask.reshape((3, 3))?.to_vec2::<f32>()?;
    // Position 1 holds the pad token, so it is never a valid key.
    assert_eq!(rows[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(rows[1], vec![1.0, 0.0, 0.0]);
    assert_eq!(rows[2], vec![1.0, 0.0, 1.0]);
    Ok(())
}

#[test]
fn masks_cover_multiple_batches() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::from_slice(&[2i64, 1, 3, 4], (2, 2), &device)?;
    let mask = source_padding_mask(&ids, 1)?;
    let values = mask.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(values, vec![1.0, 0.0, 1.0, 1.0]);
    Ok(())
}
