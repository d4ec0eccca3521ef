use candle_core::{DType, Device, Tensor};
use studyrag_embed::masked_mean_l2;

fn pool(hidden: &[f32], mask: &[u32], shape: (usize, usize, usize)) -> Vec<Vec<f32>> {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(hidden, shape, &dev).unwrap();
    let m = Tensor::from_slice(mask, (shape.0, shape.1), &dev)
        .unwrap()
        .to_dtype(DType::F32)
        .unwrap();
    masked_mean_l2(&h, &m).unwrap().to_vec2().unwrap()
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[test]
fn padding_tokens_do_not_shift_the_mean() {
    // Row 0 attends to both tokens, row 1 only to its first; the padded
    // token in row 1 carries a large value that must be ignored.
    let hidden = [
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 2.0, //
        90.0, 90.0, 90.0,
    ];
    let out = pool(&hidden, &[1, 1, 1, 0], (2, 2, 3));
    let half = 1.0 / 2f32.sqrt();
    for (a, b) in out[0].iter().zip([half, half, 0.0]) {
        assert!((a - b).abs() < 1e-5, "row 0: {a} vs {b}");
    }
    for (a, b) in out[1].iter().zip([0.0, 0.0, 1.0]) {
        assert!((a - b).abs() < 1e-5, "row 1: {a} vs {b}");
    }
}

#[test]
fn all_padding_row_pools_to_zero_without_nan() {
    let hidden = [
        3.0, 4.0, //
        3.0, 4.0, //
        7.0, 7.0, //
        7.0, 7.0,
    ];
    let out = pool(&hidden, &[1, 1, 0, 0], (2, 2, 2));
    assert!((norm(&out[0]) - 1.0).abs() < 1e-5);
    assert!((out[0][0] - 0.6).abs() < 1e-5 && (out[0][1] - 0.8).abs() < 1e-5);
    assert!(out[1].iter().all(|x| x.is_finite() && x.abs() < f32::EPSILON), "{:?}", out[1]);
}

#[test]
fn rejects_unbatched_hidden_states() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((4, 8), DType::F32, &dev).unwrap();
    let m = Tensor::ones(4, DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &m).is_err());
}
