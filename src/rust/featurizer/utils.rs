use ndarray::{Array1, ArrayView1};

pub(crate) fn normalize_vector(vec: ArrayView1<f32>) -> Array1<f32> {
    let norm: f32 = vec.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        vec.mapv(|x| x / norm)
    } else {
        Array1::zeros(vec.len())
    }
}
