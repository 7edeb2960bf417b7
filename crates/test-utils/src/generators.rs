//! Field generators for creating synthetic gridded data.
//!
//! These generators create predictable, verifiable data patterns that can be
//! used across the test suite.

/// Creates a field whose value encodes its own multi-index.
///
/// Each element is `sum(index[d] * 10^(k-1-d))`, so a 2-D element at
/// (row, col) holds `row * 10 + col`, and a 3-D element at (i, j, k) holds
/// `i * 100 + j * 10 + k`. Keep every dimension below 10 for unambiguous
/// values.
///
/// # Example
///
/// ```
/// use test_utils::create_index_field;
///
/// let field = create_index_field(&[2, 3]);
/// assert_eq!(field, vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
/// ```
pub fn create_index_field(shape: &[usize]) -> Vec<f32> {
    create_field(shape, |index| {
        index.iter().fold(0.0, |acc, &i| acc * 10.0 + i as f32)
    })
}

/// Creates a field from a function of the multi-index, in row-major order.
pub fn create_field(shape: &[usize], f: impl Fn(&[usize]) -> f32) -> Vec<f32> {
    let total: usize = shape.iter().product();
    let mut data = Vec::with_capacity(total);
    let mut index = vec![0usize; shape.len()];
    for _ in 0..total {
        data.push(f(&index));
        for d in (0..shape.len()).rev() {
            index[d] += 1;
            if index[d] < shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
    data
}

/// Creates a field filled with a constant value.
pub fn create_constant_field(shape: &[usize], value: f32) -> Vec<f32> {
    vec![value; shape.iter().product()]
}

/// Creates a ramp `0, 1, 2, ...` of the given length.
pub fn create_ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32).collect()
}
