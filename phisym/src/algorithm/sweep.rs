use ndarray::{ArrayD, Axis, IxDyn};

use crate::error::{Error, Result};

/// `num` evenly spaced values from `start` to `stop`, both included.
///
/// A single point yields `start`; the last point is exactly `stop`.
pub fn linspace(start: f64, stop: f64, num: usize) -> impl Iterator<Item = f64> {
    let step = if num > 1 { (stop - start) / (num - 1) as f64 } else { 0.0 };
    (0..num).map(move |i| {
        if num > 1 && i + 1 == num {
            stop
        } else {
            start + step * i as f64
        }
    })
}

/// Expands every (`start`, `stop`) pair into `num` evenly spaced values.
///
/// The sweep becomes the innermost axis: for bounds of shape `S` the result has
/// shape `S + [num]`. `offset` is subtracted from every value.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use phisym::algorithm::sweep::sweep;
///
/// let start = array![0.9].into_dyn();
/// let stop = array![1.1].into_dyn();
/// let values = sweep(&start, &stop, 3, 1.0).unwrap();
/// assert_eq!(values.shape(), &[1, 3]);
/// assert!((values[[0, 0]] + 0.1).abs() < 1e-12);
/// assert!(values[[0, 1]].abs() < 1e-12);
/// ```
pub fn sweep(start: &ArrayD<f64>, stop: &ArrayD<f64>, num: usize, offset: f64) -> Result<ArrayD<f64>> {
    crate::algorithm::reduction::check_shape("sweep bounds", start.shape(), stop.shape())?;

    let mut shape = start.shape().to_vec();
    shape.push(num);

    let values: Vec<f64> = start
        .iter()
        .zip(stop.iter())
        .flat_map(|(&lo, &hi)| linspace(lo - offset, hi - offset, num))
        .collect();

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
}

/// Repeats every value `width` times along a new innermost axis.
pub fn broadcast_inner(values: &ArrayD<f64>, width: usize) -> Result<ArrayD<f64>> {
    let mut shape = values.shape().to_vec();
    shape.push(width);

    let expanded = values.view().insert_axis(Axis(values.ndim()));
    expanded
        .broadcast(IxDyn(&shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| Error::ShapeMismatch {
            field: "broadcast".to_string(),
            expected: shape.clone(),
            found: values.shape().to_vec(),
        })
}
