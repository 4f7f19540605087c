/// Exponential curve `y = k * e^(a * x) + b` fitted through two points.
///
/// `a` is the incline, chosen by the caller; `k` and `b` are solved so the
/// curve passes through `(x1, y1)` and `(x2, y2)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpCurve {
	a: f64,
	k: f64,
	b: f64,
}

impl ExpCurve {
	/// Fits the curve. Anchors that cannot be told apart (`x1 == x2` or a
	/// zero incline) give the constant curve `y = y1`.
	pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, a: f64) -> Self {
		let e1 = (a * x1).exp();
		let e2 = (a * x2).exp();
		if e1 == e2 {
			return Self { a, k: 0.0, b: y1 };
		}
		let k = (y1 - y2) / (e1 - e2);
		Self { a, k, b: y1 - k * e1 }
	}

	pub fn eval(&self, x: f64) -> f64 {
		self.k * (self.a * x).exp() + self.b
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn close(a: f64, b: f64) -> bool {
		(a - b).abs() < 1e-9 * (1.0 + a.abs().max(b.abs()))
	}

	#[test]
	fn passes_through_both_anchors() {
		let curve = ExpCurve::new(1.0, 0.000001, 8.0, 1.0, 0.0002);
		assert!(close(curve.eval(1.0), 0.000001));
		assert!(close(curve.eval(8.0), 1.0));

		let curve = ExpCurve::new(1.0, 40.0, 1000.0, 0.000001, -0.00001);
		assert!(close(curve.eval(1.0), 40.0));
		assert!(close(curve.eval(1000.0), 0.000001));
	}

	#[test]
	fn positive_incline_with_falling_anchors_is_monotonic() {
		let curve = ExpCurve::new(1.0, 1.0, 8.0, 0.2, 2.3);
		let ys: Vec<f64> = (1..=8).map(|x| curve.eval(x as f64)).collect();
		assert!(ys.windows(2).all(|pair| pair[0] >= pair[1]));
	}

	#[test]
	fn degenerate_anchors_give_a_constant() {
		let curve = ExpCurve::new(1.0, 5.0, 1.0, 9.0, 0.5);
		assert_eq!(curve.eval(1.0), 5.0);
		assert_eq!(curve.eval(10.0), 5.0);
	}
}
