//! Response curve shaping
//!
//! Curves work on the unit interval: the deadzone stage projects the signal
//! to 0..1 before shaping, and the caller maps the result back to the output
//! range afterwards.

use crate::profile::{CurveDefinition, CurveKind, CurvePoint};

/// Segments narrower than this are treated as a step
const SEGMENT_EPSILON: f32 = 1e-6;

/// Shape `x` (0..1) with `curve`, clamp to 0..1, then apply inversion
pub fn evaluate(curve: &CurveDefinition, x: f32, inverted: bool) -> f32 {
    let y = shape(curve, x).clamp(0.0, 1.0);
    if inverted {
        1.0 - y
    } else {
        y
    }
}

/// Raw curve value before clamping and inversion
pub fn shape(curve: &CurveDefinition, x: f32) -> f32 {
    match curve.kind {
        CurveKind::Linear => x,
        CurveKind::SCurve => x * x * (3.0 - 2.0 * x),
        CurveKind::Exponential => x * x,
        CurveKind::Custom => custom(&curve.points, x),
    }
}

/// Catmull-Rom spline through the control points.
///
/// Fewer than two points degrade to identity. Inputs outside the first/last
/// point clamp to that point's y.
fn custom(points: &[CurvePoint], x: f32) -> f32 {
    if points.len() < 2 {
        return x;
    }
    let first = points[0];
    let last = points[points.len() - 1];
    if x <= first.x {
        return first.y;
    }
    if x >= last.x {
        return last.y;
    }

    // First segment whose right edge reaches x
    let i = points
        .windows(2)
        .position(|w| x <= w[1].x)
        .unwrap_or(points.len() - 2);
    let a = points[i];
    let b = points[i + 1];

    let dx = b.x - a.x;
    if dx.abs() < SEGMENT_EPSILON {
        return a.y;
    }
    let t = (x - a.x) / dx;

    // Ends get a virtual neighbour extrapolated along the adjacent segment
    let p0 = if i > 0 { points[i - 1].y } else { 2.0 * a.y - b.y };
    let p1 = a.y;
    let p2 = b.y;
    let p3 = if i + 2 < points.len() { points[i + 2].y } else { 2.0 * b.y - a.y };

    catmull_rom(p0, p1, p2, p3, t)
}

fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * (2.0 * p1
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_curve(points: &[(f32, f32)]) -> CurveDefinition {
        CurveDefinition::custom(points.iter().map(|&(x, y)| CurvePoint::new(x, y)).collect())
    }

    #[test]
    fn test_builtin_curves() {
        let linear = CurveDefinition::of(CurveKind::Linear);
        let s = CurveDefinition::of(CurveKind::SCurve);
        let exp = CurveDefinition::of(CurveKind::Exponential);

        assert_eq!(evaluate(&linear, 0.3, false), 0.3);
        assert_eq!(evaluate(&s, 0.5, false), 0.5);
        assert!(evaluate(&s, 0.25, false) < 0.25);
        assert!(evaluate(&s, 0.75, false) > 0.75);
        assert_eq!(evaluate(&exp, 0.5, false), 0.25);
        assert_eq!(evaluate(&exp, 1.0, false), 1.0);
    }

    #[test]
    fn test_inversion() {
        let exp = CurveDefinition::of(CurveKind::Exponential);
        assert_eq!(evaluate(&exp, 0.5, true), 0.75);
        assert_eq!(evaluate(&exp, 0.0, true), 1.0);
    }

    #[test]
    fn test_custom_symmetric_points_match_linear() {
        let curve = custom_curve(&[(0.0, 0.0), (0.5, 0.5), (1.0, 1.0)]);
        assert!((evaluate(&curve, 0.5, false) - 0.5).abs() < 1e-6);
        assert!((evaluate(&curve, 0.25, false) - 0.25).abs() < 1e-6);
        assert!((evaluate(&curve, 0.8, false) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_custom_passes_through_control_points() {
        let curve = custom_curve(&[(0.0, 0.0), (0.3, 0.1), (0.7, 0.6), (1.0, 1.0)]);
        assert!((evaluate(&curve, 0.3, false) - 0.1).abs() < 1e-6);
        assert!((evaluate(&curve, 0.7, false) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_custom_clamps_outside_point_set() {
        let curve = custom_curve(&[(0.2, 0.1), (0.8, 0.9)]);
        assert_eq!(evaluate(&curve, 0.0, false), 0.1);
        assert_eq!(evaluate(&curve, 1.0, false), 0.9);
    }

    #[test]
    fn test_custom_vertical_step_uses_left_segment() {
        // Vertical step at x = 0.5
        let curve = custom_curve(&[(0.0, 0.0), (0.5, 0.2), (0.5, 0.8), (1.0, 1.0)]);
        assert!((evaluate(&curve, 0.5, false) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_custom_too_few_points_is_identity() {
        assert_eq!(evaluate(&custom_curve(&[]), 0.42, false), 0.42);
        assert_eq!(evaluate(&custom_curve(&[(0.5, 0.9)]), 0.42, false), 0.42);
    }

    #[test]
    fn test_result_is_clamped() {
        // Overshooting spline gets clipped to the unit interval
        let curve = custom_curve(&[(0.0, 0.0), (0.1, 1.0), (0.2, 0.0), (1.0, 1.0)]);
        for i in 0..=100 {
            let y = evaluate(&curve, i as f32 / 100.0, false);
            assert!((0.0..=1.0).contains(&y));
        }
    }
}
