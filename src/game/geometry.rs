//! Geometry helpers: angle conventions, homogeneous 2D transforms, hitbox tests
//!
//! World space is screen space: x grows to the right, y grows downward.
//! Orientation is stored as a bearing (0° = up, clockwise), trigonometry
//! works on the standard angle (counter-clockwise from +x).

use tracing::error;

use super::craft::Craft;

/// Hitbox vertices relative to the craft origin, nose pointing along +x.
pub const HITBOX_NOSE: (f64, f64) = (36.0, 0.0);
pub const HITBOX_REAR_LEFT: (f64, f64) = (-30.0, 30.0);
pub const HITBOX_REAR_RIGHT: (f64, f64) = (-30.0, -30.0);

/// Convert a bearing in degrees to a standard angle in degrees
pub fn to_standard_angle(bearing: f64) -> f64 {
    -(bearing - 90.0)
}

/// Unit heading for a bearing: `(cos s, -sin s)` of the standard angle `s`
pub fn heading(bearing: f64) -> (f64, f64) {
    let s = to_standard_angle(bearing).to_radians();
    (s.cos(), -s.sin())
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("cannot compose {left_rows}x{left_cols} with {right_rows}x{right_cols}")]
    ShapeMismatch {
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("nothing to compose")]
    Empty,
}

/// Row-major dense matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn from_rows<const R: usize, const C: usize>(rows: [[f64; C]; R]) -> Self {
        Self {
            rows: R,
            cols: C,
            data: rows.iter().flatten().copied().collect(),
        }
    }

    #[cfg(test)]
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self { rows: n, cols: n, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// `self · rhs`
    pub fn multiply(&self, rhs: &Matrix) -> Result<Matrix, GeometryError> {
        if self.cols != rhs.rows {
            return Err(GeometryError::ShapeMismatch {
                left_rows: self.rows,
                left_cols: self.cols,
                right_rows: rhs.rows,
                right_cols: rhs.cols,
            });
        }

        let mut data = vec![0.0; self.rows * rhs.cols];
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                data[r * rhs.cols + c] = (0..self.cols)
                    .map(|k| self.get(r, k) * rhs.get(k, c))
                    .sum();
            }
        }

        Ok(Matrix {
            rows: self.rows,
            cols: rhs.cols,
            data,
        })
    }
}

/// Homogeneous translation by `(dx, dy)`
pub fn translation(dx: f64, dy: f64) -> Matrix {
    Matrix::from_rows([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]])
}

/// Homogeneous rotation by `radians` (matrix sense)
pub fn rotation(radians: f64) -> Matrix {
    let (sin, cos) = radians.sin_cos();
    Matrix::from_rows([[cos, -sin, 0.0], [sin, cos, 0.0], [0.0, 0.0, 1.0]])
}

/// Homogeneous column vector for a point
pub fn point(x: f64, y: f64) -> Matrix {
    Matrix::from_rows([[x], [y], [1.0]])
}

/// Compose matrices right-to-left: the last one is applied first.
pub fn compose(matrices: &[Matrix]) -> Result<Matrix, GeometryError> {
    let (last, rest) = matrices.split_last().ok_or(GeometryError::Empty)?;
    rest.iter()
        .rev()
        .try_fold(last.clone(), |acc, m| m.multiply(&acc))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle(pub [Point; 3]);

impl Triangle {
    #[cfg(test)]
    pub fn centroid(&self) -> Point {
        let [a, b, c] = self.0;
        Point::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
    }
}

/// World-space hitbox of a craft.
///
/// Each local vertex is placed at the craft position, then rotated about the
/// craft origin (translate to origin, rotate, translate back). Returns `None`
/// only if the transform chain is malformed, which callers treat as a miss.
pub fn craft_hitbox(craft: &Craft) -> Option<Triangle> {
    let standard = to_standard_angle(craft.orientation).to_radians();
    let transform = [
        translation(craft.x, craft.y),
        rotation(-standard),
        translation(-craft.x, -craft.y),
    ];

    let mut vertices = [Point::new(0.0, 0.0); 3];
    for (slot, (lx, ly)) in vertices
        .iter_mut()
        .zip([HITBOX_NOSE, HITBOX_REAR_LEFT, HITBOX_REAR_RIGHT])
    {
        let mut chain = transform.to_vec();
        chain.push(point(craft.x + lx, craft.y + ly));
        match compose(&chain) {
            Ok(world) => *slot = Point::new(world.get(0, 0), world.get(1, 0)),
            Err(e) => {
                debug_assert!(false, "hitbox transform failed: {e}");
                error!(craft_id = %craft.id, error = %e, "Hitbox transform failed");
                return None;
            }
        }
    }

    Some(Triangle(vertices))
}

/// 2D cross product of `(b - a) × (p - a)`
fn edge_cross(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Strict point-in-triangle test.
///
/// A point is inside when it lies strictly on the same side of all three
/// directed edges. Points exactly on an edge or vertex are outside.
pub fn point_in_triangle(p: Point, triangle: &Triangle) -> bool {
    let [a, b, c] = triangle.0;
    let d1 = edge_cross(a, b, p);
    let d2 = edge_cross(b, c, p);
    let d3 = edge_cross(c, a, p);

    (d1 < 0.0 && d2 < 0.0 && d3 < 0.0) || (d1 > 0.0 && d2 > 0.0 && d3 > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;
    use uuid::Uuid;

    fn craft_at(x: f64, y: f64, orientation: f64) -> Craft {
        let mut craft = Craft::new(Uuid::new_v4(), "test".into(), "#ffffff".into(), 0.0);
        craft.x = x;
        craft.y = y;
        craft.orientation = orientation;
        craft
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn standard_angle_conversion() {
        assert_eq!(to_standard_angle(0.0), 90.0);
        assert_eq!(to_standard_angle(90.0), 0.0);
        assert_eq!(to_standard_angle(180.0), -90.0);
        assert_eq!(to_standard_angle(270.0), -180.0);
    }

    #[test]
    fn heading_points_up_at_bearing_zero_and_right_at_ninety() {
        let (dx, dy) = heading(0.0);
        assert!(close(dx, 0.0) && close(dy, -1.0));
        let (dx, dy) = heading(90.0);
        assert!(close(dx, 1.0) && close(dy, 0.0));
    }

    #[test]
    fn compose_applies_right_to_left() {
        // rotate a quarter turn, then translate
        let m = compose(&[
            translation(10.0, 0.0),
            rotation(std::f64::consts::FRAC_PI_2),
            point(1.0, 0.0),
        ])
        .expect("conformant shapes");
        assert_eq!((m.rows(), m.cols()), (3, 1));
        assert!(close(m.get(0, 0), 10.0));
        assert!(close(m.get(1, 0), 1.0));
    }

    #[test]
    fn compose_rejects_mismatched_shapes() {
        assert_err!(compose(&[point(1.0, 1.0), translation(1.0, 1.0)]));
        assert_eq!(compose(&[]), Err(GeometryError::Empty));
    }

    #[test]
    fn identity_is_neutral() {
        let t = translation(3.0, 4.0);
        let m = compose(&[Matrix::identity(3), t.clone()]).expect("conformant shapes");
        assert_eq!(m, t);
    }

    #[test]
    fn hitbox_nose_follows_bearing() {
        let up = craft_hitbox(&craft_at(100.0, 50.0, 0.0)).expect("hitbox");
        assert!(close(up.0[0].x, 100.0));
        assert!(close(up.0[0].y, 14.0));

        let right = craft_hitbox(&craft_at(100.0, 50.0, 90.0)).expect("hitbox");
        assert!(close(right.0[0].x, 136.0));
        assert!(close(right.0[0].y, 50.0));
    }

    #[test]
    fn centroid_is_always_inside() {
        for bearing in [0.0, 17.5, 90.0, 135.0, 222.2, 359.9] {
            let craft = craft_at(-420.0, 77.0, bearing);
            let hitbox = craft_hitbox(&craft).expect("hitbox");
            assert!(point_in_triangle(hitbox.centroid(), &hitbox), "bearing {bearing}");
        }
    }

    #[test]
    fn far_points_are_outside() {
        let craft = craft_at(0.0, 0.0, 45.0);
        let hitbox = craft_hitbox(&craft).expect("hitbox");
        // bounding circle radius is under 43
        for p in [
            Point::new(100.0, 0.0),
            Point::new(0.0, -100.0),
            Point::new(-70.0, 70.0),
            Point::new(1e6, 1e6),
        ] {
            assert!(!point_in_triangle(p, &hitbox));
        }
    }

    #[test]
    fn point_on_edge_is_a_miss() {
        // bearing 90 keeps the rotation exact; rear edge is x = -30
        let hitbox = craft_hitbox(&craft_at(0.0, 0.0, 90.0)).expect("hitbox");
        assert!(!point_in_triangle(Point::new(-30.0, 0.0), &hitbox));
        assert!(!point_in_triangle(Point::new(36.0, 0.0), &hitbox));
        assert!(point_in_triangle(Point::new(-29.0, 0.0), &hitbox));
    }

    #[test]
    fn winding_does_not_matter() {
        let cw = Triangle([Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)]);
        let ccw = Triangle([cw.0[0], cw.0[2], cw.0[1]]);
        let p = Point::new(2.0, 2.0);
        assert!(point_in_triangle(p, &cw));
        assert!(point_in_triangle(p, &ccw));
    }
}
