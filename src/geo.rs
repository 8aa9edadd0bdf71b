use std::cmp::Ordering;

// ── Polyline processing defaults ────────────────────────────────────
/// Simplification tolerance used when no explicit epsilon is given.
pub const SIMPLIFY_EPS: f64 = 0.5;
/// Distance below which an interior point counts as an outlier spike.
pub const OUTLIER_DIST: f64 = 50.0;
/// Densification step in input coordinate units.
pub const DENSIFY_STEP: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Euclidean distance between two points.
pub fn dist(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub lower_left: Point,
    pub upper_right: Point,
}

impl BBox {
    /// An empty box: extending it with any point yields that point.
    pub fn empty() -> Self {
        Self {
            lower_left: Point::new(f64::MAX, f64::MAX),
            upper_right: Point::new(f64::MIN, f64::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lower_left.x > self.upper_right.x
    }

    pub fn extend(&mut self, p: Point) {
        self.lower_left.x = self.lower_left.x.min(p.x);
        self.lower_left.y = self.lower_left.y.min(p.y);
        self.upper_right.x = self.upper_right.x.max(p.x);
        self.upper_right.y = self.upper_right.y.max(p.y);
    }

    /// Grow the box by `pad` on all four sides.
    pub fn pad(&self, pad: f64) -> Self {
        Self {
            lower_left: Point::new(self.lower_left.x - pad, self.lower_left.y - pad),
            upper_right: Point::new(self.upper_right.x + pad, self.upper_right.y + pad),
        }
    }

    pub fn width(&self) -> f64 {
        (self.upper_right.x - self.lower_left.x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.upper_right.y - self.lower_left.y).max(0.0)
    }
}

/// An open polygonal chain in the plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolyLine {
    points: Vec<Point>,
}

impl PolyLine {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, p: Point) {
        self.points.push(p);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn first(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|seg| dist(seg[0], seg[1]))
            .sum()
    }

    /// The point at arc-length distance `d` from the start, clamped to the
    /// chain's endpoints.
    pub fn point_at_dist(&self, d: f64) -> Option<Point> {
        if self.points.is_empty() {
            return None;
        }
        if d <= 0.0 {
            return self.first();
        }
        let mut walked = 0.0;
        for seg in self.points.windows(2) {
            let seg_len = dist(seg[0], seg[1]);
            if walked + seg_len >= d && seg_len > 0.0 {
                let t = (d - walked) / seg_len;
                return Some(Point::new(
                    seg[0].x + (seg[1].x - seg[0].x) * t,
                    seg[0].y + (seg[1].y - seg[0].y) * t,
                ));
            }
            walked += seg_len;
        }
        self.last()
    }

    /// The sub-chain between relative arc-length positions `a` and `b`,
    /// both in [0, 1].
    pub fn segment(&self, a: f64, b: f64) -> PolyLine {
        let total = self.length();
        if self.points.len() < 2 || total <= 0.0 {
            return self.clone();
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        let da = a.clamp(0.0, 1.0) * total;
        let db = b.clamp(0.0, 1.0) * total;

        let mut out = PolyLine::new();
        if let Some(p) = self.point_at_dist(da) {
            out.push(p);
        }
        let mut walked = 0.0;
        for seg in self.points.windows(2) {
            let seg_len = dist(seg[0], seg[1]);
            walked += seg_len;
            if walked > da && walked < db {
                out.push(seg[1]);
            }
        }
        if let Some(p) = self.point_at_dist(db) {
            out.push(p);
        }
        out.dedup();
        out
    }

    fn dedup(&mut self) {
        self.points
            .dedup_by(|a, b| dist(*a, *b) < f64::EPSILON * 16.0);
    }

    /// Project `p` onto the chain; returns the closest point and its
    /// arc-length position from the start.
    pub fn project(&self, p: Point) -> Option<(Point, f64)> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some((self.points[0], 0.0));
        }
        let mut best: Option<(Point, f64, f64)> = None;
        let mut walked = 0.0;
        for seg in self.points.windows(2) {
            let (q, t) = project_on_segment(p, seg[0], seg[1]);
            let d = dist(p, q);
            let at = walked + t * dist(seg[0], seg[1]);
            let better = match best {
                Some((_, _, bd)) => d < bd,
                None => true,
            };
            if better {
                best = Some((q, at, d));
            }
            walked += dist(seg[0], seg[1]);
        }
        best.map(|(q, at, _)| (q, at))
    }

    /// Insert interpolated points so no segment is longer than `step`.
    pub fn densify(&self, step: f64) -> PolyLine {
        if self.points.len() < 2 || step <= 0.0 {
            return self.clone();
        }
        let mut out = PolyLine::new();
        out.push(self.points[0]);
        for seg in self.points.windows(2) {
            let seg_len = dist(seg[0], seg[1]);
            let parts = (seg_len / step).ceil().max(1.0) as usize;
            for i in 1..=parts {
                let t = i as f64 / parts as f64;
                out.push(Point::new(
                    seg[0].x + (seg[1].x - seg[0].x) * t,
                    seg[0].y + (seg[1].y - seg[0].y) * t,
                ));
            }
        }
        out.dedup();
        out
    }

    /// Douglas-Peucker simplification with tolerance `eps`.
    pub fn simplify(&self, eps: f64) -> PolyLine {
        if self.points.len() < 3 {
            return self.clone();
        }
        let mut keep = vec![false; self.points.len()];
        keep[0] = true;
        keep[self.points.len() - 1] = true;
        simplify_rec(&self.points, 0, self.points.len() - 1, eps, &mut keep);
        PolyLine::from_points(
            self.points
                .iter()
                .zip(keep.iter())
                .filter(|(_, k)| **k)
                .map(|(p, _)| *p)
                .collect(),
        )
    }

    /// Drop interior points that jump away from both neighbours by more
    /// than `d` while the neighbours themselves are close together.
    pub fn smoothen_outliers(&self, d: f64) -> PolyLine {
        if self.points.len() < 3 {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.points.len());
        out.push(self.points[0]);
        for i in 1..self.points.len() - 1 {
            let prev = self.points[i - 1];
            let cur = self.points[i];
            let next = self.points[i + 1];
            let spike =
                dist(prev, cur) > d && dist(cur, next) > d && dist(prev, next) < d;
            if !spike {
                out.push(cur);
            }
        }
        out.push(self.points[self.points.len() - 1]);
        PolyLine::from_points(out)
    }

    /// Chaikin corner cutting, `n` rounds. Endpoints are preserved.
    pub fn apply_chaikin(&self, n: usize) -> PolyLine {
        let mut cur = self.points.clone();
        for _ in 0..n {
            if cur.len() < 3 {
                break;
            }
            let mut next = Vec::with_capacity(cur.len() * 2);
            next.push(cur[0]);
            for seg in cur.windows(2) {
                let q = Point::new(
                    0.75 * seg[0].x + 0.25 * seg[1].x,
                    0.75 * seg[0].y + 0.25 * seg[1].y,
                );
                let r = Point::new(
                    0.25 * seg[0].x + 0.75 * seg[1].x,
                    0.25 * seg[0].y + 0.75 * seg[1].y,
                );
                next.push(q);
                next.push(r);
            }
            next.push(cur[cur.len() - 1]);
            cur = next;
        }
        PolyLine::from_points(cur)
    }

    /// Pointwise average of several chains, sampled at matching relative
    /// positions along each.
    pub fn average(lines: &[&PolyLine]) -> PolyLine {
        let lines: Vec<&&PolyLine> = lines.iter().filter(|l| !l.is_empty()).collect();
        if lines.is_empty() {
            return PolyLine::new();
        }
        let samples = lines.iter().map(|l| l.len()).max().unwrap().max(2);
        let mut out = PolyLine::new();
        for i in 0..samples {
            let t = i as f64 / (samples - 1) as f64;
            let mut x = 0.0;
            let mut y = 0.0;
            for l in &lines {
                let p = l.point_at_dist(t * l.length()).unwrap();
                x += p.x;
                y += p.y;
            }
            out.push(Point::new(x / lines.len() as f64, y / lines.len() as f64));
        }
        out
    }

    /// A segment of width `w`, centered on the chain point at arc-length
    /// `d` and orthogonal to the chain direction there.
    pub fn ortho_line_at_dist(&self, d: f64, w: f64) -> Option<(Point, Point)> {
        let center = self.point_at_dist(d)?;
        let before = self.point_at_dist((d - 0.1).max(0.0))?;
        let after = self.point_at_dist(d + 0.1)?;
        let dx = after.x - before.x;
        let dy = after.y - before.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len <= 0.0 {
            return None;
        }
        let (nx, ny) = (-dy / len, dx / len);
        Some((
            Point::new(center.x - nx * w / 2.0, center.y - ny * w / 2.0),
            Point::new(center.x + nx * w / 2.0, center.y + ny * w / 2.0),
        ))
    }

    /// All proper intersection points with another chain, ordered along
    /// this chain.
    pub fn intersections(&self, other: &PolyLine) -> Vec<Point> {
        let mut out: Vec<(f64, Point)> = Vec::new();
        let mut walked = 0.0;
        for a in self.points.windows(2) {
            for b in other.points.windows(2) {
                if let Some((p, t)) = segment_intersection(a[0], a[1], b[0], b[1]) {
                    out.push((walked + t * dist(a[0], a[1]), p));
                }
            }
            walked += dist(a[0], a[1]);
        }
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        out.into_iter().map(|(_, p)| p).collect()
    }
}

fn project_on_segment(p: Point, a: Point, b: Point) -> (Point, f64) {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    if len2 <= 0.0 {
        return (a, 0.0);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    (Point::new(a.x + dx * t, a.y + dy * t), t)
}

fn segment_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<(Point, f64)> {
    let rx = a2.x - a1.x;
    let ry = a2.y - a1.y;
    let sx = b2.x - b1.x;
    let sy = b2.y - b1.y;
    let denom = rx * sy - ry * sx;
    if denom.abs() < 1e-12 {
        return None;
    }
    let qx = b1.x - a1.x;
    let qy = b1.y - a1.y;
    let t = (qx * sy - qy * sx) / denom;
    let u = (qx * ry - qy * rx) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((Point::new(a1.x + rx * t, a1.y + ry * t), t))
    } else {
        None
    }
}

fn simplify_rec(points: &[Point], lo: usize, hi: usize, eps: f64, keep: &mut [bool]) {
    if hi <= lo + 1 {
        return;
    }
    let mut max_d = 0.0;
    let mut max_i = lo;
    for i in lo + 1..hi {
        let (q, _) = project_on_segment(points[i], points[lo], points[hi]);
        let d = dist(points[i], q);
        if d > max_d {
            max_d = d;
            max_i = i;
        }
    }
    if max_d > eps {
        keep[max_i] = true;
        simplify_rec(points, lo, max_i, eps, keep);
        simplify_rec(points, max_i, hi, eps, keep);
    }
}

/// Cubic Bézier curve.
#[derive(Debug, Clone, Copy)]
pub struct BezierCurve {
    pub a: Point,
    pub b: Point,
    pub c: Point,
    pub d: Point,
}

impl BezierCurve {
    pub fn new(a: Point, b: Point, c: Point, d: Point) -> Self {
        Self { a, b, c, d }
    }

    /// Sample the curve into a chain of `n` segments (`n + 1` points).
    pub fn render(&self, n: usize) -> PolyLine {
        let n = n.max(1);
        let mut out = PolyLine::new();
        for i in 0..=n {
            let t = i as f64 / n as f64;
            let mt = 1.0 - t;
            let x = mt * mt * mt * self.a.x
                + 3.0 * mt * mt * t * self.b.x
                + 3.0 * mt * t * t * self.c.x
                + t * t * t * self.d.x;
            let y = mt * mt * mt * self.a.y
                + 3.0 * mt * mt * t * self.b.y
                + 3.0 * mt * t * t * self.c.y
                + t * t * t * self.d.y;
            out.push(Point::new(x, y));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> PolyLine {
        PolyLine::from_points(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn length_and_point_at_dist() {
        let pl = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert_eq!(pl.length(), 20.0);
        assert_eq!(pl.point_at_dist(5.0), Some(Point::new(5.0, 0.0)));
        assert_eq!(pl.point_at_dist(15.0), Some(Point::new(10.0, 5.0)));
        assert_eq!(pl.point_at_dist(99.0), Some(Point::new(10.0, 10.0)));
    }

    #[test]
    fn segment_cuts_by_relative_position() {
        let pl = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let seg = pl.segment(0.25, 0.75);
        assert_eq!(seg.first(), Some(Point::new(2.5, 0.0)));
        assert_eq!(seg.last(), Some(Point::new(7.5, 0.0)));
    }

    #[test]
    fn densify_bounds_segment_length() {
        let pl = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let dense = pl.densify(3.0);
        for seg in dense.points().windows(2) {
            assert!(dist(seg[0], seg[1]) <= 3.0 + 1e-9);
        }
        assert_eq!(dense.first(), pl.first());
        assert_eq!(dense.last(), pl.last());
    }

    #[test]
    fn simplify_drops_collinear_points() {
        let pl = line(&[(0.0, 0.0), (5.0, 0.01), (10.0, 0.0)]);
        assert_eq!(pl.simplify(SIMPLIFY_EPS).len(), 2);
        let bent = line(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        assert_eq!(bent.simplify(SIMPLIFY_EPS).len(), 3);
    }

    #[test]
    fn outlier_spike_is_removed() {
        let pl = line(&[(0.0, 0.0), (5.0, 100.0), (10.0, 0.0)]);
        let smooth = pl.smoothen_outliers(OUTLIER_DIST);
        assert_eq!(smooth.len(), 2);
    }

    #[test]
    fn chaikin_preserves_endpoints() {
        let pl = line(&[(0.0, 0.0), (5.0, 5.0), (10.0, 0.0)]);
        let smooth = pl.apply_chaikin(2);
        assert_eq!(smooth.first(), pl.first());
        assert_eq!(smooth.last(), pl.last());
        assert!(smooth.len() > pl.len());
    }

    #[test]
    fn crossing_segments_intersect_once() {
        let a = line(&[(0.0, 0.0), (10.0, 10.0)]);
        let b = line(&[(0.0, 10.0), (10.0, 0.0)]);
        let hits = a.intersections(&b);
        assert_eq!(hits.len(), 1);
        assert!(dist(hits[0], Point::new(5.0, 5.0)) < 1e-9);
    }

    #[test]
    fn bezier_render_interpolates_endpoints() {
        let bc = BezierCurve::new(
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
        );
        let pl = bc.render(10);
        assert_eq!(pl.len(), 11);
        assert_eq!(pl.first(), Some(Point::new(0.0, 0.0)));
        assert_eq!(pl.last(), Some(Point::new(10.0, 0.0)));
    }
}
