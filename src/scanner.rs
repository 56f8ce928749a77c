// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Restricts kernel work to the source rows and columns whose
//! destination positions can fall on the destination image.
//!
//! The source ROI corners are mapped to destination space, the
//! resulting quadrilateral is clipped against the destination image
//! rectangle, and the clipped polygon is mapped back to source space.
//! Scanning that source-space polygon row by row yields, for each
//! source row, the inclusive column range worth processing.

use crate::params::ResampleParams;
use crate::pixmap::{MAX_INVERSION_ERROR, Pixmap};

// Maximum number of vertices in the footprint quadrilateral; clipping
// against the destination rectangle can double it.
const IMAGE_OUTLINE_NPTS: usize = 4;

// Edges with less vertical extent than this carry no scanline
// information; inverted vertices are only accurate to the inversion
// tolerance anyway.
const MIN_EDGE_DY: f64 = 1e-3;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Vertex {
    x: f64,
    y: f64,
}

/// An open polygon (the last vertex is not repeated) of at most eight
/// vertices.
#[derive(Clone, Copy, Debug, Default)]
struct Polygon {
    v: [Vertex; 2 * IMAGE_OUTLINE_NPTS],
    npv: usize,
}

impl Polygon {
    fn push(&mut self, v: Vertex) {
        debug_assert!(self.npv < self.v.len());
        if self.npv < self.v.len() {
            self.v[self.npv] = v;
            self.npv += 1;
        }
    }

    fn is_empty(&self) -> bool {
        self.npv == 0
    }

    fn vertices(&self) -> &[Vertex] {
        &self.v[..self.npv]
    }

    /// One Sutherland-Hodgman clipping pass against a half-plane.
    fn clip(
        &self,
        inside: impl Fn(&Vertex) -> bool,
        cross: impl Fn(&Vertex, &Vertex) -> Vertex,
    ) -> Polygon {
        let mut out = Polygon::default();
        let n = self.npv;
        for k in 0..n {
            let cur = self.v[k];
            let prev = self.v[(k + n - 1) % n];
            match (inside(&prev), inside(&cur)) {
                (true, true) => out.push(cur),
                (true, false) => out.push(cross(&prev, &cur)),
                (false, true) => {
                    out.push(cross(&prev, &cur));
                    out.push(cur);
                }
                (false, false) => {}
            }
        }
        out
    }

    /// Intersection with an axis-aligned rectangle.
    fn clip_to_rect(&self, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Polygon {
        let cross_x = |bound: f64| {
            move |a: &Vertex, b: &Vertex| {
                let t = (bound - a.x) / (b.x - a.x);
                Vertex {
                    x: bound,
                    y: a.y + t * (b.y - a.y),
                }
            }
        };
        let cross_y = |bound: f64| {
            move |a: &Vertex, b: &Vertex| {
                let t = (bound - a.y) / (b.y - a.y);
                Vertex {
                    x: a.x + t * (b.x - a.x),
                    y: bound,
                }
            }
        };

        let mut poly = self.clip(|v| v.x >= xmin, cross_x(xmin));
        if poly.is_empty() {
            return poly;
        }
        poly = poly.clip(|v| v.x <= xmax, cross_x(xmax));
        if poly.is_empty() {
            return poly;
        }
        poly = poly.clip(|v| v.y >= ymin, cross_y(ymin));
        if poly.is_empty() {
            return poly;
        }
        poly.clip(|v| v.y <= ymax, cross_y(ymax))
    }

    /// True if `other` has the same vertices in the same cyclic order.
    fn cyclically_equal(&self, other: &Polygon) -> bool {
        if self.npv != other.npv {
            return false;
        }
        let n = self.npv;
        (0..n).any(|off| (0..n).all(|k| self.v[(k + off) % n] == other.v[k]))
    }

    /// Drops consecutive (and wrap-around) near-duplicate vertices.
    fn dedupe(&self) -> Polygon {
        fn near(a: &Vertex, b: &Vertex) -> bool {
            (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
        }
        let mut out = Polygon::default();
        for v in self.vertices() {
            if out.npv == 0 || !near(&out.v[out.npv - 1], v) {
                out.push(*v);
            }
        }
        while out.npv > 1 && near(&out.v[out.npv - 1], &out.v[0]) {
            out.npv -= 1;
        }
        out
    }
}

/// One directed edge of a scan chain, oriented upwards (`y1 < y2`).
#[derive(Clone, Copy, Debug)]
struct Edge {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl Edge {
    fn x_at(&self, y: f64) -> f64 {
        let yy = y.clamp(self.y1, self.y2);
        self.x1 + (yy - self.y1) * (self.x2 - self.x1) / (self.y2 - self.y1)
    }
}

enum ScanMode {
    /// Nothing of the ROI can land on the destination image.
    Inactive,
    /// The footprint has no usable vertical extent; one x range serves
    /// every row in the scan range.
    Flat { x1: f64, x2: f64 },
    /// Left and right edge chains around the bottom vertex, advanced
    /// monotonically in `y`.
    Chains {
        left: Vec<Edge>,
        right: Vec<Edge>,
        li: usize,
        ri: usize,
    },
}

/// Per-row answer from the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scanline {
    /// The row overlaps the footprint in the inclusive column range
    /// `[x1, x2]`.
    Range { x1: i64, x2: i64 },
    /// The row is above the footprint; no later row can match either.
    Done,
    /// The row is outside the footprint or outside the source image.
    Outside,
    /// The row grazes the footprint but no pixel center falls inside.
    Degenerate,
}

pub struct Scanner {
    mode: ScanMode,
    ymin_row: i64,
    ymax_row: i64,
    xmin_clip: i64,
    xmax_clip: i64,
    height: i64,
    done: bool,
}

impl Scanner {
    /// Builds the scanner for one run: maps the ROI outline to
    /// destination space, clips it against the destination image, and
    /// converts the result back to a source-space scan polygon. Any
    /// failure along the way degrades gracefully: an unusable footprint
    /// yields an inactive scanner, a failed inversion falls back to the
    /// unclipped ROI outline.
    pub fn for_image(p: &ResampleParams<'_>) -> Scanner {
        let (w_in, h_in) = p.data.size();
        let (w_out, h_out) = p.output_data.size();

        let sx = [p.xmin as f64, p.xmax as f64, p.xmax as f64, p.xmin as f64];
        let sy = [p.ymin as f64, p.ymin as f64, p.ymax as f64, p.ymax as f64];
        let mut roi_poly = Polygon::default();
        for k in 0..4 {
            roi_poly.push(Vertex { x: sx[k], y: sy[k] });
        }

        let mut mapped = Polygon::default();
        for k in 0..4 {
            match p.pixmap.map_point(sx[k], sy[k]) {
                Some((x, y)) => mapped.push(Vertex { x, y }),
                None => return Scanner::inactive(p.ymin, p.ymax),
            }
        }

        let clipped = mapped.clip_to_rect(
            -0.5,
            w_out as f64 - 0.5,
            -0.5,
            h_out as f64 - 0.5,
        );
        if clipped.is_empty() {
            return Scanner::inactive(p.ymin, p.ymax);
        }

        let source_poly = if clipped.cyclically_equal(&mapped) {
            roi_poly
        } else {
            invert_polygon(p.pixmap, &clipped).unwrap_or(roi_poly)
        };

        Scanner::from_polygon(
            &source_poly,
            (p.xmin, p.xmax, p.ymin, p.ymax),
            w_in,
            h_in,
        )
    }

    fn inactive(ymin: i64, ymax: i64) -> Scanner {
        Scanner {
            mode: ScanMode::Inactive,
            ymin_row: ymin,
            ymax_row: ymax,
            xmin_clip: 0,
            xmax_clip: 0,
            height: 0,
            done: false,
        }
    }

    fn from_polygon(
        poly: &Polygon,
        roi: (i64, i64, i64, i64),
        w_in: usize,
        h_in: usize,
    ) -> Scanner {
        let (roi_xmin, roi_xmax, roi_ymin, roi_ymax) = roi;
        let poly = poly.dedupe();
        if poly.is_empty() {
            return Scanner::inactive(roi_ymin, roi_ymax);
        }

        let ymin_poly = poly.vertices().iter().fold(f64::INFINITY, |a, v| a.min(v.y));
        let ymax_poly = poly
            .vertices()
            .iter()
            .fold(f64::NEG_INFINITY, |a, v| a.max(v.y));

        let ymin_row = ((ymin_poly - MAX_INVERSION_ERROR).ceil() as i64)
            .max(roi_ymin)
            .max(0);
        let ymax_row = ((ymax_poly + MAX_INVERSION_ERROR).floor() as i64)
            .min(roi_ymax)
            .min(h_in as i64 - 1);
        if ymin_row > ymax_row {
            return Scanner::inactive(roi_ymin, roi_ymax);
        }

        let xmin_clip = roi_xmin.max(0);
        let xmax_clip = roi_xmax.min(w_in as i64 - 1);
        if xmin_clip > xmax_clip {
            return Scanner::inactive(roi_ymin, roi_ymax);
        }

        // Split the outline into the two chains that connect the bottom
        // vertex to the top vertex.
        let n = poly.npv;
        let mut imin = 0;
        let mut imax = 0;
        for (k, v) in poly.vertices().iter().enumerate() {
            if v.y < poly.v[imin].y {
                imin = k;
            }
            if v.y > poly.v[imax].y {
                imax = k;
            }
        }

        let mut chain_a = Vec::new();
        let mut k = imin;
        while k != imax {
            let k1 = (k + 1) % n;
            push_edge(&mut chain_a, &poly.v[k], &poly.v[k1]);
            k = k1;
        }
        let mut chain_b = Vec::new();
        let mut k = imin;
        while k != imax {
            let k1 = (k + n - 1) % n;
            push_edge(&mut chain_b, &poly.v[k], &poly.v[k1]);
            k = k1;
        }

        let mode = if chain_a.is_empty() || chain_b.is_empty() {
            let x1 = poly.vertices().iter().fold(f64::INFINITY, |a, v| a.min(v.x));
            let x2 = poly
                .vertices()
                .iter()
                .fold(f64::NEG_INFINITY, |a, v| a.max(v.x));
            ScanMode::Flat { x1, x2 }
        } else {
            let ymid = 0.5 * (ymin_poly + ymax_poly);
            let xa = chain_x_at(&chain_a, ymid);
            let xb = chain_x_at(&chain_b, ymid);
            let (left, right) = if xa <= xb {
                (chain_a, chain_b)
            } else {
                (chain_b, chain_a)
            };
            ScanMode::Chains {
                left,
                right,
                li: 0,
                ri: 0,
            }
        };

        Scanner {
            mode,
            ymin_row,
            ymax_row,
            xmin_clip,
            xmax_clip,
            height: h_in as i64,
            done: false,
        }
    }

    /// The inclusive row range the caller should iterate. For an
    /// inactive scanner this is the full ROI row range; every one of
    /// those rows then reports `Outside`.
    pub fn row_range(&self) -> (i64, i64) {
        (self.ymin_row, self.ymax_row)
    }

    /// Scanline limits for row `j`. Rows must be visited in increasing
    /// order.
    pub fn scanline_limits(&mut self, j: i64) -> Scanline {
        if self.done {
            return Scanline::Done;
        }
        if j < 0 || j >= self.height {
            return Scanline::Outside;
        }
        if j < self.ymin_row {
            return Scanline::Outside;
        }

        let jf = j as f64;
        let (xmin_clip, xmax_clip) = (self.xmin_clip, self.xmax_clip);
        let (xl, xr) = match &mut self.mode {
            ScanMode::Inactive => return Scanline::Outside,
            ScanMode::Flat { x1, x2 } => {
                if j > self.ymax_row {
                    self.done = true;
                    return Scanline::Done;
                }
                (*x1, *x2)
            }
            ScanMode::Chains {
                left,
                right,
                li,
                ri,
            } => {
                let mut ended = false;
                while jf > left[*li].y2 + MAX_INVERSION_ERROR {
                    if *li + 1 == left.len() {
                        ended = true;
                        break;
                    }
                    *li += 1;
                }
                while jf > right[*ri].y2 + MAX_INVERSION_ERROR {
                    if *ri + 1 == right.len() {
                        ended = true;
                        break;
                    }
                    *ri += 1;
                }
                if ended {
                    self.done = true;
                    return Scanline::Done;
                }
                (left[*li].x_at(jf), right[*ri].x_at(jf))
            }
        };

        let x1 = ((xl - MAX_INVERSION_ERROR).ceil() as i64).max(xmin_clip);
        let x2 = ((xr + MAX_INVERSION_ERROR).floor() as i64).min(xmax_clip);
        if x1 > x2 {
            Scanline::Degenerate
        } else {
            Scanline::Range { x1, x2 }
        }
    }
}

fn push_edge(chain: &mut Vec<Edge>, v1: &Vertex, v2: &Vertex) {
    if v2.y - v1.y > MIN_EDGE_DY {
        chain.push(Edge {
            x1: v1.x,
            y1: v1.y,
            x2: v2.x,
            y2: v2.y,
        });
    }
}

fn chain_x_at(chain: &[Edge], y: f64) -> f64 {
    let mut x = f64::NAN;
    for e in chain {
        x = e.x_at(y);
        if y <= e.y2 {
            break;
        }
    }
    x
}

fn invert_polygon(pixmap: &Pixmap, poly: &Polygon) -> Option<Polygon> {
    let mut out = Polygon::default();
    for v in poly.vertices() {
        let (x, y) = pixmap.invert(v.x, v.y)?;
        out.push(Vertex { x, y });
    }
    Some(out)
}
