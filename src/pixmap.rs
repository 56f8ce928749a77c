// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};

/// Largest source-coordinate error tolerated from `Pixmap::invert`; the
/// scanner pads its integer limits by this much.
pub(crate) const MAX_INVERSION_ERROR: f64 = 0.03;

/// Per-pixel forward map from source to destination coordinates.
///
/// Entry `(i, j)` holds the destination `(x, y)` at which the center of
/// source pixel `(i, j)` lands. A non-finite component marks the source
/// pixel as unmappable.
pub struct Pixmap {
    size: (usize, usize),
    data: Vec<[f64; 2]>,
}

impl Pixmap {
    pub fn new(xsize: usize, ysize: usize) -> Result<Pixmap> {
        if xsize as u64 >= i64::MAX as u64 / 4 || ysize as u64 >= i64::MAX as u64 / 4 {
            return Err(Error::ImageSizeTooLarge(xsize, ysize));
        }
        if xsize == 0 || ysize == 0 {
            return Err(Error::InvalidImageSize(xsize, ysize));
        }
        let total_size = xsize
            .checked_mul(ysize)
            .ok_or(Error::ImageSizeTooLarge(xsize, ysize))?;
        let mut data = vec![];
        data.try_reserve_exact(total_size)?;
        data.resize(total_size, [0.0; 2]);
        Ok(Pixmap {
            size: (xsize, ysize),
            data,
        })
    }

    /// Builds a map by evaluating `f` at every source pixel.
    pub fn from_fn(
        xsize: usize,
        ysize: usize,
        mut f: impl FnMut(usize, usize) -> [f64; 2],
    ) -> Result<Pixmap> {
        let mut pixmap = Pixmap::new(xsize, ysize)?;
        for j in 0..ysize {
            for i in 0..xsize {
                pixmap.set(i, j, f(i, j));
            }
        }
        Ok(pixmap)
    }

    /// The map that sends every source pixel to the same destination
    /// coordinates.
    pub fn identity(xsize: usize, ysize: usize) -> Result<Pixmap> {
        Pixmap::from_fn(xsize, ysize, |i, j| [i as f64, j as f64])
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> [f64; 2] {
        debug_assert!(i < self.size.0 && j < self.size.1);
        self.data[j * self.size.0 + i]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: [f64; 2]) {
        debug_assert!(i < self.size.0 && j < self.size.1);
        self.data[j * self.size.0 + i] = value;
    }

    /// Destination coordinates of the center of source pixel `(i, j)`,
    /// or `None` if the pixel is unmappable.
    #[inline]
    pub fn map_pixel(&self, i: usize, j: usize) -> Option<(f64, f64)> {
        let [ox, oy] = self.get(i, j);
        if ox.is_finite() && oy.is_finite() {
            Some((ox, oy))
        } else {
            None
        }
    }

    /// Destination coordinates of an arbitrary source point, by bilinear
    /// interpolation of the four surrounding map entries. Points outside
    /// the grid are extrapolated from the nearest cell. Returns `None`
    /// if any of the surrounding entries is non-finite.
    pub fn map_point(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (w, h) = self.size;
        let (i0, fx) = base_cell(x, w);
        let (j0, fy) = base_cell(y, h);
        let i1 = (i0 + 1).min(w - 1);
        let j1 = (j0 + 1).min(h - 1);

        let p00 = self.get(i0, j0);
        let p10 = self.get(i1, j0);
        let p01 = self.get(i0, j1);
        let p11 = self.get(i1, j1);
        for p in [p00, p10, p01, p11] {
            if !p[0].is_finite() || !p[1].is_finite() {
                return None;
            }
        }

        let ox = p00[0] * (1.0 - fx) * (1.0 - fy)
            + p10[0] * fx * (1.0 - fy)
            + p01[0] * (1.0 - fx) * fy
            + p11[0] * fx * fy;
        let oy = p00[1] * (1.0 - fx) * (1.0 - fy)
            + p10[1] * fx * (1.0 - fy)
            + p01[1] * (1.0 - fx) * fy
            + p11[1] * fx * fy;
        Some((ox, oy))
    }

    /// A source coordinate whose forward map lands on `(ox, oy)`, found
    /// by coordinate-wise bisection over the source grid. The bisection
    /// assumes an axis-monotonic map, so the candidate is confirmed by a
    /// forward round trip; `None` means the inversion failed.
    pub fn invert(&self, ox: f64, oy: f64) -> Option<(f64, f64)> {
        const GTOL: f64 = 5.0e-5;
        const MAX_ITER: usize = 50;

        let (w, h) = self.size;
        let (mut xmin, mut xmax) = (-0.5, w as f64 - 0.5);
        let (mut ymin, mut ymax) = (-0.5, h as f64 - 0.5);

        for _ in 0..MAX_ITER {
            if xmax - xmin <= GTOL && ymax - ymin <= GTOL {
                break;
            }
            let xm = 0.5 * (xmin + xmax);
            let ym = 0.5 * (ymin + ymax);
            let (fx, fy) = self.map_point(xm, ym)?;
            if fx > ox {
                xmax = xm;
            } else {
                xmin = xm;
            }
            if fy > oy {
                ymax = ym;
            } else {
                ymin = ym;
            }
        }
        if xmax - xmin > GTOL || ymax - ymin > GTOL {
            return None;
        }

        let xin = 0.5 * (xmin + xmax);
        let yin = 0.5 * (ymin + ymax);
        let (fx, fy) = self.map_point(xin, yin)?;
        if (fx - ox).abs() > MAX_INVERSION_ERROR || (fy - oy).abs() > MAX_INVERSION_ERROR {
            return None;
        }
        Some((xin, yin))
    }
}

/// Base index and fractional offset of the interpolation cell holding
/// `x`, clamped so the cell stays inside a grid of `n` entries.
fn base_cell(x: f64, n: usize) -> (usize, f64) {
    if n < 2 {
        return (0, 0.0);
    }
    let i = (x.floor() as i64).clamp(0, n as i64 - 2) as usize;
    (i, x - i as f64)
}
