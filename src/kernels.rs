// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The kernel drivers that walk the source grid and deposit flux into
//! the output planes, and the dispatcher that selects one.
//!
//! Every driver shares the same outer loop: iterate the scanner's row
//! range, fetch per-row column limits, map each source pixel, compute
//! its destination footprint, and merge the weighted contributions into
//! the running mean. Contributions are merged in scanline order (rows,
//! then columns); the weighted mean is not associative in floating
//! point, so this order is part of the output contract.

use crate::error::{Error, Result};
use crate::geometry::{QuadEdges, boxer, over};
use crate::params::{Kernel, ResampleParams};
use crate::scanner::{Scanline, Scanner};
use crate::util::tracing_wrappers::*;
use crate::util::{create_lanczos_lut, fortran_round};

/// The context bit owned by input frame `uuid`, within its plane.
pub fn compute_bit_value(uuid: i32) -> u32 {
    let plane = (uuid - 1) / 32 + 1;
    let bit_no = uuid - 1 - 32 * (plane - 1);
    1u32 << bit_no
}

/// The context plane owned by input frame `uuid`.
pub fn context_plane(uuid: i32) -> usize {
    ((uuid - 1) / 32) as usize
}

/// Merges one contribution of flux `d` with weight `dow` into the
/// running weighted mean at output pixel `(ii, jj)`, given the counts
/// value `vc` read before the update. A store outside either output
/// plane is a fatal error.
fn update_data(
    p: &mut ResampleParams<'_>,
    ii: i64,
    jj: i64,
    d: f32,
    vc: f32,
    dow: f32,
) -> Result<()> {
    if dow == 0.0 {
        return Ok(());
    }

    let vc_plus_dow = f64::from(vc) + f64::from(dow);

    let (osx, osy) = p.output_data.size();
    if ii < 0 || jj < 0 || ii >= osx as i64 || jj >= osy as i64 {
        return Err(Error::OutputDataOutOfBounds(ii, jj));
    }
    let (x, y) = (ii as usize, jj as usize);
    if vc == 0.0 {
        p.output_data.set(x, y, d);
    } else {
        let value = (f64::from(p.output_data.get(x, y)) * f64::from(vc)
            + f64::from(dow) * f64::from(d))
            / vc_plus_dow;
        p.output_data.set(x, y, value as f32);
    }

    let (csx, csy) = p.output_counts.size();
    if ii < 0 || jj < 0 || ii >= csx as i64 || jj >= csy as i64 {
        return Err(Error::OutputCountsOutOfBounds(ii, jj));
    }
    p.output_counts.set(x, y, vc_plus_dow as f32);

    Ok(())
}

/// Counts value at `(ii, jj)`, or zero outside the counts plane; the
/// bounds of the store itself are enforced by `update_data`.
fn counts_at(p: &ResampleParams<'_>, ii: i64, jj: i64) -> f32 {
    let (csx, csy) = p.output_counts.size();
    if ii < 0 || jj < 0 || ii >= csx as i64 || jj >= csy as i64 {
        0.0
    } else {
        p.output_counts.get(ii as usize, jj as usize)
    }
}

/// Weight of source pixel `(i, j)`: the weights plane scaled by
/// `weight_scale`, or unity without a weights plane.
fn pixel_weight(p: &ResampleParams<'_>, i: i64, j: i64) -> f64 {
    match p.weights {
        Some(weights) => f64::from(weights.get(i as usize, j as usize)) * p.weight_scale,
        None => 1.0,
    }
}

enum RowAction {
    Process { x1: i64, x2: i64 },
    Skip,
    Stop,
}

/// Initializes the scanner and the skip/miss counters for one run.
fn start_scan(p: &mut ResampleParams<'_>) -> (Scanner, i64, i64, u64) {
    let scanner = Scanner::for_image(p);
    let (ymin, ymax) = scanner.row_range();
    let row_width = (p.xmax - p.xmin + 1) as u64;
    p.nskip = ((p.ymax - p.ymin) - (ymax - ymin)) as u64;
    p.nmiss = p.nskip * row_width;
    (scanner, ymin, ymax, row_width)
}

/// Fetches the scanline limits for row `j` and folds the scanner status
/// into the skip/miss counters. Every driver runs this at the top of
/// its row loop.
fn next_scan_row(
    p: &mut ResampleParams<'_>,
    scanner: &mut Scanner,
    j: i64,
    ymax: i64,
    row_width: u64,
) -> RowAction {
    match scanner.scanline_limits(j) {
        Scanline::Range { x1, x2 } => {
            p.nmiss += row_width - (x2 - x1 + 1) as u64;
            RowAction::Process { x1, x2 }
        }
        Scanline::Done => {
            // The scan passed the top of the footprint; the remaining
            // ROI rows are skipped wholesale.
            let rows = (ymax + 1 - j) as u64;
            p.nskip += rows;
            p.nmiss += rows * row_width;
            RowAction::Stop
        }
        Scanline::Outside | Scanline::Degenerate => {
            p.nskip += 1;
            p.nmiss += row_width;
            RowAction::Skip
        }
    }
}

/// All the flux of a source pixel lands on the destination pixel
/// nearest to its mapped center. No area factor is applied to the
/// weight: point flux has no area.
fn kernel_point(p: &mut ResampleParams<'_>) -> Result<()> {
    let scale2 = (p.scale * p.scale) as f32;
    let bv = compute_bit_value(p.uuid);
    let plane = context_plane(p.uuid);

    let (mut scanner, ymin, ymax, row_width) = start_scan(p);
    let (osx, osy) = p.output_data.size();
    let (osx, osy) = (osx as i64, osy as i64);

    for j in ymin..=ymax {
        let (x1, x2) = match next_scan_row(p, &mut scanner, j, ymax, row_width) {
            RowAction::Stop => break,
            RowAction::Skip => continue,
            RowAction::Process { x1, x2 } => (x1, x2),
        };

        for i in x1..=x2 {
            let Some((ox, oy)) = p.pixmap.map_pixel(i as usize, j as usize) else {
                p.nmiss += 1;
                continue;
            };

            let ii = fortran_round(ox);
            let jj = fortran_round(oy);
            if ii < 0 || ii >= osx || jj < 0 || jj >= osy {
                p.nmiss += 1;
                continue;
            }

            let vc = counts_at(p, ii, jj);
            let d = p.data.get(i as usize, j as usize) * scale2;
            let dow = pixel_weight(p, i, j) as f32;

            if dow > 0.0 {
                if let Some(ctx) = p.output_context.as_deref_mut() {
                    ctx.set_bits(plane, ii as usize, jj as usize, bv);
                }
            }
            update_data(p, ii, jj, d, vc, dow)?;
        }
    }

    Ok(())
}

/// Flux spreads as a circular Gaussian around the mapped center. The
/// footprint radius never drops below `1.2 / scale` so that a sparse
/// output grid cannot develop holes.
fn kernel_gaussian(p: &mut ResampleParams<'_>) -> Result<()> {
    const NSIG: f64 = 2.5;
    const FWHM_SIGMA: f64 = 2.3548;

    let pfo = (NSIG * p.pixel_fraction / FWHM_SIGMA / p.scale).max(1.2 / p.scale);
    let ac = 1.0 / (p.pixel_fraction * p.pixel_fraction);
    let scale2 = p.scale * p.scale;
    let bv = compute_bit_value(p.uuid);
    let plane = context_plane(p.uuid);

    let efac = FWHM_SIGMA * FWHM_SIGMA * scale2 * ac / 2.0;
    let es = efac / std::f64::consts::PI;

    let (mut scanner, ymin, ymax, row_width) = start_scan(p);
    let (osx, osy) = p.output_data.size();
    let (osx, osy) = (osx as i64, osy as i64);

    for j in ymin..=ymax {
        let (x1, x2) = match next_scan_row(p, &mut scanner, j, ymax, row_width) {
            RowAction::Stop => break,
            RowAction::Skip => continue,
            RowAction::Process { x1, x2 } => (x1, x2),
        };

        for i in x1..=x2 {
            let mut nhit = 0u64;

            if let Some((ox, oy)) = p.pixmap.map_pixel(i as usize, j as usize) {
                let nxi = fortran_round(ox - pfo).max(0);
                let nxa = fortran_round(ox + pfo).min(osx - 1);
                let nyi = fortran_round(oy - pfo).max(0);
                let nya = fortran_round(oy + pfo).min(osy - 1);

                let d = (f64::from(p.data.get(i as usize, j as usize)) * scale2) as f32;
                let w = pixel_weight(p, i, j);

                for jj in nyi..=nya {
                    let ddy = oy - jj as f64;
                    for ii in nxi..=nxa {
                        let ddx = ox - ii as f64;
                        let r2 = ddx * ddx + ddy * ddy;
                        let dover = es * (-r2 * efac).exp();

                        nhit += 1;
                        let vc = counts_at(p, ii, jj);
                        let dow = (f64::from(dover as f32) * w) as f32;

                        if dow > 0.0 {
                            if let Some(ctx) = p.output_context.as_deref_mut() {
                                ctx.set_bits(plane, ii as usize, jj as usize, bv);
                            }
                        }
                        update_data(p, ii, jj, d, vc, dow)?;
                    }
                }
            }

            if nhit == 0 {
                p.nmiss += 1;
            }
        }
    }

    Ok(())
}

/// Flux spreads as a separable Lanczos function of the offset from the
/// mapped center, evaluated through a lookup table sampled every
/// `DEL` units. Lanczos weights go negative between the lobes, so
/// counts can locally decrease below the positive-kernel floor.
fn kernel_lanczos(p: &mut ResampleParams<'_>) -> Result<()> {
    const NLUT: usize = 512;
    const DEL: f32 = 0.01;

    let (dx, dy) = (1.0f64, 1.0f64);
    let scale2 = (p.scale * p.scale) as f32;
    let kernel_order: usize = if p.kernel == Kernel::Lanczos2 { 2 } else { 3 };
    let pfo = kernel_order as f64 * p.pixel_fraction / p.scale;
    let bv = compute_bit_value(p.uuid);
    let plane = context_plane(p.uuid);

    let mut lut = Vec::new();
    lut.try_reserve_exact(NLUT)?;
    lut.resize(NLUT, 0.0f32);
    create_lanczos_lut(kernel_order, DEL, &mut lut);
    let sdp = p.scale / f64::from(DEL) / p.pixel_fraction;

    let (mut scanner, ymin, ymax, row_width) = start_scan(p);
    let (osx, osy) = p.output_data.size();
    let (osx, osy) = (osx as i64, osy as i64);

    for j in ymin..=ymax {
        let (x1, x2) = match next_scan_row(p, &mut scanner, j, ymax, row_width) {
            RowAction::Stop => break,
            RowAction::Skip => continue,
            RowAction::Process { x1, x2 } => (x1, x2),
        };

        for i in x1..=x2 {
            let mut nhit = 0u64;

            if let Some((xx, yy)) = p.pixmap.map_pixel(i as usize, j as usize) {
                let nxi = fortran_round(xx - dx - pfo).max(0);
                let nxa = fortran_round(xx - dx + pfo).min(osx - 1);
                let nyi = fortran_round(yy - dy - pfo).max(0);
                let nya = fortran_round(yy - dy + pfo).min(osy - 1);

                let d = p.data.get(i as usize, j as usize) * scale2;
                let w = pixel_weight(p, i, j);

                for jj in nyi..=nya {
                    for ii in nxi..=nxa {
                        let ix = lut_index(xx - ii as f64, sdp, NLUT);
                        let iy = lut_index(yy - jj as f64, sdp, NLUT);
                        let dover = f64::from(lut[ix] * lut[iy]);

                        nhit += 1;
                        let vc = counts_at(p, ii, jj);
                        let dow = (dover * w) as f32;

                        if dow > 0.0 {
                            if let Some(ctx) = p.output_context.as_deref_mut() {
                                ctx.set_bits(plane, ii as usize, jj as usize, bv);
                            }
                        }
                        update_data(p, ii, jj, d, vc, dow)?;
                    }
                }
            }

            if nhit == 0 {
                p.nmiss += 1;
            }
        }
    }

    Ok(())
}

/// Lookup-table index for an offset of `delta` output pixels. The
/// index is clamped to the table; the footprint bound can produce
/// offsets one sample past the last entry.
#[inline]
fn lut_index(delta: f64, sdp: f64, nlut: usize) -> usize {
    (fortran_round(delta.abs() * sdp) + 1).min(nlut as i64 - 1) as usize
}

/// Flux spreads evenly over an axis-aligned square around the mapped
/// center, a cheap stand-in for `Square` when the mapping is close to
/// axis-aligned.
fn kernel_turbo(p: &mut ResampleParams<'_>) -> Result<()> {
    debug!("starting turbo kernel");
    let bv = compute_bit_value(p.uuid);
    let plane = context_plane(p.uuid);
    let ac = 1.0 / (p.pixel_fraction * p.pixel_fraction);
    let pfo = p.pixel_fraction / p.scale / 2.0;
    let scale2 = p.scale * p.scale;

    let (mut scanner, ymin, ymax, row_width) = start_scan(p);
    let (osx, osy) = p.output_data.size();
    let (osx, osy) = (osx as i64, osy as i64);

    for j in ymin..=ymax {
        let (x1, x2) = match next_scan_row(p, &mut scanner, j, ymax, row_width) {
            RowAction::Stop => break,
            RowAction::Skip => continue,
            RowAction::Process { x1, x2 } => (x1, x2),
        };

        for i in x1..=x2 {
            let mut nhit = 0u64;

            if let Some((ox, oy)) = p.pixmap.map_pixel(i as usize, j as usize) {
                let xxi = ox - pfo;
                let xxa = ox + pfo;
                let yyi = oy - pfo;
                let yya = oy + pfo;

                let iis = fortran_round(xxi).max(0);
                let iie = fortran_round(xxa).min(osx - 1);
                let jjs = fortran_round(yyi).max(0);
                let jje = fortran_round(yya).min(osy - 1);

                let d = p.data.get(i as usize, j as usize) * scale2 as f32;
                let w = pixel_weight(p, i, j);

                for jj in jjs..=jje {
                    for ii in iis..=iie {
                        let mut dover = over(ii, jj, xxi, xxa, yyi, yya);

                        if dover > 0.0 {
                            // Undo the pixel-fraction shrink of the box.
                            dover *= scale2 * ac;

                            nhit += 1;
                            let vc = counts_at(p, ii, jj);
                            let dow = (dover * w) as f32;

                            if dow > 0.0 {
                                if let Some(ctx) = p.output_context.as_deref_mut() {
                                    ctx.set_bits(plane, ii as usize, jj as usize, bv);
                                }
                            }
                            update_data(p, ii, jj, d, vc, dow)?;
                        }
                    }
                }
            }

            if nhit == 0 {
                p.nmiss += 1;
            }
        }
    }

    debug!("ending turbo kernel");
    Ok(())
}

/// The exact kernel: the four corners of the shrunken source pixel are
/// mapped to destination space and the overlap of the resulting
/// quadrilateral with every destination pixel in its bounding box is
/// computed exactly, normalized by the quadrilateral's area.
fn kernel_square(p: &mut ResampleParams<'_>) -> Result<()> {
    debug!("starting square kernel");
    let dh = 0.5 * p.pixel_fraction;
    let bv = compute_bit_value(p.uuid);
    let plane = context_plane(p.uuid);
    let scale2 = (p.scale * p.scale) as f32;

    let (mut scanner, ymin, ymax, row_width) = start_scan(p);
    let (osx, osy) = p.output_data.size();
    let (osx, osy) = (osx as i64, osy as i64);

    for j in ymin..=ymax {
        let (x1, x2) = match next_scan_row(p, &mut scanner, j, ymax, row_width) {
            RowAction::Stop => break,
            RowAction::Skip => continue,
            RowAction::Process { x1, x2 } => (x1, x2),
        };

        // Corners in clockwise order, starting top left.
        let yin = [
            j as f64 + dh,
            j as f64 + dh,
            j as f64 - dh,
            j as f64 - dh,
        ];

        for i in x1..=x2 {
            let mut nhit = 0u64;

            let xin = [
                i as f64 - dh,
                i as f64 + dh,
                i as f64 + dh,
                i as f64 - dh,
            ];
            let mut xout = [0.0f64; 4];
            let mut yout = [0.0f64; 4];
            let mut mapped = true;
            for k in 0..4 {
                match p.pixmap.map_point(xin[k], yin[k]) {
                    Some((x, y)) => {
                        xout[k] = x;
                        yout[k] = y;
                    }
                    None => {
                        mapped = false;
                        break;
                    }
                }
            }

            if mapped {
                // Twice the signed area of the output quadrilateral;
                // negative when the mapping flips orientation.
                let mut jaco = 0.5
                    * ((xout[1] - xout[3]) * (yout[0] - yout[2])
                        - (xout[0] - xout[2]) * (yout[1] - yout[3]));
                if jaco < 0.0 {
                    jaco = -jaco;
                    xout.swap(1, 3);
                    yout.swap(1, 3);
                }

                let d = p.data.get(i as usize, j as usize) * scale2;
                let w = pixel_weight(p, i, j);

                let edges = QuadEdges::from_corners(&xout, &yout);

                let min_ii = fortran_round(fold_min(&xout)).max(0);
                let max_ii = fortran_round(fold_max(&xout)).min(osx - 1);
                let min_jj = fortran_round(fold_min(&yout)).max(0);
                let max_jj = fortran_round(fold_max(&yout)).min(osy - 1);

                for ii in min_ii..=max_ii {
                    for jj in min_jj..=max_jj {
                        let mut dover = boxer(ii as f64, jj as f64, &xout, &yout, &edges);

                        if dover > 0.0 {
                            let vc = counts_at(p, ii, jj);
                            dover /= jaco;
                            let dow = (dover * w) as f32;

                            nhit += 1;
                            if dow > 0.0 {
                                if let Some(ctx) = p.output_context.as_deref_mut() {
                                    ctx.set_bits(plane, ii as usize, jj as usize, bv);
                                }
                            }
                            update_data(p, ii, jj, d, vc, dow)?;
                        }
                    }
                }
            }

            if nhit == 0 {
                p.nmiss += 1;
            }
        }
    }

    debug!("ending square kernel");
    Ok(())
}

fn fold_min(values: &[f64; 4]) -> f64 {
    values.iter().fold(f64::INFINITY, |a, &b| a.min(b))
}

fn fold_max(values: &[f64; 4]) -> f64 {
    values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
}

fn validate(p: &ResampleParams<'_>) -> Result<()> {
    let (dx, dy) = p.data.size();
    let (px, py) = p.pixmap.size();
    if (px, py) != (dx, dy) {
        return Err(Error::ShapeMismatch("pixmap", px, py, dx, dy));
    }
    if let Some(weights) = p.weights {
        let (wx, wy) = weights.size();
        if (wx, wy) != (dx, dy) {
            return Err(Error::ShapeMismatch("weights", wx, wy, dx, dy));
        }
    }
    if p.xmax < p.xmin || p.ymax < p.ymin {
        return Err(Error::InvalidRoi(p.xmin, p.xmax, p.ymin, p.ymax));
    }
    if p.uuid < 1 {
        return Err(Error::InvalidImageId(p.uuid));
    }
    if let Some(ctx) = &p.output_context {
        let (ox, oy) = p.output_data.size();
        let (cx, cy) = ctx.size();
        if (cx, cy) != (ox, oy) {
            return Err(Error::ShapeMismatch("output_context", cx, cy, ox, oy));
        }
        let plane = context_plane(p.uuid);
        if plane >= ctx.planes() {
            return Err(Error::ContextPlaneOutOfRange(ctx.planes(), p.uuid, plane));
        }
    }
    Ok(())
}

/// Runs one resampling pass with the kernel selected in the bundle,
/// updating the output planes and the skip/miss counters in place.
pub fn resample(p: &mut ResampleParams<'_>) -> Result<()> {
    debug!("starting resample");
    validate(p)?;
    match p.kernel {
        Kernel::Square => kernel_square(p)?,
        Kernel::Gaussian => kernel_gaussian(p)?,
        Kernel::Point => kernel_point(p)?,
        Kernel::Turbo => kernel_turbo(p)?,
        Kernel::Lanczos2 | Kernel::Lanczos3 => kernel_lanczos(p)?,
    }
    debug!("ending resample");
    Ok(())
}
