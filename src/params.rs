// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt;
use std::str::FromStr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::error::{Error, Result};
use crate::image::{ContextImage, Image};
use crate::pixmap::Pixmap;

/// How the flux of one source pixel is distributed over the
/// destination pixels it lands on.
#[derive(Copy, Clone, PartialEq, Eq, Debug, FromPrimitive)]
pub enum Kernel {
    /// Exact overlap of the (shrunken) source pixel quadrilateral with
    /// each destination pixel.
    Square = 0,
    /// Gaussian weight by distance from the mapped pixel center.
    Gaussian = 1,
    /// All flux lands on the single nearest destination pixel.
    Point = 2,
    /// Overlap of an axis-aligned square, a fast approximation of
    /// `Square`.
    Turbo = 3,
    Lanczos2 = 4,
    Lanczos3 = 5,
}

impl Kernel {
    /// Converts an integer kernel tag, rejecting values outside the
    /// enum.
    pub fn from_tag(tag: i32) -> Result<Kernel> {
        Kernel::from_i32(tag).ok_or(Error::InvalidKernelType)
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(name: &str) -> Result<Kernel> {
        match name {
            "square" => Ok(Kernel::Square),
            "gaussian" => Ok(Kernel::Gaussian),
            "point" => Ok(Kernel::Point),
            "turbo" => Ok(Kernel::Turbo),
            "lanczos2" => Ok(Kernel::Lanczos2),
            "lanczos3" => Ok(Kernel::Lanczos3),
            _ => Err(Error::InvalidKernelName(name.to_string())),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kernel::Square => "square",
            Kernel::Gaussian => "gaussian",
            Kernel::Point => "point",
            Kernel::Turbo => "turbo",
            Kernel::Lanczos2 => "lanczos2",
            Kernel::Lanczos3 => "lanczos3",
        };
        f.write_str(name)
    }
}

/// Everything one resampling run needs: the input planes, the output
/// planes it updates in place, and the run options. The planes are
/// borrowed for the duration of the run; the engine keeps no state of
/// its own.
pub struct ResampleParams<'a> {
    pub kernel: Kernel,
    /// 1-based id of the input frame, used for context bookkeeping.
    pub uuid: i32,
    /// Destination/source linear scale ratio.
    pub scale: f64,
    /// Linear shrink factor applied to a source pixel before it is
    /// projected, in `(0, 1]`.
    pub pixel_fraction: f64,
    /// Multiplier applied to the weights plane.
    pub weight_scale: f64,
    /// Inclusive source-pixel bounds of the region to process.
    pub xmin: i64,
    pub xmax: i64,
    pub ymin: i64,
    pub ymax: i64,
    pub data: &'a Image<f32>,
    pub weights: Option<&'a Image<f32>>,
    pub pixmap: &'a Pixmap,
    pub output_data: &'a mut Image<f32>,
    pub output_counts: &'a mut Image<f32>,
    pub output_context: Option<&'a mut ContextImage>,
    /// Source rows the scanner skipped entirely.
    pub nskip: u64,
    /// Source pixels that contributed nothing to the output.
    pub nmiss: u64,
}

impl<'a> ResampleParams<'a> {
    /// A bundle with unit scales, the square kernel, and the full
    /// source image as the region of interest.
    pub fn new(
        data: &'a Image<f32>,
        pixmap: &'a Pixmap,
        output_data: &'a mut Image<f32>,
        output_counts: &'a mut Image<f32>,
    ) -> ResampleParams<'a> {
        let (xsize, ysize) = data.size();
        ResampleParams {
            kernel: Kernel::Square,
            uuid: 1,
            scale: 1.0,
            pixel_fraction: 1.0,
            weight_scale: 1.0,
            xmin: 0,
            xmax: xsize as i64 - 1,
            ymin: 0,
            ymax: ysize as i64 - 1,
            data,
            weights: None,
            pixmap,
            output_data,
            output_counts,
            output_context: None,
            nskip: 0,
            nmiss: 0,
        }
    }
}
