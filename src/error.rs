// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("OOB in output_data[{0},{1}]")]
    OutputDataOutOfBounds(i64, i64),
    #[error("OOB in output_counts[{0},{1}]")]
    OutputCountsOutOfBounds(i64, i64),
    #[error("Invalid kernel type")]
    InvalidKernelType,
    #[error("Invalid kernel name: {0}")]
    InvalidKernelName(String),
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Shape mismatch: {0} is {1}x{2}, expected {3}x{4}")]
    ShapeMismatch(&'static str, usize, usize, usize, usize),
    #[error("Invalid ROI: x [{0}, {1}], y [{2}, {3}]")]
    InvalidRoi(i64, i64, i64, i64),
    #[error("Invalid image id: {0}")]
    InvalidImageId(i32),
    #[error("Context image has {0} planes, but image id {1} needs plane {2}")]
    ContextPlaneOutOfRange(usize, i32, usize),
}

pub type Result<T> = std::result::Result<T, Error>;
