// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![deny(unsafe_code)]

pub mod error;
pub mod geometry;
pub mod image;
pub mod kernels;
pub mod params;
pub mod pixmap;
pub mod scanner;
pub mod util;

pub use error::{Error, Result};
pub use image::{ContextImage, Image};
pub use kernels::resample;
pub use params::{Kernel, ResampleParams};
pub use pixmap::Pixmap;
