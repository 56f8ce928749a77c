// Copyright (c) the Drizzle Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use drizzle::{ContextImage, Error, Image, Kernel, Pixmap, ResampleParams, Result, resample};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use test_log::test;

fn image_from(values: &[&[f32]]) -> Result<Image<f32>> {
    let h = values.len();
    let w = values[0].len();
    let mut image = Image::new(w, h)?;
    for (y, row) in values.iter().enumerate() {
        image.row_mut(y).copy_from_slice(row);
    }
    Ok(image)
}

/// Total flux on the output grid; the running mean times the total
/// weight recovers the accumulated flux per pixel.
fn flux_sum(data: &Image<f32>, counts: &Image<f32>) -> f64 {
    let (w, h) = data.size();
    let mut sum = 0.0;
    for y in 0..h {
        for x in 0..w {
            sum += f64::from(data.get(x, y)) * f64::from(counts.get(x, y));
        }
    }
    sum
}

#[test]
fn point_kernel_identity() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]])?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    resample(&mut p)?;
    assert_eq!(p.nskip, 0);
    assert_eq!(p.nmiss, 0);

    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(output_counts.get(x, y), 1.0);
            assert_eq!(output_data.get(x, y), data.get(x, y));
        }
    }
    Ok(())
}

#[test]
fn turbo_kernel_identity_half_pixfrac() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]])?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Turbo;
    p.pixel_fraction = 0.5;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 0);

    // The shrunken box covers a quarter of the pixel, and the
    // pixel-fraction area factor scales the weight back to one.
    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(output_counts.get(x, y), 1.0);
            assert_eq!(output_data.get(x, y), data.get(x, y));
        }
    }
    Ok(())
}

#[test]
fn point_kernel_half_pixel_shift() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]])?;
    // Half-integer destinations round away from zero, so column i lands
    // on column i + 1.
    let pixmap = Pixmap::from_fn(3, 3, |i, j| [i as f64 + 0.5, j as f64])?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    resample(&mut p)?;
    // Source column 2 lands off the image.
    assert_eq!(p.nmiss, 3);

    for y in 0..3 {
        assert_eq!(output_counts.get(0, y), 0.0);
        assert_eq!(output_data.get(0, y), 0.0);
        for x in 0..2 {
            assert_eq!(output_counts.get(x + 1, y), 1.0);
            assert_eq!(output_data.get(x + 1, y), data.get(x, y));
        }
    }
    Ok(())
}

#[test]
fn square_kernel_identity_conserves_flux() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]])?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Square;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 0);

    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(output_counts.get(x, y), 1.0);
            assert_eq!(output_data.get(x, y), data.get(x, y));
        }
    }
    assert!((flux_sum(&output_data, &output_counts) - 45.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn square_kernel_rotated_single_pixel() -> Result<()> {
    // Rotation by 45 degrees about the image center.
    let c = std::f64::consts::FRAC_1_SQRT_2;
    let mut data = Image::new(3, 3)?;
    data.set(1, 1, 7.0);
    let pixmap = Pixmap::from_fn(3, 3, |i, j| {
        let dx = i as f64 - 1.0;
        let dy = j as f64 - 1.0;
        [c * dx - c * dy + 1.0, c * dx + c * dy + 1.0]
    })?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Square;
    p.xmin = 1;
    p.xmax = 1;
    p.ymin = 1;
    p.ymax = 1;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 0);

    // The rotated unit square overlaps the center cell and its four
    // neighbors; everything it covers stays on the image.
    assert!((flux_sum(&output_data, &output_counts) - 7.0).abs() < 1e-4);
    let positive = (0..3)
        .flat_map(|y| (0..3).map(move |x| (x, y)))
        .filter(|&(x, y)| output_counts.get(x, y) > 0.0)
        .count();
    assert!((1..=5).contains(&positive));
    assert!((f64::from(output_counts.get(1, 1)) - 0.828_427).abs() < 1e-3);
    Ok(())
}

#[test]
fn off_image_map_is_all_misses() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]])?;
    let pixmap = Pixmap::from_fn(3, 3, |_, _| [-1.0, -1.0])?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 9);
    assert_eq!(p.nskip, 3);

    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(output_counts.get(x, y), 0.0);
            assert_eq!(output_data.get(x, y), 0.0);
        }
    }
    Ok(())
}

#[test]
fn unmappable_pixels_are_misses() -> Result<()> {
    let data = Image::new_with_value(5, 5, 2.0)?;
    // One bad map entry, far enough from the image corners that the
    // footprint outline stays mappable.
    let mut pixmap = Pixmap::identity(5, 5)?;
    pixmap.set(2, 2, [f64::NAN, 2.0]);
    let mut output_data = Image::new(5, 5)?;
    let mut output_counts = Image::new(5, 5)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 1);

    assert_eq!(output_counts.get(2, 2), 0.0);
    assert_eq!(output_counts.get(0, 0), 1.0);
    assert_eq!(output_counts.get(4, 4), 1.0);
    Ok(())
}

#[test]
fn context_planes_record_contributors() -> Result<()> {
    let data = Image::new_with_value(3, 3, 1.0)?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;
    let mut ctx = ContextImage::new(2, 3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    p.uuid = 1;
    p.output_context = Some(&mut ctx);
    resample(&mut p)?;
    drop(p);

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    p.uuid = 33;
    p.output_context = Some(&mut ctx);
    resample(&mut p)?;
    drop(p);

    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(ctx.get(0, x, y), 1);
            assert_eq!(ctx.get(1, x, y), 1);
        }
    }
    Ok(())
}

#[test]
fn zero_weight_leaves_no_trace() -> Result<()> {
    let data = Image::new_with_value(3, 3, 5.0)?;
    let mut weights = Image::new_with_value(3, 3, 1.0)?;
    weights.set(1, 1, 0.0);
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;
    let mut ctx = ContextImage::new(1, 3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    p.weights = Some(&weights);
    p.output_context = Some(&mut ctx);
    resample(&mut p)?;
    // A zero-weight pixel is processed, not missed; it just deposits
    // nothing.
    assert_eq!(p.nmiss, 0);
    drop(p);

    assert_eq!(output_counts.get(1, 1), 0.0);
    assert_eq!(output_data.get(1, 1), 0.0);
    assert_eq!(ctx.get(0, 1, 1), 0);
    assert_eq!(output_counts.get(0, 0), 1.0);
    assert_eq!(ctx.get(0, 0, 0), 1);
    Ok(())
}

#[test]
fn repeated_runs_accumulate_weight() -> Result<()> {
    let n = 4;
    let mut rng = XorShiftRng::seed_from_u64(0);
    let mut data = Image::new(n, n)?;
    let mut weights = Image::new(n, n)?;
    for y in 0..n {
        for x in 0..n {
            data.set(x, y, rng.random_range(0.0..10.0f32));
            weights.set(x, y, rng.random_range(0.5..1.5f32));
        }
    }
    let pixmap = Pixmap::identity(n, n)?;
    let mut output_data = Image::new(n, n)?;
    let mut output_counts = Image::new(n, n)?;

    for _ in 0..2 {
        let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
        p.kernel = Kernel::Turbo;
        p.weights = Some(&weights);
        resample(&mut p)?;
    }

    // Merging a pixel with itself leaves the mean in place and doubles
    // the weight.
    for y in 0..n {
        for x in 0..n {
            assert_eq!(output_data.get(x, y), data.get(x, y));
            assert_eq!(output_counts.get(x, y), 2.0 * weights.get(x, y));
        }
    }
    Ok(())
}

#[test]
fn point_kernel_applies_scale() -> Result<()> {
    let data = image_from(&[&[1.0, 2.0], &[3.0, 4.0]])?;
    let pixmap = Pixmap::identity(2, 2)?;
    let mut output_data = Image::new(2, 2)?;
    let mut output_counts = Image::new(2, 2)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    p.scale = 2.0;
    resample(&mut p)?;

    for y in 0..2 {
        for x in 0..2 {
            assert_eq!(output_counts.get(x, y), 1.0);
            assert_eq!(output_data.get(x, y), 4.0 * data.get(x, y));
        }
    }
    Ok(())
}

#[test]
fn gaussian_kernel_single_pixel() -> Result<()> {
    let mut data = Image::new(5, 5)?;
    data.set(2, 2, 4.0);
    let pixmap = Pixmap::identity(5, 5)?;
    let mut output_data = Image::new(5, 5)?;
    let mut output_counts = Image::new(5, 5)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Gaussian;
    p.xmin = 2;
    p.xmax = 2;
    p.ymin = 2;
    p.ymax = 2;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 0);

    // Peak weight of the normalized Gaussian at zero offset.
    let es = 2.3548 * 2.3548 / 2.0 / std::f64::consts::PI;
    assert!((f64::from(output_counts.get(2, 2)) - es).abs() < 1e-4);
    // Every pixel the Gaussian touches was fed by the same source
    // pixel, so the running mean is exactly its flux.
    assert_eq!(output_data.get(2, 2), 4.0);
    assert_eq!(output_data.get(2, 1), 4.0);
    assert!(output_counts.get(2, 1) > 0.0);
    assert!(output_counts.get(2, 1) < output_counts.get(2, 2));
    Ok(())
}

#[test]
fn lanczos2_kernel_single_pixel() -> Result<()> {
    let mut data = Image::new(5, 5)?;
    data.set(2, 2, 3.0);
    let pixmap = Pixmap::identity(5, 5)?;
    let mut output_data = Image::new(5, 5)?;
    let mut output_counts = Image::new(5, 5)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Lanczos2;
    p.xmin = 2;
    p.xmax = 2;
    p.ymin = 2;
    p.ymax = 2;
    resample(&mut p)?;
    assert_eq!(p.nmiss, 0);

    // Nearly unit weight at zero offset, and the negative first lobe
    // one pixel out.
    assert!((f64::from(output_counts.get(2, 2)) - 1.0).abs() < 1e-3);
    assert!(output_counts.get(2, 1) < 0.0);
    assert_eq!(output_data.get(2, 2), 3.0);
    Ok(())
}

#[test]
fn oob_counts_store_is_fatal() -> Result<()> {
    let data = Image::new_with_value(3, 3, 1.0)?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(2, 2)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    let err = resample(&mut p).unwrap_err();
    assert!(matches!(err, Error::OutputCountsOutOfBounds(2, 0)));
    assert_eq!(err.to_string(), "OOB in output_counts[2,0]");
    Ok(())
}

#[test]
fn destination_smaller_than_source() -> Result<()> {
    // A 5x5 input on a 3x3 output: the scanner trims the ROI to the
    // rows and columns that can land on the output.
    let data = Image::new_with_value(5, 5, 1.0)?;
    let pixmap = Pixmap::identity(5, 5)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    resample(&mut p)?;
    assert_eq!(p.nskip, 2);
    assert_eq!(p.nmiss, 16);

    for y in 0..3 {
        for x in 0..3 {
            assert_eq!(output_counts.get(x, y), 1.0);
        }
    }
    Ok(())
}

#[test]
fn context_plane_count_is_validated() -> Result<()> {
    let data = Image::new_with_value(3, 3, 1.0)?;
    let pixmap = Pixmap::identity(3, 3)?;
    let mut output_data = Image::new(3, 3)?;
    let mut output_counts = Image::new(3, 3)?;
    let mut ctx = ContextImage::new(1, 3, 3)?;

    let mut p = ResampleParams::new(&data, &pixmap, &mut output_data, &mut output_counts);
    p.kernel = Kernel::Point;
    p.uuid = 33;
    p.output_context = Some(&mut ctx);
    assert!(matches!(
        resample(&mut p),
        Err(Error::ContextPlaneOutOfRange(1, 33, 1))
    ));
    Ok(())
}
