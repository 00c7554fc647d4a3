//! OpenCV filters.
//!
//! Every filter copies the frame into an RGB [`Mat`], runs one or two
//! OpenCV calls and copies the result back out as an RGB
//! [`ProcessedImage`]. Parameters are the classic OpenCV sample values.

use std::f64::consts::PI;

use cvcam_core::processor::to_rgb;
use cvcam_core::{FilterRegistry, Frame, ProcessError, ProcessedImage};
use opencv::core::{
    self, Mat, Point, Point2f, Scalar, Size, Vec2f, Vec3f, Vec4i, Vector, CV_8UC3,
};
use opencv::prelude::*;
use opencv::{imgproc, video};
use tracing::trace;

pub const OPERATIONS: [&str; 11] = [
    "canny",
    "erode",
    "dilate",
    "open",
    "close",
    "adaptiveThresh",
    "noiseFilter",
    "houghLinesProbabilistic",
    "houghLinesStandard",
    "houghCircles",
    "opticalFlowPyrLK",
];

/// Register the OpenCV filter set on `registry`.
pub fn register_all(registry: &mut FilterRegistry) {
    registry.register("canny", |f: &Frame| run(f, canny));
    registry.register("erode", |f: &Frame| run(f, |m| morph(m, imgproc::MORPH_ERODE, 2)));
    registry.register("dilate", |f: &Frame| run(f, |m| morph(m, imgproc::MORPH_DILATE, 2)));
    registry.register("open", |f: &Frame| run(f, |m| morph(m, imgproc::MORPH_OPEN, 1)));
    registry.register("close", |f: &Frame| run(f, |m| morph(m, imgproc::MORPH_CLOSE, 1)));
    registry.register("adaptiveThresh", |f: &Frame| run(f, adaptive_thresh));
    registry.register("noiseFilter", |f: &Frame| run(f, noise_filter));
    registry.register("houghLinesProbabilistic", |f: &Frame| run(f, hough_lines_probabilistic));
    registry.register("houghLinesStandard", |f: &Frame| run(f, hough_lines_standard));
    registry.register("houghCircles", |f: &Frame| run(f, hough_circles));
    registry.register("opticalFlowPyrLK", OpticalFlowPyrLk::default());
}

fn run(
    frame: &Frame,
    op: impl FnOnce(&Mat) -> opencv::Result<Mat>,
) -> Result<ProcessedImage, ProcessError> {
    let rgb = rgb_mat(frame).map_err(ProcessError::processing)?;
    let out = op(&rgb).map_err(ProcessError::processing)?;
    into_image(&out).map_err(ProcessError::processing)
}

fn rgb_mat(frame: &Frame) -> opencv::Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height as i32,
        frame.width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(&to_rgb(frame));
    Ok(mat)
}

fn gray(rgb: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::cvt_color_def(rgb, &mut out, imgproc::COLOR_RGB2GRAY)?;
    Ok(out)
}

fn into_image(mat: &Mat) -> opencv::Result<ProcessedImage> {
    let rgb = if mat.channels() == 1 {
        let mut out = Mat::default();
        imgproc::cvt_color_def(mat, &mut out, imgproc::COLOR_GRAY2RGB)?;
        out
    } else {
        mat.try_clone()?
    };
    let size = rgb.size()?;
    Ok(ProcessedImage::rgb(
        size.width as u32,
        size.height as u32,
        rgb.data_bytes()?.to_vec(),
    ))
}

fn edges(gray: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::canny(gray, &mut out, 50.0, 200.0, 3, false)?;
    Ok(out)
}

fn canny(rgb: &Mat) -> opencv::Result<Mat> {
    edges(&gray(rgb)?)
}

fn morph(rgb: &Mat, op: i32, iterations: i32) -> opencv::Result<Mat> {
    let anchor = Point::new(-1, -1);
    let kernel = imgproc::get_structuring_element(imgproc::MORPH_RECT, Size::new(3, 3), anchor)?;
    let mut out = Mat::default();
    imgproc::morphology_ex(
        rgb,
        &mut out,
        op,
        &kernel,
        anchor,
        iterations,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    Ok(out)
}

fn adaptive_thresh(rgb: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::adaptive_threshold(
        &gray(rgb)?,
        &mut out,
        255.0,
        imgproc::ADAPTIVE_THRESH_MEAN_C,
        imgproc::THRESH_BINARY,
        7,
        5.0,
    )?;
    Ok(out)
}

fn noise_filter(rgb: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    imgproc::median_blur(rgb, &mut out, 5)?;
    Ok(out)
}

fn red() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn hough_lines_probabilistic(rgb: &Mat) -> opencv::Result<Mat> {
    let edges = edges(&gray(rgb)?)?;
    let mut lines = Vector::<Vec4i>::new();
    imgproc::hough_lines_p(&edges, &mut lines, 1.0, PI / 180.0, 80, 30.0, 10.0)?;

    let mut out = rgb.try_clone()?;
    for l in lines.iter() {
        imgproc::line(
            &mut out,
            Point::new(l[0], l[1]),
            Point::new(l[2], l[3]),
            red(),
            3,
            imgproc::LINE_8,
            0,
        )?;
    }
    trace!(lines = lines.len(), "probabilistic hough");
    Ok(out)
}

fn hough_lines_standard(rgb: &Mat) -> opencv::Result<Mat> {
    let edges = edges(&gray(rgb)?)?;
    let mut lines = Vector::<Vec2f>::new();
    imgproc::hough_lines_def(&edges, &mut lines, 1.0, PI / 180.0, 100)?;

    let mut out = rgb.try_clone()?;
    // Only the strongest lines; a busy frame otherwise paints over itself.
    for l in lines.iter().take(100) {
        let (rho, theta) = (l[0] as f64, l[1] as f64);
        let (a, b) = (theta.cos(), theta.sin());
        let (x0, y0) = (a * rho, b * rho);
        let p1 = Point::new((x0 - 1000.0 * b).round() as i32, (y0 + 1000.0 * a).round() as i32);
        let p2 = Point::new((x0 + 1000.0 * b).round() as i32, (y0 - 1000.0 * a).round() as i32);
        imgproc::line(&mut out, p1, p2, red(), 3, imgproc::LINE_8, 0)?;
    }
    Ok(out)
}

fn hough_circles(rgb: &Mat) -> opencv::Result<Mat> {
    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(&gray(rgb)?, &mut blurred, Size::new(9, 9), 2.0)?;

    let mut circles = Vector::<Vec3f>::new();
    imgproc::hough_circles(
        &blurred,
        &mut circles,
        imgproc::HOUGH_GRADIENT,
        2.0,
        blurred.rows() as f64 / 4.0,
        200.0,
        100.0,
        0,
        0,
    )?;

    let mut out = rgb.try_clone()?;
    for c in circles.iter() {
        let center = Point::new(c[0].round() as i32, c[1].round() as i32);
        imgproc::circle(&mut out, center, 3, Scalar::new(0.0, 255.0, 0.0, 0.0), -1, imgproc::LINE_8, 0)?;
        imgproc::circle(&mut out, center, c[2].round() as i32, red(), 3, imgproc::LINE_8, 0)?;
    }
    Ok(out)
}

const MAX_FEATURES: i32 = 400;
/// Re-detect features once fewer than this many are still tracked.
const MIN_TRACKED: usize = 40;

/// Pyramidal Lucas-Kanade tracking of corner features between consecutive
/// frames. Motion vectors are drawn on the current frame.
#[derive(Default)]
pub struct OpticalFlowPyrLk {
    prev_gray: Option<Mat>,
    points: Vector<Point2f>,
}

impl OpticalFlowPyrLk {
    fn track(&mut self, rgb: &Mat) -> opencv::Result<Mat> {
        let gray = gray(rgb)?;
        let mut out = rgb.try_clone()?;

        let prev = match self.prev_gray.take() {
            Some(prev) if prev.size()? == gray.size()? => Some(prev),
            _ => None,
        };

        let mut tracked = Vector::<Point2f>::new();
        if let Some(prev) = prev.filter(|_| !self.points.is_empty()) {
            let mut next = Vector::<Point2f>::new();
            let mut status = Vector::<u8>::new();
            let mut err = Vector::<f32>::new();
            video::calc_optical_flow_pyr_lk_def(
                &prev,
                &gray,
                &self.points,
                &mut next,
                &mut status,
                &mut err,
            )?;

            for i in 0..next.len() {
                if status.get(i)? == 0 {
                    continue;
                }
                let (from, to) = (self.points.get(i)?, next.get(i)?);
                let to_px = Point::new(to.x.round() as i32, to.y.round() as i32);
                imgproc::line(
                    &mut out,
                    Point::new(from.x.round() as i32, from.y.round() as i32),
                    to_px,
                    red(),
                    2,
                    imgproc::LINE_8,
                    0,
                )?;
                imgproc::circle(&mut out, to_px, 2, Scalar::new(0.0, 255.0, 0.0, 0.0), -1, imgproc::LINE_8, 0)?;
                tracked.push(to);
            }
        }

        if tracked.len() < MIN_TRACKED {
            tracked.clear();
            imgproc::good_features_to_track_def(&gray, &mut tracked, MAX_FEATURES, 0.01, 10.0)?;
        }
        trace!(points = tracked.len(), "optical flow");

        self.points = tracked;
        self.prev_gray = Some(gray);
        Ok(out)
    }
}

impl cvcam_core::Filter for OpticalFlowPyrLk {
    fn apply(&mut self, frame: &Frame) -> Result<ProcessedImage, ProcessError> {
        run(frame, |rgb| self.track(rgb))
    }
}
