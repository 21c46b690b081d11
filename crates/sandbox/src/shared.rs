//! Shared libraries that modules may request at submission.

use serde::{Deserialize, Serialize};

use crate::context::{Color, Surface};

/// Minimal perspective renderer drawing flat-shaded triangles onto the
/// instance surface.
#[derive(Debug, Clone)]
pub struct Renderer3d {
    /// Camera position.
    pub eye: [f64; 3],
    /// Vertical field of view in degrees.
    pub fov_deg: f64,
    /// Points closer than this to the camera are culled.
    pub near: f64,
}

impl Default for Renderer3d {
    fn default() -> Self {
        Self {
            eye: [0.0, 0.0, -5.0],
            fov_deg: 60.0,
            near: 0.1,
        }
    }
}

impl Renderer3d {
    /// Project a world-space point to surface pixels. The camera looks down +z.
    pub fn project(&self, point: [f64; 3], width: u32, height: u32) -> Option<(f64, f64)> {
        let z = point[2] - self.eye[2];
        if z < self.near {
            return None;
        }
        let focal = (height as f64 / 2.0) / (self.fov_deg.to_radians() / 2.0).tan();
        let x = (point[0] - self.eye[0]) * focal / z + width as f64 / 2.0;
        let y = height as f64 / 2.0 - (point[1] - self.eye[1]) * focal / z;
        Some((x, y))
    }

    /// Draw an indexed triangle mesh. Triangles with a culled vertex or an
    /// out-of-range index are skipped.
    pub fn draw_mesh(
        &self,
        surface: &mut Surface,
        vertices: &[[f64; 3]],
        triangles: &[[usize; 3]],
        color: Color,
    ) -> usize {
        let (width, height) = (surface.width(), surface.height());
        let mut drawn = 0;
        for tri in triangles {
            let points: Option<Vec<(f64, f64)>> = tri
                .iter()
                .map(|&i| {
                    vertices
                        .get(i)
                        .and_then(|v| self.project(*v, width, height))
                })
                .collect();
            if let Some(points) = points {
                surface.polygon(points, color);
                drawn += 1;
            }
        }
        drawn
    }
}

/// Axis-aligned rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Body {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub w: f64,
    pub h: f64,
}

impl Body {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x,
            y,
            w,
            h,
            ..Default::default()
        }
    }
}

/// Small 2D physics helper: integration, overlap tests, bounds.
#[derive(Debug, Clone, Copy)]
pub struct Physics2d {
    /// Acceleration in pixels per second squared.
    pub gravity: (f64, f64),
}

impl Default for Physics2d {
    fn default() -> Self {
        Self {
            gravity: (0.0, 980.0),
        }
    }
}

impl Physics2d {
    /// Semi-implicit Euler step over `dt_ms`.
    pub fn integrate(&self, body: &mut Body, dt_ms: f64) {
        let dt = dt_ms / 1000.0;
        body.vx += self.gravity.0 * dt;
        body.vy += self.gravity.1 * dt;
        body.x += body.vx * dt;
        body.y += body.vy * dt;
    }

    pub fn overlaps(a: &Body, b: &Body) -> bool {
        a.x < b.x + b.w && b.x < a.x + a.w && a.y < b.y + b.h && b.y < a.y + a.h
    }

    /// Keep a body inside `[0, width] x [0, height]`, zeroing velocity on
    /// the clamped axis. Returns whether it touched the floor.
    pub fn clamp_to(body: &mut Body, width: f64, height: f64) -> bool {
        if body.x < 0.0 {
            body.x = 0.0;
            body.vx = 0.0;
        } else if body.x + body.w > width {
            body.x = width - body.w;
            body.vx = 0.0;
        }
        if body.y < 0.0 {
            body.y = 0.0;
            body.vy = 0.0;
        } else if body.y + body.h > height {
            body.y = height - body.h;
            body.vy = 0.0;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_centre_and_culling() {
        let r = Renderer3d::default();
        let (x, y) = r.project([0.0, 0.0, 0.0], 800, 600).unwrap();
        assert!((x - 400.0).abs() < 1e-9);
        assert!((y - 300.0).abs() < 1e-9);
        assert!(r.project([0.0, 0.0, -5.0], 800, 600).is_none());
    }

    #[test]
    fn test_integrate_and_floor() {
        let physics = Physics2d::default();
        let mut body = Body::new(10.0, 0.0, 4.0, 4.0);
        for _ in 0..100 {
            physics.integrate(&mut body, 16.0);
        }
        assert!(body.y > 100.0);
        assert!(Physics2d::clamp_to(&mut body, 200.0, 100.0));
        assert_eq!(body.y, 96.0);
        assert_eq!(body.vy, 0.0);
    }

    #[test]
    fn test_overlap() {
        let a = Body::new(0.0, 0.0, 10.0, 10.0);
        let b = Body::new(5.0, 5.0, 10.0, 10.0);
        let c = Body::new(10.0, 0.0, 5.0, 5.0);
        assert!(Physics2d::overlaps(&a, &b));
        assert!(!Physics2d::overlaps(&a, &c));
    }
}
