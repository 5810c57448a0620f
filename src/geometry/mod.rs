//! Geometry primitives shared by the raster and vector code.
//!
//! - [`GeoTransform`]: affine pixel ↔ world mapping of a raster grid
//! - [`BoundingBox`]: axis-aligned extent in some CRS
//! - [`projection`]: EPSG lookups and point transforms via `proj4rs`

pub mod projection;

/// Affine transform from pixel space to world space.
///
/// Coefficients follow the usual six-term layout:
///
/// ```text
/// x_world = origin_x + col * pixel_width  + row * row_rotation
/// y_world = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with the top-left corner at (`origin_x`, `origin_y`).
    #[must_use]
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Build from GeoTIFF `ModelPixelScale` and `ModelTiepoint` tags.
    ///
    /// The tiepoint ties raster position (I, J) to world (X, Y).
    #[must_use]
    pub fn from_scale_tiepoint(scale: [f64; 3], tiepoint: [f64; 6]) -> Self {
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Self {
            origin_x,
            pixel_width: scale[0],
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -scale[1],
        }
    }

    /// Build from the 4x4 row-major GeoTIFF `ModelTransformation` matrix.
    #[must_use]
    pub fn from_model_transformation(m: &[f64; 16]) -> Self {
        Self {
            origin_x: m[3],
            pixel_width: m[0],
            row_rotation: m[1],
            origin_y: m[7],
            col_rotation: m[4],
            pixel_height: m[5],
        }
    }

    /// Whether the grid is axis aligned with rows running north to south.
    #[inline]
    #[must_use]
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0 && self.pixel_height < 0.0
    }

    /// The 4x4 `ModelTransformation` matrix for this transform.
    #[must_use]
    pub fn to_model_transformation(&self) -> [f64; 16] {
        [
            self.pixel_width, self.row_rotation, 0.0, self.origin_x,
            self.col_rotation, self.pixel_height, 0.0, self.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    /// World coordinate of a (fractional) pixel position.
    #[inline]
    #[must_use]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// World coordinate of the centre of pixel (`col`, `row`).
    #[inline]
    #[must_use]
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        // Allow precision loss: raster dimensions are far below 2^52
        #[allow(clippy::cast_precision_loss)]
        let (c, r) = (col as f64 + 0.5, row as f64 + 0.5);
        self.pixel_to_world(c, r)
    }

    /// Inverse of the affine transform, `None` when it is degenerate.
    #[must_use]
    pub fn invert(&self) -> Option<InverseGeoTransform> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(InverseGeoTransform {
            forward: *self,
            inv_det: 1.0 / det,
        })
    }

    /// Extent of a `width` x `height` grid under this transform.
    #[must_use]
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(w, 0.0),
            self.pixel_to_world(0.0, h),
            self.pixel_to_world(w, h),
        ];
        let mut bbox = BoundingBox::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            bbox.minx = bbox.minx.min(x);
            bbox.miny = bbox.miny.min(y);
            bbox.maxx = bbox.maxx.max(x);
            bbox.maxy = bbox.maxy.max(y);
        }
        bbox
    }
}

/// Precomputed world → pixel mapping for a [`GeoTransform`].
#[derive(Debug, Clone, Copy)]
pub struct InverseGeoTransform {
    forward: GeoTransform,
    inv_det: f64,
}

impl InverseGeoTransform {
    /// Fractional (col, row) of a world coordinate. Pixel centres sit at `.5`.
    #[inline]
    #[must_use]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let t = &self.forward;
        let dx = x - t.origin_x;
        let dy = y - t.origin_y;
        let col = (t.pixel_height * dx - t.row_rotation * dy) * self.inv_det;
        let row = (t.pixel_width * dy - t.col_rotation * dx) * self.inv_det;
        (col, row)
    }
}

/// Bounding box in a coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self { minx, miny, maxx, maxy }
    }

    /// Whether the two boxes share any area.
    #[must_use]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.minx < other.maxx && other.minx < self.maxx && self.miny < other.maxy && other.miny < self.maxy
    }
}
