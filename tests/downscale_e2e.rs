//! End-to-end tests through real GeoTIFF and GeoJSON files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use serde_json::{json, Map};

use geodownscale::vector::{
    read_geojson, reproject_layer, subset_layer, write_geojson, Feature, Geometry, ReprojectOptions, VectorLayer,
    DEFAULT_SUBSET_SEED,
};
use geodownscale::{
    downscale, read_geotiff, DiscoveryError, DownscaleError, Downscaler, FittedModel, GeoTiffCompression,
    GeoTransform, ModelError, RasterGrid, RasterProfile, Regressor, SampleType,
};

struct Workspace {
    root: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!("geodownscale-e2e-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("predictors")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        Self { root }
    }

    fn predictors(&self) -> PathBuf {
        self.root.join("predictors")
    }

    fn target(&self) -> PathBuf {
        self.root.join("target").join("smap.tif")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn profile(width: usize, height: usize) -> RasterProfile {
    RasterProfile {
        width,
        height,
        transform: GeoTransform::north_up(500_000.0, 3_000_000.0, 1_000.0, 1_000.0),
        crs: Some(32644),
        nodata: Some(-9999.0),
        sample_type: SampleType::F32,
        compression: GeoTiffCompression::Lzw,
    }
}

fn write_raster(path: &Path, data: Array2<f64>) {
    let (h, w) = data.dim();
    RasterGrid::new(data, profile(w, h)).unwrap().write_geotiff(path).unwrap();
}

/// Predicts predictor 0 unchanged.
struct PassThrough;

impl Regressor for PassThrough {
    type Model = PassThrough;

    fn fit(&self, features: ArrayView2<'_, f64>, target: ArrayView1<'_, f64>) -> Result<PassThrough, ModelError> {
        geodownscale::model::check_training_data(features, target)?;
        Ok(PassThrough)
    }
}

impl FittedModel for PassThrough {
    fn n_features(&self) -> usize {
        1
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        Ok(features.column(0).to_owned())
    }
}

#[test]
fn test_two_by_two_scenario() {
    let ws = Workspace::new("2x2");
    write_raster(&ws.target(), array![[1.0, 2.0], [3.0, 4.0]]);
    write_raster(&ws.predictors().join("ones.tif"), Array2::ones((2, 2)));

    let output = Downscaler::new(ws.predictors(), ws.target()).trees(10).run().unwrap();

    assert_eq!(output.raster.shape(), (2, 2));
    assert_eq!(output.output_path, ws.root.join("target").join("downscaled.tif"));
    assert_eq!(output.predictor_paths, vec![ws.predictors().join("ones.tif")]);
    assert_eq!(output.holdout.len(), 1, "floor(0.8 * 4) = 3 training rows");
    for v in output.raster.data() {
        assert!((1.0..=4.0).contains(v), "prediction {v} outside target range");
    }

    let written = read_geotiff(&output.output_path).unwrap();
    let target = read_geotiff(ws.target()).unwrap();
    assert_eq!(written.profile().transform, target.profile().transform);
    assert_eq!(written.profile().crs, Some(32644));
    assert_eq!(written.profile().nodata, Some(-9999.0));
    assert_eq!(written.profile().compression, GeoTiffCompression::Lzw);
    assert_eq!(written.shape(), (2, 2));
}

#[test]
fn test_row_order_survives_pass_through_model() {
    let ws = Workspace::new("row-order");
    let values = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as f64);
    write_raster(&ws.target(), values.clone());
    write_raster(&ws.predictors().join("same.tif"), values.clone());

    let output = Downscaler::new(ws.predictors(), ws.target())
        .with_regressor(PassThrough)
        .run_custom()
        .unwrap();

    assert_eq!(output.raster.data(), &values);
    assert_eq!(read_geotiff(&output.output_path).unwrap().data(), &values);
}

#[test]
fn test_predictors_are_stacked_by_file_name() {
    let ws = Workspace::new("order");
    write_raster(&ws.target(), array![[1.0, 2.0], [3.0, 4.0]]);
    write_raster(&ws.predictors().join("b_slope.tif"), Array2::zeros((2, 2)));
    write_raster(&ws.predictors().join("a_ndvi.TIF"), array![[5.0, 6.0], [7.0, 8.0]]);
    fs::write(ws.predictors().join("notes.txt"), "not a raster").unwrap();

    let output = Downscaler::new(ws.predictors(), ws.target())
        .with_regressor(PassThrough)
        .run_custom()
        .unwrap();

    assert_eq!(
        output.predictor_paths,
        vec![ws.predictors().join("a_ndvi.TIF"), ws.predictors().join("b_slope.tif")]
    );
    // PassThrough echoes predictor_0, which must be a_ndvi
    assert_eq!(output.raster.data(), &array![[5.0, 6.0], [7.0, 8.0]]);
}

#[test]
fn test_runs_are_reproducible() {
    let ws = Workspace::new("repro");
    let target = Array2::from_shape_fn((6, 6), |(r, c)| ((r * 3 + c * 7) % 10) as f64);
    write_raster(&ws.target(), target);
    write_raster(
        &ws.predictors().join("p1.tif"),
        Array2::from_shape_fn((6, 6), |(r, c)| (r + c) as f64),
    );
    write_raster(
        &ws.predictors().join("p2.tif"),
        Array2::from_shape_fn((6, 6), |(r, c)| (r * c) as f64),
    );

    let run = || {
        Downscaler::new(ws.predictors(), ws.target())
            .trees(15)
            .split_seed(123)
            .model_seed(0)
            .run()
            .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.raster.data(), b.raster.data());
    assert_eq!(a.holdout, b.holdout);
}

#[test]
fn test_missing_pixels_are_imputed() {
    let ws = Workspace::new("nodata");
    write_raster(&ws.target(), array![[1.0, f64::NAN], [3.0, 4.0]]);
    write_raster(&ws.predictors().join("p.tif"), array![[f64::NAN, 1.0], [2.0, 3.0]]);

    let result = downscale(ws.predictors(), ws.target()).unwrap();
    assert!(result.iter().all(|v| v.is_finite()));
}

#[test]
fn test_empty_predictor_directory_writes_nothing() {
    let ws = Workspace::new("empty");
    write_raster(&ws.target(), array![[1.0, 2.0], [3.0, 4.0]]);

    let result = Downscaler::new(ws.predictors(), ws.target()).run();
    assert!(matches!(result, Err(DownscaleError::Discovery(DiscoveryError::Empty { .. }))));
    assert!(!ws.root.join("target").join("downscaled.tif").exists());
}

#[test]
fn test_subsetting_scenario() {
    let ws = Workspace::new("subset");
    let features = (0..100)
        .map(|i| {
            let mut props = Map::new();
            props.insert("cell".into(), json!(i));
            let x = 500_000.0 + f64::from(i % 10) * 500.0;
            let y = 3_000_000.0 + f64::from(i / 10) * 500.0;
            Feature::new(Geometry::Point(vec![x, y]), props)
        })
        .collect();
    let input = ws.root.join("grid.geojson");
    write_geojson(&VectorLayer::new(32644, features), &input).unwrap();

    let layer = read_geojson(&input, None).unwrap();
    assert_eq!(layer.epsg, 32644);
    let layer = reproject_layer(layer, &ReprojectOptions { id_seed: Some(1) }).unwrap();
    let subset = subset_layer(layer, 20, DEFAULT_SUBSET_SEED).unwrap();

    let output = ws.root.join("grid_sub.geojson");
    write_geojson(&subset, &output).unwrap();
    let back = read_geojson(&output, None).unwrap();

    assert_eq!(back.epsg, 4326);
    assert_eq!(back.len(), 20);
    let names: HashSet<String> = back
        .features
        .iter()
        .map(|f| f.properties["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 20);

    for f in &back.features {
        let Some(Geometry::Point(p)) = &f.geometry else {
            panic!("expected a point");
        };
        assert_eq!(f.properties["lon"].as_f64(), Some(p[0]));
        assert_eq!(f.properties["lat"].as_f64(), Some(p[1]));
        assert!(p[0] > 80.9 && p[0] < 81.1);
        assert!(p[1] > 27.0 && p[1] < 27.2);
    }

    assert!(subset_layer(back, 21, DEFAULT_SUBSET_SEED).is_err());
}
