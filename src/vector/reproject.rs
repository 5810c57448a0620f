//! Reproject a vector layer to WGS84 and draw random subsets.

use std::collections::HashSet;

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{VectorError, VectorLayer};
use crate::geometry::projection::{CrsTransformer, WGS84};

/// Seed used by [`subset_layer`] when none is given.
pub const DEFAULT_SUBSET_SEED: u64 = 42;

/// Options for [`reproject_layer`].
#[derive(Debug, Clone, Default)]
pub struct ReprojectOptions {
    /// Seed of the `name` identifiers; `None` draws from OS entropy
    pub id_seed: Option<u64>,
}

/// Transform every geometry to EPSG:4326 and add `lat`, `lon` and `name` properties.
///
/// `lat`/`lon` come from the reprojected point, or the vertex mean of other
/// geometries; features without geometry get nulls. `name` is a random UUID,
/// unique within the layer.
///
/// # Errors
/// Returns an error if the layer's CRS is unknown or a coordinate cannot be transformed.
pub fn reproject_layer(mut layer: VectorLayer, options: &ReprojectOptions) -> Result<VectorLayer, VectorError> {
    let transformer = CrsTransformer::new(layer.epsg, WGS84).map_err(VectorError::Transformer)?;
    let mut rng = match options.id_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut names = HashSet::with_capacity(layer.len());

    for (i, feature) in layer.features.iter_mut().enumerate() {
        let representative = match feature.geometry.as_mut() {
            Some(geometry) => {
                geometry
                    .try_map_positions(|p| {
                        if p.len() < 2 {
                            return Err(format!("position has {} coordinates", p.len()));
                        }
                        let (x, y) = transformer.transform(p[0], p[1])?;
                        p[0] = x;
                        p[1] = y;
                        Ok(())
                    })
                    .map_err(|message| VectorError::Reprojection { feature: i, message })?;
                geometry.representative_point()
            }
            None => None,
        };

        let (lat, lon) = representative.map_or((Value::Null, Value::Null), |(x, y)| (Value::from(y), Value::from(x)));
        feature.properties.insert("lat".to_string(), lat);
        feature.properties.insert("lon".to_string(), lon);
        feature
            .properties
            .insert("name".to_string(), Value::String(unique_id(&mut rng, &mut names)));
    }

    info!(
        source_epsg = layer.epsg,
        features = layer.len(),
        "Reprojected layer to EPSG:4326"
    );
    layer.epsg = WGS84;
    Ok(layer)
}

fn unique_id(rng: &mut ChaCha8Rng, seen: &mut HashSet<Uuid>) -> String {
    loop {
        let id = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
        if seen.insert(id) {
            return id.to_string();
        }
    }
}

/// Keep `n` features sampled without replacement, in their original layer order.
///
/// # Errors
/// Returns [`VectorError::SubsetTooLarge`] if `n` exceeds the number of features.
pub fn subset_layer(layer: VectorLayer, n: usize, seed: u64) -> Result<VectorLayer, VectorError> {
    let available = layer.len();
    if n > available {
        return Err(VectorError::SubsetTooLarge { requested: n, available });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut keep = vec![false; available];
    for i in index::sample(&mut rng, available, n).into_vec() {
        keep[i] = true;
    }

    let features = layer
        .features
        .into_iter()
        .zip(keep)
        .filter_map(|(f, k)| k.then_some(f))
        .collect();
    Ok(VectorLayer::new(layer.epsg, features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Feature, Geometry};
    use serde_json::{json, Map};

    fn utm_points(n: usize) -> VectorLayer {
        let features = (0..n)
            .map(|i| {
                let mut props = Map::new();
                props.insert("idx".into(), json!(i));
                #[allow(clippy::cast_precision_loss)]
                let offset = i as f64 * 100.0;
                Feature::new(Geometry::Point(vec![500_000.0 + offset, 3_000_000.0 + offset]), props)
            })
            .collect();
        VectorLayer::new(32644, features)
    }

    #[test]
    fn test_reprojects_points_and_adds_lat_lon() {
        let layer = reproject_layer(utm_points(3), &ReprojectOptions { id_seed: Some(1) }).unwrap();
        assert_eq!(layer.epsg, 4326);
        for feature in &layer.features {
            let Some(Geometry::Point(p)) = &feature.geometry else {
                panic!("expected a point");
            };
            assert_eq!(feature.properties["lon"], json!(p[0]));
            assert_eq!(feature.properties["lat"], json!(p[1]));
            assert!(p[0] > 80.0 && p[0] < 82.0);
        }
    }

    #[test]
    fn test_polygon_uses_vertex_mean() {
        let square = Geometry::Polygon(vec![vec![
            vec![80.0, 20.0],
            vec![82.0, 20.0],
            vec![82.0, 22.0],
            vec![80.0, 22.0],
        ]]);
        let layer = VectorLayer::new(4326, vec![Feature::new(square, Map::new())]);
        let out = reproject_layer(layer, &ReprojectOptions::default()).unwrap();
        assert_eq!(out.features[0].properties["lon"], json!(81.0));
        assert_eq!(out.features[0].properties["lat"], json!(21.0));
    }

    #[test]
    fn test_ids_are_unique_and_seeded() {
        let a = reproject_layer(utm_points(50), &ReprojectOptions { id_seed: Some(7) }).unwrap();
        let b = reproject_layer(utm_points(50), &ReprojectOptions { id_seed: Some(7) }).unwrap();
        let names: HashSet<&str> = a.features.iter().filter_map(|f| f.properties["name"].as_str()).collect();
        assert_eq!(names.len(), 50);
        assert_eq!(a.features[10].properties["name"], b.features[10].properties["name"]);
        assert!(Uuid::parse_str(a.features[0].properties["name"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_feature_without_geometry() {
        let layer = VectorLayer::new(
            32644,
            vec![Feature {
                id: None,
                geometry: None,
                properties: Map::new(),
            }],
        );
        let out = reproject_layer(layer, &ReprojectOptions::default()).unwrap();
        assert_eq!(out.features[0].properties["lat"], Value::Null);
        assert!(out.features[0].properties["name"].is_string());
    }

    #[test]
    fn test_unknown_crs() {
        let layer = VectorLayer::new(99999, vec![]);
        assert!(matches!(
            reproject_layer(layer, &ReprojectOptions::default()),
            Err(VectorError::Transformer(_))
        ));
    }

    #[test]
    fn test_subset_keeps_order_and_size() {
        let subset = subset_layer(utm_points(100), 20, DEFAULT_SUBSET_SEED).unwrap();
        assert_eq!(subset.len(), 20);
        let idx: Vec<u64> = subset.features.iter().filter_map(|f| f.properties["idx"].as_u64()).collect();
        assert!(idx.windows(2).all(|w| w[0] < w[1]));

        let again = subset_layer(utm_points(100), 20, DEFAULT_SUBSET_SEED).unwrap();
        assert_eq!(subset, again);
    }

    #[test]
    fn test_subset_too_large() {
        assert!(matches!(
            subset_layer(utm_points(5), 6, 0),
            Err(VectorError::SubsetTooLarge { requested: 6, available: 5 })
        ));
        assert_eq!(subset_layer(utm_points(5), 5, 0).unwrap().len(), 5);
    }
}
