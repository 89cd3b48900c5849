pub mod bounding_box;
pub mod component_extractor;
pub mod edge_detector;
pub mod feature_scorer;
pub mod frame;
pub mod location_history;
pub mod measurement;
pub mod motion_cache;
pub mod pixel;
pub mod prefilter;
pub mod sample_map;
pub mod species;
pub mod suppression;
