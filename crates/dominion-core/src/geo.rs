//! Geo-trace indexing: encoded polyline → ordered H3 cell sequence.
//!
//! Polyline decoding and hexagonal indexing are delegated to the `polyline`
//! and `h3o` crates. This module only fixes the contract around them:
//!
//! - output order follows sample order and is **not** deduplicated, so a
//!   trace that lingers in one cell yields that cell repeatedly;
//! - empty and single-point traces are valid and yield zero or one cell;
//! - the resolution is chosen once, at construction.

use std::collections::HashMap;

use h3o::{LatLng, Resolution};
use tracing::trace;

use crate::defaults::{CELL_RESOLUTION, POLYLINE_PRECISION};
use crate::error::{DecodeError, Error, Result};
use crate::models::{CellId, CellVisit};

/// Maps an encoded geo-trace to grid cells.
pub trait GeoIndexer: Send + Sync {
    /// Decode `polyline` and map every sample to its cell, in sample order.
    fn index(&self, polyline: &str) -> std::result::Result<Vec<CellId>, DecodeError>;

    /// Grid resolution every identifier is produced at.
    fn resolution(&self) -> u8;
}

/// H3 implementation of [`GeoIndexer`].
#[derive(Debug, Clone, Copy)]
pub struct H3Indexer {
    resolution: Resolution,
    precision: u32,
}

impl H3Indexer {
    /// Create an indexer at `resolution` (0..=15).
    pub fn new(resolution: u8) -> Result<Self> {
        let resolution = Resolution::try_from(resolution)
            .map_err(|e| Error::Config(format!("invalid H3 resolution {}: {}", resolution, e)))?;
        Ok(Self {
            resolution,
            precision: POLYLINE_PRECISION,
        })
    }

    /// Override the polyline precision (5 for Google-encoded, 6 for OSRM-style).
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }
}

impl Default for H3Indexer {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
            precision: POLYLINE_PRECISION,
        }
    }
}

impl GeoIndexer for H3Indexer {
    fn index(&self, polyline: &str) -> std::result::Result<Vec<CellId>, DecodeError> {
        let samples = decode_path(polyline, self.precision)?;
        let mut cells = Vec::with_capacity(samples.len());
        for (lat, lng) in samples {
            let point =
                LatLng::new(lat, lng).map_err(|_| DecodeError::InvalidCoordinate { lat, lng })?;
            cells.push(CellId::from(point.to_cell(self.resolution)));
        }
        trace!(
            subsystem = "core",
            component = "geo",
            op = "index",
            cell_count = cells.len(),
            "Indexed polyline"
        );
        Ok(cells)
    }

    fn resolution(&self) -> u8 {
        u8::from(self.resolution)
    }
}

/// Decode an encoded polyline into `(latitude, longitude)` samples.
pub fn decode_path(
    polyline: &str,
    precision: u32,
) -> std::result::Result<Vec<(f64, f64)>, DecodeError> {
    let trimmed = polyline.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let line = polyline::decode_polyline(trimmed, precision)
        .map_err(|e| DecodeError::InvalidPolyline(e.to_string()))?;

    // geo-types coordinates are (x = longitude, y = latitude)
    let samples: Vec<(f64, f64)> = line.0.iter().map(|c| (c.y, c.x)).collect();
    for &(lat, lng) in &samples {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(DecodeError::InvalidCoordinate { lat, lng });
        }
    }
    Ok(samples)
}

/// Collapse a raw cell sequence into per-cell visit counts.
///
/// Each distinct cell appears once, in order of first appearance, with the
/// number of times it occurs in `cells`.
pub fn visit_counts(cells: &[CellId]) -> Vec<CellVisit> {
    let mut index: HashMap<&CellId, usize> = HashMap::with_capacity(cells.len());
    let mut visits: Vec<CellVisit> = Vec::new();
    for cell in cells {
        match index.get(cell) {
            Some(&i) => visits[i].count += 1,
            None => {
                index.insert(cell, visits.len());
                visits.push(CellVisit {
                    cell_id: cell.clone(),
                    count: 1,
                });
            }
        }
    }
    visits
}

/// Default-resolution indexer, matching [`CELL_RESOLUTION`].
pub fn default_indexer() -> Result<H3Indexer> {
    H3Indexer::new(CELL_RESOLUTION)
}
