//! Fixed-resolution spatial tiles used as the provider cache key.
//!
//! The plane is partitioned into an equirectangular grid of square degree
//! cells. A [`TileId`] carries its resolution, so ledger records written under
//! one grid can never be mistaken for cells of another.
//!
//! # Binary Format
//!
//! [`TileId::encode`] produces a fixed 12-byte big-endian key:
//! - Bytes 0-3: resolution in micro-degrees
//! - Bytes 4-7: row (south to north)
//! - Bytes 8-11: column (west to east)
//!
//! Big-endian keeps LMDB keys sorted by resolution, then row, then column.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geo::{lng_gap, normalize_lng, Coordinate, EARTH_RADIUS_METERS};

/// Default cell edge in degrees (about 5.5 km of latitude).
pub const DEFAULT_TILE_SIZE_DEG: f64 = 0.05;

const MICRO_DEG_PER_DEG: f64 = 1_000_000.0;
const LAT_SPAN_MICRO_DEG: u32 = 180_000_000;
const LNG_SPAN_MICRO_DEG: u32 = 360_000_000;

/// Relative slack applied when deciding whether a cell touches a disc. Absorbs
/// rounding in the distance and destination formulas.
const COVER_SLACK_RATIO: f64 = 0.01;
const COVER_SLACK_METERS: f64 = 1.0;

/// Identifier of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    resolution: u32,
    row: u32,
    col: u32,
}

impl TileId {
    /// Cell edge in micro-degrees.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn encode(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&self.resolution.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.row.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.col.to_be_bytes());
        bytes
    }

    /// Decode a key produced by [`TileId::encode`].
    ///
    /// Returns `None` for slices of the wrong length or a zero resolution.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 12 {
            return None;
        }
        let resolution = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        let row = u32::from_be_bytes(bytes[4..8].try_into().ok()?);
        let col = u32::from_be_bytes(bytes[8..12].try_into().ok()?);
        if resolution == 0 {
            return None;
        }
        Some(Self {
            resolution,
            row,
            col,
        })
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.resolution, self.row, self.col)
    }
}

/// Geographic extent of a tile in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl TileBounds {
    /// Half-open containment: the north and east edges belong to the
    /// neighbouring cells.
    pub fn contains(&self, point: &Coordinate) -> bool {
        let lng = normalize_lng(point.lng);
        point.lat >= self.south
            && (point.lat < self.north || (self.north >= 90.0 && point.lat <= 90.0))
            && lng >= self.west
            && lng < self.east
    }

    pub fn corners(&self) -> [Coordinate; 4] {
        [
            Coordinate::new(self.south, self.west),
            Coordinate::new(self.south, self.east),
            Coordinate::new(self.north, self.west),
            Coordinate::new(self.north, self.east),
        ]
    }
}

/// Maps coordinates to tiles and enumerates disc covers.
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndex {
    resolution: u32,
    size_deg: f64,
    rows: u32,
    cols: u32,
}

impl TileIndex {
    /// Build an index for cells of `size_deg` degrees.
    ///
    /// The size must be a whole number of micro-degrees that divides both 180
    /// and 360 degrees exactly, so the grid wraps cleanly at the antimeridian.
    pub fn new(size_deg: f64) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "tile_size_deg".to_string(),
            value: size_deg.to_string(),
            reason: reason.to_string(),
        };

        if !size_deg.is_finite() || size_deg <= 0.0 || size_deg > 90.0 {
            return Err(invalid("must be in (0, 90]"));
        }
        let micro = (size_deg * MICRO_DEG_PER_DEG).round();
        if micro < 1.0 || (micro - size_deg * MICRO_DEG_PER_DEG).abs() > 1e-3 {
            return Err(invalid("must be a whole number of micro-degrees"));
        }
        let resolution = micro as u32;
        if LAT_SPAN_MICRO_DEG % resolution != 0 || LNG_SPAN_MICRO_DEG % resolution != 0 {
            return Err(invalid("must divide 180 and 360 degrees evenly"));
        }

        Ok(Self {
            resolution,
            size_deg: resolution as f64 / MICRO_DEG_PER_DEG,
            rows: LAT_SPAN_MICRO_DEG / resolution,
            cols: LNG_SPAN_MICRO_DEG / resolution,
        })
    }

    /// Cell edge in degrees.
    pub fn size_deg(&self) -> f64 {
        self.size_deg
    }

    /// Cell edge in micro-degrees.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    fn row_of(&self, lat: f64) -> u32 {
        let raw = ((lat + 90.0) / self.size_deg).floor();
        raw.clamp(0.0, (self.rows - 1) as f64) as u32
    }

    fn col_of(&self, lng: f64) -> u32 {
        let raw = ((normalize_lng(lng) + 180.0) / self.size_deg).floor();
        raw.clamp(0.0, (self.cols - 1) as f64) as u32
    }

    fn tile(&self, row: u32, col: u32) -> TileId {
        TileId {
            resolution: self.resolution,
            row,
            col,
        }
    }

    /// The tile containing `point`.
    pub fn tile_of(&self, point: &Coordinate) -> TileId {
        self.tile(self.row_of(point.lat), self.col_of(point.lng))
    }

    pub fn bounds(&self, tile: &TileId) -> TileBounds {
        let south = tile.row as f64 * self.size_deg - 90.0;
        let west = tile.col as f64 * self.size_deg - 180.0;
        TileBounds {
            south,
            west,
            north: (south + self.size_deg).min(90.0),
            east: (west + self.size_deg).min(180.0),
        }
    }

    pub fn center(&self, tile: &TileId) -> Coordinate {
        let b = self.bounds(tile);
        Coordinate::new((b.south + b.north) / 2.0, (b.west + b.east) / 2.0)
    }

    /// Distance from the tile center to its farthest corner. A provider query
    /// at the tile center with this radius sees the whole tile.
    pub fn circumradius_meters(&self, tile: &TileId) -> f64 {
        let center = self.center(tile);
        self.bounds(tile)
            .corners()
            .iter()
            .map(|corner| center.distance_to(corner))
            .fold(0.0, f64::max)
    }

    /// Great-circle distance from `point` to the nearest point of `tile`.
    ///
    /// When the point's meridian crosses the cell the nearest point lies on
    /// that meridian. Otherwise it lies on one of the two edge meridians, at
    /// the latitude where the great circle through `point` meets the edge at a
    /// right angle, clamped into the cell.
    pub fn distance_to_tile(&self, point: &Coordinate, tile: &TileId) -> f64 {
        let b = self.bounds(tile);
        let lng = normalize_lng(point.lng);
        if lng >= b.west && lng <= b.east {
            let lat = point.lat.clamp(b.south, b.north);
            return point.distance_to(&Coordinate::new(lat, lng));
        }

        [b.west, b.east]
            .iter()
            .map(|&edge| distance_to_meridian_segment(point, edge, b.south, b.north))
            .fold(f64::INFINITY, f64::min)
    }

    /// All tiles touched by the disc of `radius_m` meters around `center`.
    ///
    /// Every point within the disc falls inside a returned tile. Cells are
    /// kept when their nearest point lies within the radius plus a small slack,
    /// so the over-coverage is bounded and identical for identical inputs.
    pub fn tiles_covering(&self, center: &Coordinate, radius_m: f64) -> BTreeSet<TileId> {
        let mut tiles = BTreeSet::new();
        tiles.insert(self.tile_of(center));

        if radius_m.is_nan() || radius_m <= 0.0 {
            return tiles;
        }

        let angular = radius_m / EARTH_RADIUS_METERS;
        let d_lat = angular.to_degrees();
        let lat_lo = center.lat - d_lat;
        let lat_hi = center.lat + d_lat;

        // Half-width of the spherical cap in longitude; a cap containing a pole
        // spans every meridian.
        let d_lng = if lat_lo <= -90.0 || lat_hi >= 90.0 || angular >= std::f64::consts::FRAC_PI_2 {
            None
        } else {
            let ratio = angular.sin() / center.lat.to_radians().cos();
            if ratio >= 1.0 {
                None
            } else {
                Some(ratio.asin().to_degrees())
            }
        };

        let row_lo = self.row_of(lat_lo.max(-90.0));
        let row_hi = self.row_of(lat_hi.min(90.0));

        let cols: Vec<u32> = match d_lng {
            Some(d_lng) if 2.0 * d_lng < 360.0 - self.size_deg => {
                let start = ((center.lng - d_lng + 180.0) / self.size_deg).floor() as i64;
                let end = ((center.lng + d_lng + 180.0) / self.size_deg).floor() as i64;
                let mut cols: Vec<u32> = (start..=end)
                    .map(|raw| raw.rem_euclid(self.cols as i64) as u32)
                    .collect();
                cols.sort_unstable();
                cols.dedup();
                cols
            }
            _ => (0..self.cols).collect(),
        };

        let limit = radius_m * (1.0 + COVER_SLACK_RATIO) + COVER_SLACK_METERS;
        for row in row_lo..=row_hi {
            for &col in &cols {
                let tile = self.tile(row, col);
                if self.distance_to_tile(center, &tile) <= limit {
                    tiles.insert(tile);
                }
            }
        }

        tiles
    }
}

/// Distance from `point` to the meridian `edge_lng` between latitudes `south`
/// and `north`.
fn distance_to_meridian_segment(
    point: &Coordinate,
    edge_lng: f64,
    south: f64,
    north: f64,
) -> f64 {
    let phi = point.lat.to_radians();
    let d_lambda = lng_gap(point.lng, edge_lng).to_radians();
    // Closest latitude on the full meridian. Past a quarter turn the distance
    // only grows toward the far pole, so the segment's ends are the candidates.
    let foot = phi.sin().atan2(phi.cos() * d_lambda.cos()).to_degrees();

    let mut candidates = vec![south, north];
    if foot.abs() <= 90.0 {
        candidates.push(foot.clamp(south, north));
    }
    candidates
        .into_iter()
        .map(|lat| point.distance_to(&Coordinate::new(lat, edge_lng)))
        .fold(f64::INFINITY, f64::min)
}

impl Default for TileIndex {
    fn default() -> Self {
        Self {
            resolution: 50_000,
            size_deg: DEFAULT_TILE_SIZE_DEG,
            rows: LAT_SPAN_MICRO_DEG / 50_000,
            cols: LNG_SPAN_MICRO_DEG / 50_000,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
