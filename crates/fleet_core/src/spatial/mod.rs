//! Static hex-cell map: adjacency graph, cell bounds and routing.
//!
//! - **SpatialMap**: the cell universe of a run with its weighted adjacency
//!   graph, per-cell bounding rectangles and precomputed two-hop closures
//! - **Route**: time-annotated path consumed by moving drivers
//! - **RoutePathCache**: memo of shortest paths, optionally pre-seeded
//!
//! Edge weights are geographic distances, kept as integer millimetres while
//! searching so Dijkstra costs stay exact.

mod cache;
mod route;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use pathfinding::prelude::dijkstra;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::geo::{cell_distance_m, cell_hex, LonLat};

pub use cache::{CachedPath, PrecomputedPath, RoutePathCache, DEFAULT_PATH_CACHE_CAPACITY};
pub use route::Route;

/// Lon/lat rectangle a cell's sampled coordinates are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellBounds {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl CellBounds {
    /// Min/max over the cell's boundary vertices.
    pub fn of_cell(cell: CellIndex) -> Self {
        let mut bounds = Self {
            lon_min: f64::INFINITY,
            lon_max: f64::NEG_INFINITY,
            lat_min: f64::INFINITY,
            lat_max: f64::NEG_INFINITY,
        };
        for vertex in cell.boundary().iter() {
            bounds.lon_min = bounds.lon_min.min(vertex.lng());
            bounds.lon_max = bounds.lon_max.max(vertex.lng());
            bounds.lat_min = bounds.lat_min.min(vertex.lat());
            bounds.lat_max = bounds.lat_max.max(vertex.lat());
        }
        bounds
    }

    pub fn contains(&self, point: LonLat) -> bool {
        (self.lon_min..=self.lon_max).contains(&point.lon)
            && (self.lat_min..=self.lat_max).contains(&point.lat)
    }

    fn is_valid(&self) -> bool {
        self.lon_min.is_finite()
            && self.lat_min.is_finite()
            && self.lon_min <= self.lon_max
            && self.lat_min <= self.lat_max
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> LonLat {
        LonLat {
            lon: rng.gen_range(self.lon_min..=self.lon_max),
            lat: rng.gen_range(self.lat_min..=self.lat_max),
        }
    }
}

/// Serialized map: cells (with optional explicit bounds) and weighted edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapDefinition {
    pub cells: Vec<CellRecord>,
    pub edges: Vec<EdgeRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    #[serde(with = "cell_hex")]
    pub cell: CellIndex,
    #[serde(default)]
    pub bounds: Option<CellBounds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(with = "cell_hex")]
    pub from: CellIndex,
    #[serde(with = "cell_hex")]
    pub to: CellIndex,
    pub distance_m: f64,
}

impl MapDefinition {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[derive(Debug, Resource)]
pub struct SpatialMap {
    cells: Vec<CellIndex>,
    bounds: HashMap<CellIndex, CellBounds>,
    adjacency: HashMap<CellIndex, Vec<(CellIndex, u64)>>,
    two_hop: HashMap<CellIndex, HashSet<CellIndex>>,
    paths: RoutePathCache,
}

impl SpatialMap {
    /// Builds a map over `cells`, connecting each cell to its ring-1 H3
    /// neighbours that are also part of the universe.
    pub fn from_cells<I>(cells: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = CellIndex>,
    {
        let universe: HashSet<CellIndex> = cells.into_iter().collect();
        if universe.is_empty() {
            return Err(SimError::Config("map needs at least one cell".into()));
        }
        let bounds = universe
            .iter()
            .map(|cell| (*cell, CellBounds::of_cell(*cell)))
            .collect();
        let mut adjacency: HashMap<CellIndex, Vec<(CellIndex, u64)>> = HashMap::new();
        for cell in &universe {
            let neighbours = cell
                .grid_disk::<Vec<_>>(1)
                .into_iter()
                .filter(|other| other != cell && universe.contains(other))
                .map(|other| (other, to_millimetres(cell_distance_m(*cell, other))))
                .collect();
            adjacency.insert(*cell, neighbours);
        }
        Ok(Self::assemble(bounds, adjacency))
    }

    /// Builds a map from an explicit definition. Every edge must join two
    /// declared cells with a positive distance; edges are undirected.
    pub fn from_definition(definition: MapDefinition) -> SimResult<Self> {
        if definition.cells.is_empty() {
            return Err(SimError::Config("map needs at least one cell".into()));
        }
        let mut bounds = HashMap::with_capacity(definition.cells.len());
        for record in definition.cells {
            let cell_bounds = record
                .bounds
                .unwrap_or_else(|| CellBounds::of_cell(record.cell));
            if !cell_bounds.is_valid() {
                return Err(SimError::table(
                    "map",
                    format!("cell {} has an empty bounding box", record.cell),
                ));
            }
            bounds.insert(record.cell, cell_bounds);
        }

        let mut adjacency: HashMap<CellIndex, Vec<(CellIndex, u64)>> =
            bounds.keys().map(|cell| (*cell, Vec::new())).collect();
        for edge in definition.edges {
            if !bounds.contains_key(&edge.from) {
                return Err(SimError::UnknownCell(edge.from));
            }
            if !bounds.contains_key(&edge.to) {
                return Err(SimError::UnknownCell(edge.to));
            }
            if !(edge.distance_m.is_finite() && edge.distance_m > 0.0) {
                return Err(SimError::table(
                    "map",
                    format!(
                        "edge {} -> {} has distance {}",
                        edge.from, edge.to, edge.distance_m
                    ),
                ));
            }
            let weight = to_millimetres(edge.distance_m);
            for (a, b) in [(edge.from, edge.to), (edge.to, edge.from)] {
                let neighbours = adjacency.entry(a).or_default();
                match neighbours.iter_mut().find(|(other, _)| *other == b) {
                    Some(existing) => existing.1 = existing.1.min(weight),
                    None => neighbours.push((b, weight)),
                }
            }
        }
        Ok(Self::assemble(bounds, adjacency))
    }

    fn assemble(
        bounds: HashMap<CellIndex, CellBounds>,
        mut adjacency: HashMap<CellIndex, Vec<(CellIndex, u64)>>,
    ) -> Self {
        let mut cells: Vec<CellIndex> = bounds.keys().copied().collect();
        cells.sort_unstable();
        for neighbours in adjacency.values_mut() {
            neighbours.sort_unstable();
        }

        let mut two_hop = HashMap::with_capacity(cells.len());
        for cell in &cells {
            let mut closure = HashSet::new();
            closure.insert(*cell);
            for (first, _) in adjacency.get(cell).into_iter().flatten() {
                closure.insert(*first);
                for (second, _) in adjacency.get(first).into_iter().flatten() {
                    closure.insert(*second);
                }
            }
            two_hop.insert(*cell, closure);
        }

        log::debug!(
            "spatial map assembled: {} cells, {} directed edges",
            cells.len(),
            adjacency.values().map(Vec::len).sum::<usize>()
        );

        Self {
            cells,
            bounds,
            adjacency,
            two_hop,
            paths: RoutePathCache::default(),
        }
    }

    /// Replaces the path memo, e.g. with one seeded from a precomputed table.
    pub fn with_path_cache(mut self, paths: RoutePathCache) -> Self {
        self.paths = paths;
        self
    }

    /// Cells of the universe in ascending id order.
    pub fn cells(&self) -> &[CellIndex] {
        &self.cells
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.bounds.contains_key(&cell)
    }

    pub fn ensure_known(&self, cell: CellIndex) -> SimResult<()> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(SimError::UnknownCell(cell))
        }
    }

    pub fn bounds(&self, cell: CellIndex) -> SimResult<CellBounds> {
        self.bounds
            .get(&cell)
            .copied()
            .ok_or(SimError::UnknownCell(cell))
    }

    pub fn neighbors(&self, cell: CellIndex) -> SimResult<impl Iterator<Item = CellIndex> + '_> {
        let neighbours = self
            .adjacency
            .get(&cell)
            .ok_or(SimError::UnknownCell(cell))?;
        Ok(neighbours.iter().map(|(other, _)| *other))
    }

    /// The cell, its neighbours and their neighbours.
    pub fn neighbors_of_neighbors(&self, cell: CellIndex) -> SimResult<&HashSet<CellIndex>> {
        self.two_hop.get(&cell).ok_or(SimError::UnknownCell(cell))
    }

    /// Uniform point inside the cell's bounding rectangle.
    pub fn coordinate_for<R: Rng + ?Sized>(&self, cell: CellIndex, rng: &mut R) -> SimResult<LonLat> {
        Ok(self.bounds(cell)?.sample(rng))
    }

    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> CellIndex {
        self.cells[rng.gen_range(0..self.cells.len())]
    }

    /// Shortest path between two cells; identical cells give a zero-length
    /// path holding just that cell.
    pub fn path(&self, from: CellIndex, to: CellIndex) -> SimResult<Arc<CachedPath>> {
        self.ensure_known(from)?;
        self.ensure_known(to)?;
        if from == to {
            return Ok(Arc::new(CachedPath {
                distance_m: 0.0,
                cells: vec![from],
            }));
        }
        self.paths
            .get_or_compute(from, to, || self.shortest_path(from, to))
    }

    fn shortest_path(&self, from: CellIndex, to: CellIndex) -> SimResult<CachedPath> {
        let (cells, cost_mm) = dijkstra(
            &from,
            |cell| self.adjacency.get(cell).into_iter().flatten().copied(),
            |cell| *cell == to,
        )
        .ok_or(SimError::NoPath { from, to })?;
        Ok(CachedPath {
            distance_m: cost_mm as f64 / 1000.0,
            cells,
        })
    }

    /// Spreads the path distance evenly over its hops and converts it to
    /// absolute seconds at `speed_m_per_s`. The first step is `start_second`
    /// at `from`; `from == to` yields an empty route.
    pub fn route(
        &self,
        from: CellIndex,
        to: CellIndex,
        speed_m_per_s: f64,
        start_second: u64,
    ) -> SimResult<Route> {
        if !(speed_m_per_s.is_finite() && speed_m_per_s > 0.0) {
            return Err(SimError::Config(format!(
                "route speed must be positive, got {speed_m_per_s}"
            )));
        }
        if from == to {
            self.ensure_known(from)?;
            return Ok(Route::default());
        }
        let path = self.path(from, to)?;
        let hops = path.cells.len().saturating_sub(1).max(1) as f64;
        let seconds_per_hop = path.distance_m / hops / speed_m_per_s;

        let mut steps = Vec::with_capacity(path.cells.len());
        let mut previous: Option<u64> = None;
        for (index, cell) in path.cells.iter().enumerate() {
            let mut second = start_second + (index as f64 * seconds_per_hop).round() as u64;
            if let Some(previous) = previous {
                second = second.max(previous + 1);
            }
            steps.push((second, *cell));
            previous = Some(second);
        }
        Ok(Route::from_steps(steps))
    }

    /// Seconds needed to cover the shortest path at `speed_m_per_s`.
    pub fn travel_time_secs(&self, from: CellIndex, to: CellIndex, speed_m_per_s: f64) -> SimResult<f64> {
        let path = self.path(from, to)?;
        Ok(path.distance_m / speed_m_per_s)
    }

    pub fn path_cache(&self) -> &RoutePathCache {
        &self.paths
    }
}

fn to_millimetres(distance_m: f64) -> u64 {
    ((distance_m * 1000.0).round() as u64).max(1)
}
