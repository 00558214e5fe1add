//! Arrival streams: the precomputed `second -> arrivals` schedule consumed by
//! the tick loop, and Poisson generators that build one from hourly rates.
//!
//! Generators draw exponential inter-arrival times hour by hour, so the
//! expected number of arrivals in hour `h` equals the hour's rate.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::geo::cell_hex;
use crate::spatial::SpatialMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderArrival {
    #[serde(with = "cell_hex")]
    pub start_cell: CellIndex,
    #[serde(with = "cell_hex")]
    pub finish_cell: CellIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverArrival {
    #[serde(with = "cell_hex")]
    pub cell: CellIndex,
    /// `None` keeps the driver until the end of the run.
    pub lifetime_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Resource)]
pub struct ArrivalSchedule {
    orders: BTreeMap<u64, Vec<OrderArrival>>,
    drivers: BTreeMap<u64, Vec<DriverArrival>>,
}

#[derive(Debug, Deserialize)]
struct OrderArrivalRow {
    second: u64,
    #[serde(with = "cell_hex")]
    start_cell: CellIndex,
    #[serde(with = "cell_hex")]
    finish_cell: CellIndex,
}

#[derive(Debug, Deserialize)]
struct DriverArrivalRow {
    second: u64,
    #[serde(with = "cell_hex")]
    cell: CellIndex,
    lifetime_secs: Option<u64>,
}

impl ArrivalSchedule {
    pub fn push_order(&mut self, second: u64, arrival: OrderArrival) {
        self.orders.entry(second).or_default().push(arrival);
    }

    pub fn push_driver(&mut self, second: u64, arrival: DriverArrival) {
        self.drivers.entry(second).or_default().push(arrival);
    }

    pub fn with_order(mut self, second: u64, start_cell: CellIndex, finish_cell: CellIndex) -> Self {
        self.push_order(
            second,
            OrderArrival {
                start_cell,
                finish_cell,
            },
        );
        self
    }

    pub fn with_driver(mut self, second: u64, cell: CellIndex, lifetime_secs: Option<u64>) -> Self {
        self.push_driver(second, DriverArrival { cell, lifetime_secs });
        self
    }

    pub fn orders_at(&self, second: u64) -> &[OrderArrival] {
        self.orders.get(&second).map_or(&[], Vec::as_slice)
    }

    pub fn drivers_at(&self, second: u64) -> &[DriverArrival] {
        self.drivers.get(&second).map_or(&[], Vec::as_slice)
    }

    pub fn order_count(&self) -> usize {
        self.orders.values().map(Vec::len).sum()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.values().map(Vec::len).sum()
    }

    pub fn merge(&mut self, other: ArrivalSchedule) {
        for (second, arrivals) in other.orders {
            self.orders.entry(second).or_default().extend(arrivals);
        }
        for (second, arrivals) in other.drivers {
            self.drivers.entry(second).or_default().extend(arrivals);
        }
    }

    /// Fails on the first arrival that references a cell outside the map.
    pub fn validate(&self, map: &SpatialMap) -> SimResult<()> {
        for arrival in self.orders.values().flatten() {
            map.ensure_known(arrival.start_cell)?;
            map.ensure_known(arrival.finish_cell)?;
        }
        for arrival in self.drivers.values().flatten() {
            map.ensure_known(arrival.cell)?;
        }
        Ok(())
    }

    /// Reads `second,start_cell,finish_cell` rows.
    pub fn load_orders_csv<P: AsRef<Path>>(&mut self, path: P) -> SimResult<()> {
        let mut reader = csv::Reader::from_path(path)?;
        for row in reader.deserialize() {
            let row: OrderArrivalRow = row?;
            self.push_order(
                row.second,
                OrderArrival {
                    start_cell: row.start_cell,
                    finish_cell: row.finish_cell,
                },
            );
        }
        Ok(())
    }

    /// Reads `second,cell,lifetime_secs` rows; an empty lifetime never expires.
    pub fn load_drivers_csv<P: AsRef<Path>>(&mut self, path: P) -> SimResult<()> {
        let mut reader = csv::Reader::from_path(path)?;
        for row in reader.deserialize() {
            let row: DriverArrivalRow = row?;
            self.push_driver(
                row.second,
                DriverArrival {
                    cell: row.cell,
                    lifetime_secs: row.lifetime_secs,
                },
            );
        }
        Ok(())
    }
}

/// Exponential sample with the given mean: `-ln(U) * mean`.
fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> f64 {
    let u: f64 = rng.gen();
    -u.max(1e-10).ln() * mean
}

/// Offsets (seconds into the hour, starting at 1) of a Poisson process with
/// `per_hour` expected events.
fn poisson_offsets<R: Rng + ?Sized>(rng: &mut R, per_hour: f64) -> Vec<u64> {
    let mut offsets = Vec::new();
    if !(per_hour.is_finite() && per_hour > 0.0) {
        return offsets;
    }
    let mut elapsed_hours = 0.0;
    loop {
        elapsed_hours += sample_exponential(rng, 1.0 / per_hour);
        if elapsed_hours >= 1.0 {
            break;
        }
        offsets.push((elapsed_hours * 3_600.0) as u64 + 1);
    }
    offsets
}

/// Weighted choice over a fixed list.
#[derive(Debug, Clone)]
struct WeightedChoice<T> {
    items: Vec<T>,
    index: WeightedIndex<f64>,
}

impl<T: Copy> WeightedChoice<T> {
    fn new(entries: Vec<(T, f64)>) -> SimResult<Self> {
        let (items, weights): (Vec<T>, Vec<f64>) = entries.into_iter().unzip();
        Ok(Self {
            items,
            index: WeightedIndex::new(weights)?,
        })
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.items[self.index.sample(rng)]
    }
}

type SlotKey = (u8, u8);

#[derive(Debug, Clone, Deserialize)]
struct OrderRateRow {
    day_of_week: u8,
    hour: u8,
    orders_per_hour: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct OdWeightRow {
    day_of_week: u8,
    hour: u8,
    #[serde(with = "cell_hex")]
    start_cell: CellIndex,
    #[serde(with = "cell_hex")]
    finish_cell: CellIndex,
    weight: f64,
}

/// Orders per `(day_of_week, hour)` with an origin/destination model.
#[derive(Debug, Clone)]
pub struct PoissonOrderGenerator {
    rates: HashMap<SlotKey, f64>,
    od: OdModel,
}

#[derive(Debug, Clone)]
enum OdModel {
    /// Origin and destination drawn independently and uniformly.
    Uniform(Vec<CellIndex>),
    Weighted(HashMap<SlotKey, WeightedChoice<OrderArrival>>),
}

impl PoissonOrderGenerator {
    /// Same rate every hour of every day, uniform origins and destinations.
    pub fn uniform(cells: Vec<CellIndex>, orders_per_hour: f64) -> SimResult<Self> {
        if cells.is_empty() {
            return Err(SimError::Config("order generator needs at least one cell".into()));
        }
        let rates = slots().map(|slot| (slot, orders_per_hour)).collect();
        Ok(Self {
            rates,
            od: OdModel::Uniform(cells),
        })
    }

    /// Loads `day_of_week,hour,orders_per_hour` and
    /// `day_of_week,hour,start_cell,finish_cell,weight` tables.
    pub fn from_csv<P: AsRef<Path>, Q: AsRef<Path>>(rates_path: P, od_path: Q) -> SimResult<Self> {
        let mut rates = HashMap::new();
        for row in csv::Reader::from_path(rates_path)?.deserialize() {
            let row: OrderRateRow = row?;
            check_slot("order rates", row.day_of_week, row.hour)?;
            rates.insert((row.day_of_week, row.hour), row.orders_per_hour);
        }

        let mut grouped: HashMap<SlotKey, Vec<(OrderArrival, f64)>> = HashMap::new();
        for row in csv::Reader::from_path(od_path)?.deserialize() {
            let row: OdWeightRow = row?;
            check_slot("od weights", row.day_of_week, row.hour)?;
            grouped.entry((row.day_of_week, row.hour)).or_default().push((
                OrderArrival {
                    start_cell: row.start_cell,
                    finish_cell: row.finish_cell,
                },
                row.weight,
            ));
        }
        let mut od = HashMap::with_capacity(grouped.len());
        for (slot, entries) in grouped {
            od.insert(slot, WeightedChoice::new(entries)?);
        }
        Ok(Self {
            rates,
            od: OdModel::Weighted(od),
        })
    }

    fn sample_od<R: Rng + ?Sized>(&self, slot: SlotKey, rng: &mut R) -> Option<OrderArrival> {
        match &self.od {
            OdModel::Uniform(cells) => Some(OrderArrival {
                start_cell: cells[rng.gen_range(0..cells.len())],
                finish_cell: cells[rng.gen_range(0..cells.len())],
            }),
            OdModel::Weighted(table) => table.get(&slot).map(|choice| choice.sample(rng)),
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, day_of_week: u8, rng: &mut R) -> ArrivalSchedule {
        let mut schedule = ArrivalSchedule::default();
        for hour in 0..24u8 {
            let slot = (day_of_week, hour);
            let rate = self.rates.get(&slot).copied().unwrap_or(0.0);
            for offset in poisson_offsets(rng, rate) {
                let Some(arrival) = self.sample_od(slot, rng) else {
                    log::warn!("no od weights for day {day_of_week} hour {hour}, skipping hour");
                    break;
                };
                schedule.push_order(u64::from(hour) * 3_600 + offset, arrival);
            }
        }
        schedule
    }
}

#[derive(Debug, Clone, Copy)]
struct DriverRate {
    drivers_per_hour: f64,
    mean_lifetime_min: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct DriverRateRow {
    day_of_week: u8,
    hour: u8,
    drivers_per_hour: f64,
    mean_lifetime_min: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct SpawnWeightRow {
    day_of_week: u8,
    hour: u8,
    #[serde(with = "cell_hex")]
    cell: CellIndex,
    weight: f64,
}

/// Driver arrivals per `(day_of_week, hour)` with exponential lifetimes.
#[derive(Debug, Clone)]
pub struct PoissonDriverGenerator {
    rates: HashMap<SlotKey, DriverRate>,
    cells: Vec<CellIndex>,
    spawn_weights: HashMap<SlotKey, WeightedChoice<CellIndex>>,
}

impl PoissonDriverGenerator {
    /// Same rate and mean lifetime for every hour, uniform spawn cells.
    pub fn uniform(cells: Vec<CellIndex>, drivers_per_hour: f64, mean_lifetime_min: f64) -> SimResult<Self> {
        if cells.is_empty() {
            return Err(SimError::Config("driver generator needs at least one cell".into()));
        }
        let rate = DriverRate {
            drivers_per_hour,
            mean_lifetime_min,
        };
        Ok(Self {
            rates: slots().map(|slot| (slot, rate)).collect(),
            cells,
            spawn_weights: HashMap::new(),
        })
    }

    /// Loads `day_of_week,hour,drivers_per_hour,mean_lifetime_min` and
    /// `day_of_week,hour,cell,weight` tables. Slots without spawn weights fall
    /// back to uniform choice over `cells`.
    pub fn from_csv<P: AsRef<Path>, Q: AsRef<Path>>(
        rates_path: P,
        spawn_path: Q,
        cells: Vec<CellIndex>,
    ) -> SimResult<Self> {
        let mut rates = HashMap::new();
        for row in csv::Reader::from_path(rates_path)?.deserialize() {
            let row: DriverRateRow = row?;
            check_slot("driver rates", row.day_of_week, row.hour)?;
            rates.insert(
                (row.day_of_week, row.hour),
                DriverRate {
                    drivers_per_hour: row.drivers_per_hour,
                    mean_lifetime_min: row.mean_lifetime_min,
                },
            );
        }
        let mut grouped: HashMap<SlotKey, Vec<(CellIndex, f64)>> = HashMap::new();
        for row in csv::Reader::from_path(spawn_path)?.deserialize() {
            let row: SpawnWeightRow = row?;
            check_slot("spawn weights", row.day_of_week, row.hour)?;
            grouped
                .entry((row.day_of_week, row.hour))
                .or_default()
                .push((row.cell, row.weight));
        }
        let mut spawn_weights = HashMap::with_capacity(grouped.len());
        for (slot, entries) in grouped {
            spawn_weights.insert(slot, WeightedChoice::new(entries)?);
        }
        if cells.is_empty() && rates.len() > spawn_weights.len() {
            return Err(SimError::Config(
                "driver generator needs fallback cells for slots without spawn weights".into(),
            ));
        }
        Ok(Self {
            rates,
            cells,
            spawn_weights,
        })
    }

    pub fn generate<R: Rng + ?Sized>(&self, day_of_week: u8, rng: &mut R) -> ArrivalSchedule {
        let mut schedule = ArrivalSchedule::default();
        for hour in 0..24u8 {
            let Some(rate) = self.rates.get(&(day_of_week, hour)).copied() else {
                continue;
            };
            let weights = self.spawn_weights.get(&(day_of_week, hour));
            if weights.is_none() && self.cells.is_empty() {
                continue;
            }
            for offset in poisson_offsets(rng, rate.drivers_per_hour) {
                let cell = match weights {
                    Some(choice) => choice.sample(rng),
                    None => self.cells[rng.gen_range(0..self.cells.len())],
                };
                let lifetime_secs = (sample_exponential(rng, rate.mean_lifetime_min) * 60.0)
                    .round()
                    .max(1.0) as u64;
                schedule.push_driver(
                    u64::from(hour) * 3_600 + offset,
                    DriverArrival {
                        cell,
                        lifetime_secs: Some(lifetime_secs),
                    },
                );
            }
        }
        schedule
    }
}

fn slots() -> impl Iterator<Item = SlotKey> {
    (1..=7u8).flat_map(|day| (0..24u8).map(move |hour| (day, hour)))
}

fn check_slot(table: &str, day_of_week: u8, hour: u8) -> SimResult<()> {
    if !(1..=7).contains(&day_of_week) || hour > 23 {
        return Err(SimError::table(
            table,
            format!("invalid slot day {day_of_week} hour {hour}"),
        ));
    }
    Ok(())
}
