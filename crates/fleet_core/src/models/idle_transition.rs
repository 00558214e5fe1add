//! Where idle drivers drift when nobody dispatches them.

use std::collections::HashMap;
use std::path::Path;

use bevy_ecs::prelude::Resource;
use h3o::CellIndex;
use rand::Rng;
use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::geo::cell_hex;
use crate::spatial::SpatialMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleTransition {
    pub destination: CellIndex,
    /// Probability of staying in the current cell.
    pub self_probability: f64,
}

#[derive(Debug, Deserialize)]
struct IdleTransitionRow {
    #[serde(with = "cell_hex")]
    cell: CellIndex,
    hour: u8,
    #[serde(with = "cell_hex")]
    destination: CellIndex,
    self_probability: f64,
}

/// `(cell, hour) -> transition`. Cells without an entry keep their drivers.
#[derive(Debug, Clone, Default, Resource)]
pub struct IdleTransitionModel {
    table: HashMap<(CellIndex, u8), IdleTransition>,
}

impl IdleTransitionModel {
    pub fn insert(
        &mut self,
        cell: CellIndex,
        hour: u8,
        destination: CellIndex,
        self_probability: f64,
    ) -> SimResult<()> {
        if hour > 23 {
            return Err(SimError::table("idle transitions", format!("hour {hour} out of range")));
        }
        if !(0.0..=1.0).contains(&self_probability) {
            return Err(SimError::table(
                "idle transitions",
                format!("self probability {self_probability} outside [0, 1]"),
            ));
        }
        self.table.insert(
            (cell, hour),
            IdleTransition {
                destination,
                self_probability,
            },
        );
        Ok(())
    }

    /// Reads `cell,hour,destination,self_probability` rows.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let mut model = Self::default();
        for row in csv::Reader::from_path(path)?.deserialize() {
            let row: IdleTransitionRow = row?;
            model.insert(row.cell, row.hour, row.destination, row.self_probability)?;
        }
        log::info!("loaded {} idle transitions", model.len());
        Ok(model)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, cell: CellIndex, hour: u8) -> Option<&IdleTransition> {
        self.table.get(&(cell, hour))
    }

    /// Every source and destination must be part of the map.
    pub fn validate(&self, map: &SpatialMap) -> SimResult<()> {
        for ((cell, _), transition) in &self.table {
            map.ensure_known(*cell)?;
            map.ensure_known(transition.destination)?;
        }
        Ok(())
    }

    /// Next resting cell: stays when a uniform draw is at most the self
    /// probability, otherwise moves to the table's destination.
    pub fn transition<R: Rng + ?Sized>(&self, cell: CellIndex, hour: u8, rng: &mut R) -> CellIndex {
        let Some(entry) = self.get(cell, hour) else {
            return cell;
        };
        let draw: f64 = rng.gen();
        if draw <= entry.self_probability {
            cell
        } else {
            entry.destination
        }
    }
}
