//! Physical racks and their containers.
//!
//! Racks carry the live state the writer validates against: which
//! positions hold a container and how much liquid is in each. Plates have
//! one well spec for all positions; tube racks hold individual tubes with
//! their own specs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::position::{RackPosition, RackShape};
use super::volume::{liters_to_ul, ul_to_liters};

/// Capacity limits of a container (well or tube).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpecs {
    /// Maximum volume (l).
    pub max_volume: f64,
    /// Volume that cannot be aspirated (l).
    pub dead_volume: f64,
}

impl ContainerSpecs {
    /// Creates specs from microliter values.
    pub fn new(max_ul: f64, dead_ul: f64) -> Self {
        Self {
            max_volume: ul_to_liters(max_ul),
            dead_volume: ul_to_liters(dead_ul),
        }
    }
}

/// A container at a rack position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Tube barcode (wells have none).
    pub barcode: Option<String>,
    pub specs: ContainerSpecs,
    /// Current sample volume (l); `None` = empty.
    pub sample_volume: Option<f64>,
}

impl Container {
    pub fn new(specs: ContainerSpecs) -> Self {
        Self {
            barcode: None,
            specs,
            sample_volume: None,
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    /// Sets the sample volume in µl.
    pub fn with_volume_ul(mut self, ul: f64) -> Self {
        self.sample_volume = Some(ul_to_liters(ul));
        self
    }

    /// Current volume in µl (0 if empty).
    pub fn volume_ul(&self) -> f64 {
        self.sample_volume.map(liters_to_ul).unwrap_or(0.0)
    }
}

/// Kind of rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RackKind {
    /// A plate; all wells share the well specs.
    Plate { well_specs: ContainerSpecs },
    /// A rack holding individual tubes.
    TubeRack,
}

/// A physical rack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rack {
    pub barcode: String,
    pub label: String,
    pub shape: RackShape,
    pub kind: RackKind,
    containers: BTreeMap<RackPosition, Container>,
}

impl Rack {
    /// Creates a plate with a well at every position.
    pub fn plate(barcode: impl Into<String>, shape: RackShape, well_specs: ContainerSpecs) -> Self {
        let containers = shape
            .positions_by_column()
            .into_iter()
            .map(|p| (p, Container::new(well_specs)))
            .collect();
        Self {
            barcode: barcode.into(),
            label: String::new(),
            shape,
            kind: RackKind::Plate { well_specs },
            containers,
        }
    }

    /// Creates an empty tube rack.
    pub fn tube_rack(barcode: impl Into<String>, shape: RackShape) -> Self {
        Self {
            barcode: barcode.into(),
            label: String::new(),
            shape,
            kind: RackKind::TubeRack,
            containers: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Places a container (replacing any previous one).
    pub fn with_container(mut self, position: RackPosition, container: Container) -> Self {
        self.containers.insert(position, container);
        self
    }

    /// Sets the sample volume (µl) of an existing container.
    /// Returns `false` if there is no container at the position.
    pub fn set_volume_ul(&mut self, position: &RackPosition, ul: f64) -> bool {
        match self.containers.get_mut(position) {
            Some(c) => {
                c.sample_volume = if ul > 0.0 { Some(ul_to_liters(ul)) } else { None };
                true
            }
            None => false,
        }
    }

    pub fn container(&self, position: &RackPosition) -> Option<&Container> {
        self.containers.get(position)
    }

    /// Containers in position order.
    pub fn containers(&self) -> impl Iterator<Item = (&RackPosition, &Container)> {
        self.containers.iter()
    }

    /// Number of containers.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Plate well specs, if this is a plate.
    pub fn well_specs(&self) -> Option<&ContainerSpecs> {
        match &self.kind {
            RackKind::Plate { well_specs } => Some(well_specs),
            RackKind::TubeRack => None,
        }
    }

    /// Whether the rack holds no containers (tube racks only; plates
    /// always hold wells).
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Resolves rack barcodes to racks (the rack inventory).
pub trait RackLookup {
    fn find_rack(&self, barcode: &str) -> Option<&Rack>;
}

impl RackLookup for HashMap<String, Rack> {
    fn find_rack(&self, barcode: &str) -> Option<&Rack> {
        self.get(barcode)
    }
}

impl RackLookup for BTreeMap<String, Rack> {
    fn find_rack(&self, barcode: &str) -> Option<&Rack> {
        self.get(barcode)
    }
}

impl RackLookup for [Rack] {
    fn find_rack(&self, barcode: &str) -> Option<&Rack> {
        self.iter().find(|r| r.barcode == barcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(label: &str) -> RackPosition {
        RackPosition::from_label(label).unwrap()
    }

    #[test]
    fn test_plate_has_all_wells() {
        let plate = Rack::plate("02480001", RackShape::SHAPE_96, ContainerSpecs::new(100.0, 5.0));
        assert_eq!(plate.container_count(), 96);
        assert!(!plate.is_empty());
        assert!((plate.well_specs().unwrap().max_volume - 0.0001).abs() < 1e-15);
        assert_eq!(plate.container(&pos("H12")).unwrap().volume_ul(), 0.0);
    }

    #[test]
    fn test_tube_rack_containers() {
        let rack = Rack::tube_rack("09999999", RackShape::SHAPE_96).with_container(
            pos("A1"),
            Container::new(ContainerSpecs::new(1500.0, 5.0))
                .with_barcode("1000123")
                .with_volume_ul(40.0),
        );
        assert_eq!(rack.container_count(), 1);
        assert!((rack.container(&pos("A1")).unwrap().volume_ul() - 40.0).abs() < 1e-9);
        assert!(rack.container(&pos("A2")).is_none());
        assert!(rack.well_specs().is_none());
    }

    #[test]
    fn test_set_volume() {
        let mut plate = Rack::plate("p", RackShape::SHAPE_96, ContainerSpecs::new(100.0, 5.0));
        assert!(plate.set_volume_ul(&pos("A1"), 12.5));
        assert!((plate.container(&pos("A1")).unwrap().volume_ul() - 12.5).abs() < 1e-9);
        assert!(plate.set_volume_ul(&pos("A1"), 0.0));
        assert!(plate.container(&pos("A1")).unwrap().sample_volume.is_none());
        assert!(!plate.set_volume_ul(&pos("Z99"), 1.0));
    }

    #[test]
    fn test_lookup_impls() {
        let racks = vec![Rack::tube_rack("a", RackShape::SHAPE_96)];
        assert!(racks.as_slice().find_rack("a").is_some());
        let map: HashMap<String, Rack> = racks.into_iter().map(|r| (r.barcode.clone(), r)).collect();
        assert!(map.find_rack("b").is_none());
    }
}
