//! Electrodes and electrode arrays.
//!
//! An [`ElectrodeArray`] is the fixed geometry of a simulation run: once
//! constructed, neither its membership nor any electrode position can change.
//! Re-positioning an implant produces a new array via
//! [`ElectrodeArray::transformed`].

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::error::GeometryError;
use crate::transform::Transform;

/// A single disc stimulation contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Electrode {
    id: String,
    position: [f64; 3],
    radius: f64,
    orientation: [f64; 3],
}

impl Electrode {
    /// Create an electrode facing the tissue along `+z`.
    ///
    /// # Arguments
    /// * `id` - Identifier, unique within the owning array.
    /// * `position` - Centre of the contact (µm); `z` is the height above the tissue.
    /// * `radius` - Disc radius (µm), strictly positive.
    pub fn new(id: impl Into<String>, position: [f64; 3], radius: f64) -> Result<Self, GeometryError> {
        let id = id.into();
        if id.is_empty() {
            return Err(GeometryError::InvalidElectrode {
                id,
                reason: "identifier must not be empty".into(),
            });
        }
        if !position.iter().all(|c| c.is_finite()) {
            return Err(GeometryError::InvalidElectrode {
                id,
                reason: format!("position {:?} is not finite", position),
            });
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(GeometryError::InvalidElectrode {
                id,
                reason: format!("radius must be positive, got {}", radius),
            });
        }
        Ok(Self {
            id,
            position,
            radius,
            orientation: [0.0, 0.0, 1.0],
        })
    }

    /// Set the contact normal. The vector is normalised.
    pub fn with_orientation(mut self, orientation: [f64; 3]) -> Result<Self, GeometryError> {
        let len = (orientation[0] * orientation[0]
            + orientation[1] * orientation[1]
            + orientation[2] * orientation[2])
            .sqrt();
        if !(len.is_finite() && len > 1e-12) {
            return Err(GeometryError::InvalidElectrode {
                id: self.id,
                reason: "orientation must be a non-zero finite vector".into(),
            });
        }
        self.orientation = [orientation[0] / len, orientation[1] / len, orientation[2] / len];
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Centre of the contact (µm).
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// Disc radius (µm).
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Unit normal of the contact surface.
    pub fn orientation(&self) -> [f64; 3] {
        self.orientation
    }

    /// Euclidean distance (µm) from a point on the tissue surface (`z = 0`).
    pub fn distance_to(&self, location: [f64; 2]) -> f64 {
        let dx = location[0] - self.position[0];
        let dy = location[1] - self.position[1];
        let dz = self.position[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    fn hash_geometry<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        for c in self.position.iter().chain(self.orientation.iter()) {
            c.to_bits().hash(state);
        }
        self.radius.to_bits().hash(state);
    }
}

/// An ordered, immutable set of electrodes with unique identifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElectrodeArray {
    electrodes: Vec<Electrode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ElectrodeArray {
    /// Build an array, rejecting duplicate identifiers.
    pub fn new(electrodes: Vec<Electrode>) -> Result<Self, GeometryError> {
        let mut index = HashMap::with_capacity(electrodes.len());
        for (i, e) in electrodes.iter().enumerate() {
            if index.insert(e.id.clone(), i).is_some() {
                return Err(GeometryError::DuplicateElectrode(e.id.clone()));
            }
        }
        Ok(Self { electrodes, index })
    }

    /// A rectangular grid centred on the origin.
    ///
    /// Rows are labelled `A`, `B`, ... from the top (`+y`) down and columns
    /// are numbered from 1 along `+x`, so the top-left contact is `A1`.
    ///
    /// # Arguments
    /// * `rows`, `cols` - Grid shape; at most 26 rows.
    /// * `spacing` - Centre-to-centre distance (µm).
    /// * `radius` - Contact radius (µm).
    /// * `height` - Distance of every contact above the tissue (µm).
    pub fn grid(
        rows: usize,
        cols: usize,
        spacing: f64,
        radius: f64,
        height: f64,
    ) -> Result<Self, GeometryError> {
        if rows == 0 || cols == 0 || rows > 26 {
            return Err(GeometryError::InvalidParameter(format!(
                "grid shape {}x{} is not supported (1..=26 rows, at least 1 column)",
                rows, cols
            )));
        }
        if !(spacing.is_finite() && spacing > 0.0) {
            return Err(GeometryError::InvalidParameter(format!(
                "grid spacing must be positive, got {}",
                spacing
            )));
        }

        let x_off = (cols as f64 - 1.0) / 2.0;
        let y_off = (rows as f64 - 1.0) / 2.0;
        let mut electrodes = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            let label = (b'A' + r as u8) as char;
            for c in 0..cols {
                let x = (c as f64 - x_off) * spacing;
                let y = (y_off - r as f64) * spacing;
                electrodes.push(Electrode::new(format!("{}{}", label, c + 1), [x, y, height], radius)?);
            }
        }
        Self::new(electrodes)
    }

    /// The Argus II epiretinal layout: 6x10 contacts, 575 µm pitch, 225 µm diameter.
    pub fn argus_ii() -> Self {
        // Parameters are constants known to be valid.
        match Self::grid(6, 10, 575.0, 112.5, 0.0) {
            Ok(array) => array,
            Err(e) => unreachable!("Argus II preset is valid: {}", e),
        }
    }

    /// Return a new array with every electrode mapped through `transform`.
    pub fn transformed(&self, transform: &Transform) -> Self {
        let electrodes = self
            .electrodes
            .iter()
            .map(|e| Electrode {
                id: e.id.clone(),
                position: transform.apply(&e.position),
                radius: e.radius,
                orientation: transform.apply_direction(&e.orientation),
            })
            .collect();
        Self {
            electrodes,
            index: self.index.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.electrodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.electrodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Electrode> {
        self.electrodes.iter()
    }

    pub fn electrodes(&self) -> &[Electrode] {
        &self.electrodes
    }

    pub fn lookup(&self, id: &str) -> Option<&Electrode> {
        self.index.get(id).map(|&i| &self.electrodes[i])
    }

    /// Position of `id` in the array's ordering.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.electrodes.iter().map(|e| e.id.as_str())
    }

    /// Feed the full geometry (ids, positions, radii, orientations) into a hasher.
    pub fn content_hash<H: Hasher>(&self, state: &mut H) {
        self.electrodes.len().hash(state);
        for e in &self.electrodes {
            e.hash_geometry(state);
        }
    }

    /// Axis-aligned footprint on the tissue surface: `([x_min, y_min], [x_max, y_max])`,
    /// including each contact's radius.
    pub fn footprint(&self) -> Option<([f64; 2], [f64; 2])> {
        let first = self.electrodes.first()?;
        let mut lo = [first.position[0] - first.radius, first.position[1] - first.radius];
        let mut hi = [first.position[0] + first.radius, first.position[1] + first.radius];
        for e in &self.electrodes[1..] {
            lo[0] = lo[0].min(e.position[0] - e.radius);
            lo[1] = lo[1].min(e.position[1] - e.radius);
            hi[0] = hi[0].max(e.position[0] + e.radius);
            hi[1] = hi[1].max(e.position[1] + e.radius);
        }
        Some((lo, hi))
    }
}

impl<'a> IntoIterator for &'a ElectrodeArray {
    type Item = &'a Electrode;
    type IntoIter = std::slice::Iter<'a, Electrode>;

    fn into_iter(self) -> Self::IntoIter {
        self.electrodes.iter()
    }
}
