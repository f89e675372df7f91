use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::limits::MAX_FACILITIES;
use crate::model::*;

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Json(serde_json::Error),
    DuplicateFacility(String),
    InvalidFacility { id: String, reason: &'static str },
    TooManyFacilities(usize),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(e) => write!(f, "cannot read catalog: {e}"),
            CatalogError::Json(e) => write!(f, "cannot parse catalog: {e}"),
            CatalogError::DuplicateFacility(id) => write!(f, "duplicate facility id: {id}"),
            CatalogError::InvalidFacility { id, reason } => {
                write!(f, "invalid facility {id:?}: {reason}")
            }
            CatalogError::TooManyFacilities(n) => write!(f, "too many facilities: {n}"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        CatalogError::Io(e)
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Json(e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    facilities: Vec<FacilityDefinition>,
}

/// The club's bookable facilities, in display order.
#[derive(Debug, Clone)]
pub struct Catalog {
    facilities: Vec<FacilityDefinition>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(facilities: Vec<FacilityDefinition>) -> Result<Self, CatalogError> {
        if facilities.len() > MAX_FACILITIES {
            return Err(CatalogError::TooManyFacilities(facilities.len()));
        }
        let mut by_id = HashMap::with_capacity(facilities.len());
        for (i, facility) in facilities.iter().enumerate() {
            check_facility(facility)?;
            if by_id.insert(facility.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateFacility(facility.id.clone()));
            }
        }
        Ok(Self { facilities, by_id })
    }

    /// Parse `{"facilities": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.facilities)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        let file = CatalogFile {
            facilities: self.facilities.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn get(&self, id: &str) -> Option<&FacilityDefinition> {
        self.by_id.get(id).map(|&i| &self.facilities[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacilityDefinition> {
        self.facilities.iter()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a FacilityDefinition> {
        self.facilities.iter().filter(move |f| f.category == category)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// The club's own facilities: seven grills booked by the day, three tennis
    /// courts and four fronton courts booked by the hour from 06:00 to 21:00.
    pub fn club_default() -> Result<Self, CatalogError> {
        let grill = |id: &str, name: &str, capacity: u32| FacilityDefinition {
            id: id.into(),
            display_name: name.into(),
            category: "grills".into(),
            granularity: Granularity::WholeDay,
            capacity,
            operating_hours: Some(TimeBlock {
                start_hour: 10,
                end_hour: 18,
            }),
            slot_hours: 1,
        };
        let court = |id: &str, name: &str, category: &str| FacilityDefinition {
            id: id.into(),
            display_name: name.into(),
            category: category.into(),
            granularity: Granularity::Hourly,
            capacity: 4,
            operating_hours: Some(TimeBlock {
                start_hour: 6,
                end_hour: 21,
            }),
            slot_hours: 1,
        };

        let facilities = vec![
            grill("grill-central", "Central Grill", 30),
            grill("grill-large", "Large Grill", 35),
            grill("grill-family", "Family Grill", 10),
            grill("grill-1", "Grill 1", 25),
            grill("grill-2", "Grill 2", 25),
            grill("grill-3", "Grill 3", 25),
            grill("grill-4", "Grill 4", 25),
            court("tennis-1", "Tennis Court 1", "tennis"),
            court("tennis-2", "Tennis Court 2", "tennis"),
            court("tennis-3", "Tennis Court 3", "tennis"),
            court("fronton-1", "Fronton 1", "fronton"),
            court("fronton-2", "Fronton 2", "fronton"),
            court("fronton-3", "Fronton 3", "fronton"),
            court("fronton-4", "Fronton 4", "fronton"),
        ];
        Self::new(facilities)
    }
}

fn check_facility(facility: &FacilityDefinition) -> Result<(), CatalogError> {
    let invalid = |reason| CatalogError::InvalidFacility {
        id: facility.id.clone(),
        reason,
    };
    if validate_facility_id(&facility.id).is_err() {
        return Err(invalid("id must be non-empty with no '/' or whitespace"));
    }
    if facility.capacity == 0 {
        return Err(invalid("capacity must be at least 1"));
    }
    if let Some(h) = facility.operating_hours
        && TimeBlock::new(h.start_hour, h.end_hour).is_err()
    {
        return Err(invalid("operating hours must be a non-empty range within 0-24"));
    }
    if facility.granularity == Granularity::Hourly {
        if facility.operating_hours.is_none() {
            return Err(invalid("hourly facilities need operating hours"));
        }
        if facility.slot_hours == 0 || facility.slot_hours > 24 {
            return Err(invalid("slot_hours must be between 1 and 24"));
        }
        if facility.blocks().is_empty() {
            return Err(invalid("no block fits inside operating hours"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_valid() {
        let catalog = Catalog::club_default().unwrap();
        let rebuilt = Catalog::new(catalog.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), 14);
        assert_eq!(catalog.in_category("grills").count(), 7);
        assert_eq!(catalog.in_category("tennis").count(), 3);
        assert_eq!(catalog.in_category("fronton").count(), 4);
        assert_eq!(catalog.get("grill-large").unwrap().capacity, 35);
        assert_eq!(catalog.get("fronton-2").unwrap().blocks().len(), 15);
    }

    #[test]
    fn json_roundtrip_keeps_order() {
        let catalog = Catalog::club_default().unwrap();
        let json = catalog.to_json().unwrap();
        let back = Catalog::from_json(&json).unwrap();
        let ids: Vec<_> = back.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"grill-central"));
        assert_eq!(ids.last(), Some(&"fronton-4"));
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{"facilities": [
            {"id": "court-1", "display_name": "Court 1", "granularity": "hourly",
             "capacity": 4, "operating_hours": {"start_hour": 6, "end_hour": 21}}
        ]}"#;
        let catalog = Catalog::from_json(json).unwrap();
        let court = catalog.get("court-1").unwrap();
        assert_eq!(court.slot_hours, 1);
        assert_eq!(court.category, "");
    }

    #[test]
    fn rejects_duplicates_and_bad_definitions() {
        let mut facilities: Vec<_> = Catalog::club_default().unwrap().iter().cloned().collect();
        facilities.push(facilities[0].clone());
        assert!(matches!(
            Catalog::new(facilities),
            Err(CatalogError::DuplicateFacility(_))
        ));

        let mut hourly = Catalog::club_default().unwrap().get("tennis-1").unwrap().clone();
        hourly.operating_hours = None;
        assert!(matches!(
            Catalog::new(vec![hourly.clone()]),
            Err(CatalogError::InvalidFacility { .. })
        ));

        hourly.operating_hours = Some(TimeBlock { start_hour: 6, end_hour: 7 });
        hourly.slot_hours = 2;
        assert!(Catalog::new(vec![hourly.clone()]).is_err());

        hourly.slot_hours = 1;
        hourly.capacity = 0;
        assert!(Catalog::new(vec![hourly]).is_err());
    }

    #[test]
    fn oversized_slot_hours_is_rejected() {
        let json = r#"{"facilities": [
            {"id": "court-1", "display_name": "Court 1", "granularity": "hourly",
             "capacity": 4, "operating_hours": {"start_hour": 6, "end_hour": 21},
             "slot_hours": 250}
        ]}"#;
        assert!(matches!(
            Catalog::from_json(json),
            Err(CatalogError::InvalidFacility { .. })
        ));
    }

    #[test]
    fn bad_json_is_reported() {
        assert!(matches!(
            Catalog::from_json("{\"facilities\": 3}"),
            Err(CatalogError::Json(_))
        ));
    }
}
