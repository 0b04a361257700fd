//! Reference and configuration tables.
//!
//! Catalog tables (parameters, placements, subsystems, relay and sensor types)
//! are owned by the server. User tables (people, locations, crop cycles,
//! devices, relays, sensors) can be edited locally and carry `UpdatedAt`.
//! Crop types are keyed by name and never change once created.
//!
//! Field names follow the PascalCase JSON of the greenhouse API.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entity::{EntityKey, IdentityStrategy, Mutability, SyncEntity};

// ==========================================================================
// Catalog tables
// ==========================================================================

/// A measurable quantity, e.g. temperature or humidity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    /// Display unit, e.g. `°C`.
    pub unit: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for Parameter {
    const TABLE: &'static str = "Parameters";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// Where a sensor sits, e.g. ambient air or nutrient solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for Placement {
    const TABLE: &'static str = "Placements";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// A hardware subsystem, e.g. climate control or water.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subsystem {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for Subsystem {
    const TABLE: &'static str = "Subsystems";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// A kind of relay, e.g. a fan or a pump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayType {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(rename = "SubsystemID")]
    pub subsystem_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for RelayType {
    const TABLE: &'static str = "RelayTypes";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

/// A kind of sensor: which parameter it measures, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorType {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "ParamID")]
    pub param_id: i64,
    #[serde(rename = "PlaceID")]
    pub place_id: i64,
    #[serde(rename = "SubsystemID")]
    pub subsystem_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for SensorType {
    const TABLE: &'static str = "SensorTypes";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

// ==========================================================================
// Crop types
// ==========================================================================

/// A crop variety. Unique by name; the server assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CropType {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub variety: Option<String>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SyncEntity for CropType {
    const TABLE: &'static str = "CropTypes";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Name;
    const MUTABILITY: Mutability = Mutability::ReadOnly;

    fn key(&self) -> EntityKey {
        EntityKey::Name(self.name.clone())
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

// ==========================================================================
// User tables
// ==========================================================================

/// A user of the greenhouse system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    #[serde(rename = "ID")]
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for Person {
    const TABLE: &'static str = "People";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Numeric;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Numeric(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

/// A greenhouse or growing area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "PersonID")]
    pub person_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for Location {
    const TABLE: &'static str = "Locations";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Guid(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

/// One planting of a crop type at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CropCycle {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub name: String,
    pub crop_type_name: String,
    #[serde(rename = "LocationID")]
    pub location_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub yield_kg: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for CropCycle {
    const TABLE: &'static str = "CropCycles";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Guid(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

/// A controller box installed at a location. Sensors and relays hang off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    #[serde(rename = "ID")]
    pub id: Uuid,
    pub serial_number: Uuid,
    pub name: String,
    #[serde(rename = "LocationID")]
    pub location_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for Device {
    const TABLE: &'static str = "Devices";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Guid(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

/// A switchable output on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relay {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "DeviceID")]
    pub device_id: Uuid,
    #[serde(rename = "RelayTypeID")]
    pub relay_type_id: i64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for Relay {
    const TABLE: &'static str = "Relays";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Guid(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

/// A sensor attached to a device. History blocks are recorded per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sensor {
    #[serde(rename = "ID")]
    pub id: Uuid,
    #[serde(rename = "DeviceID")]
    pub device_id: Uuid,
    #[serde(rename = "SensorTypeID")]
    pub sensor_type_id: i64,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub alarmed: bool,
    #[serde(default)]
    pub upper_limit: Option<f64>,
    #[serde(default)]
    pub lower_limit: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub deleted: bool,
}

impl SyncEntity for Sensor {
    const TABLE: &'static str = "Sensors";
    const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
    const MUTABILITY: Mutability = Mutability::Editable;

    fn key(&self) -> EntityKey {
        EntityKey::Guid(self.id)
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        Some(self.updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sensor_uses_api_field_names() {
        let json = r#"{
            "ID": "6f1c1c52-6a2e-4d59-9c1f-2b7d3c0e9a11",
            "DeviceID": "0b7a36d0-3a7e-4c1b-8a57-2d3f1e4c5b6a",
            "SensorTypeID": 4,
            "Enabled": true,
            "CreatedAt": "2026-01-01T00:00:00Z",
            "UpdatedAt": "2026-01-02T08:30:00Z"
        }"#;

        let sensor: Sensor = serde_json::from_str(json).unwrap();
        assert_eq!(sensor.sensor_type_id, 4);
        assert!(sensor.enabled);
        assert!(!sensor.deleted);
        assert_eq!(sensor.updated_at(), Some(datetime!(2026-01-02 08:30 UTC)));
        assert_eq!(sensor.key().strategy(), Sensor::IDENTITY);
    }

    #[test]
    fn test_crop_type_is_keyed_by_name() {
        let crop = CropType {
            id: 12,
            name: "Tomato".to_string(),
            variety: Some("Roma".to_string()),
            approved: true,
            created_by: None,
            created_at: datetime!(2026-01-01 0:00 UTC),
        };

        assert_eq!(crop.key(), EntityKey::Name("Tomato".to_string()));
        assert_eq!(crop.key().to_string(), "Tomato");
        assert_eq!(crop.updated_at(), None);
    }

    #[test]
    fn test_catalog_tables_are_read_only() {
        assert_eq!(Parameter::MUTABILITY, Mutability::ReadOnly);
        assert_eq!(Placement::MUTABILITY, Mutability::ReadOnly);
        assert_eq!(Subsystem::MUTABILITY, Mutability::ReadOnly);
        assert_eq!(RelayType::MUTABILITY, Mutability::ReadOnly);
        assert_eq!(SensorType::MUTABILITY, Mutability::ReadOnly);
        assert_eq!(Location::MUTABILITY, Mutability::Editable);
    }

    #[test]
    fn test_guid_key_display_is_hyphenated() {
        let id = Uuid::parse_str("6f1c1c52-6a2e-4d59-9c1f-2b7d3c0e9a11").unwrap();
        assert_eq!(
            EntityKey::Guid(id).to_string(),
            "6f1c1c52-6a2e-4d59-9c1f-2b7d3c0e9a11"
        );
        assert_eq!(EntityKey::Numeric(-3).to_string(), "-3");
    }
}
