use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, LocationId, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    /// Warehouse.
    Almacen,
    /// Service vehicle, usually assigned to one technician.
    Vehiculo,
    /// Job site.
    Obra,
}

/// A stock-holding place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<UserId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Soft delete: the location disappears from active listings but its
    /// stock records and journal history stay intact.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = now;
    }

    pub fn apply_patch(&mut self, patch: LocationPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("location name cannot be empty"));
            }
        }
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(location_type) = patch.location_type {
            self.location_type = location_type;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(responsible) = patch.responsible_user_id {
            self.responsible_user_id = responsible;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub responsible_user_id: Option<UserId>,
}

impl NewLocation {
    pub fn new(name: impl Into<String>, location_type: LocationType) -> Self {
        Self {
            name: name.into(),
            location_type,
            description: None,
            responsible_user_id: None,
        }
    }

    pub fn responsible(mut self, user: UserId) -> Self {
        self.responsible_user_id = Some(user);
        self
    }

    pub fn into_location(self, id: LocationId, now: DateTime<Utc>) -> DomainResult<Location> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        Ok(Location {
            id,
            name: self.name.trim().to_string(),
            location_type: self.location_type,
            description: self.description,
            responsible_user_id: self.responsible_user_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub location_type: Option<LocationType>,
    pub description: Option<Option<String>>,
    pub responsible_user_id: Option<Option<UserId>>,
    pub is_active: Option<bool>,
}
