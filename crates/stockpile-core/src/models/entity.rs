//! Entity snapshot model shared by the queue, detector, and resolver

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The four record kinds tracked by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Item,
    Container,
    Category,
    Location,
}

impl EntityKind {
    /// All entity kinds, for sweeps and CLI listings
    pub const ALL: [Self; 4] = [Self::Item, Self::Container, Self::Category, Self::Location];

    /// Stable lowercase name used in storage and offline id tags
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Container => "container",
            Self::Category => "category",
            Self::Location => "location",
        }
    }

    /// Plural form used by the remote service's collection paths
    #[must_use]
    pub const fn plural(&self) -> &'static str {
        match self {
            Self::Item => "items",
            Self::Container => "containers",
            Self::Category => "categories",
            Self::Location => "locations",
        }
    }

    /// Whether `parent` is an acceptable parent kind for this kind
    #[must_use]
    pub const fn accepts_parent(&self, parent: Self) -> bool {
        match self {
            Self::Item => matches!(parent, Self::Container | Self::Location),
            Self::Container => matches!(parent, Self::Container | Self::Location),
            Self::Location => matches!(parent, Self::Location),
            Self::Category => false,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "item" => Ok(Self::Item),
            "container" => Ok(Self::Container),
            "category" => Ok(Self::Category),
            "location" => Ok(Self::Location),
            other => Err(Error::InvalidInput(format!("Unknown entity kind: {other}"))),
        }
    }
}

/// Sync state of a locally cached entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Matches the authoritative remote record
    Synced,
    /// Has local changes queued for sync
    Pending,
    /// Created offline; its identifier is still offline-form
    OfflineOnly,
}

impl SyncStatus {
    /// Stable lowercase name used in storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::OfflineOnly => "offline_only",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "offline_only" => Ok(Self::OfflineOnly),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// Scalar fields of an entity snapshot that participate in field-level
/// merge resolution. Adding a field here forces every merge site to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarField {
    Name,
    Code,
    ParentId,
    CategoryId,
    Quantity,
    PriceCents,
    Notes,
}

impl ScalarField {
    /// All mergeable scalar fields
    pub const ALL: [Self; 7] = [
        Self::Name,
        Self::Code,
        Self::ParentId,
        Self::CategoryId,
        Self::Quantity,
        Self::PriceCents,
        Self::Notes,
    ];

    /// Stable snake_case name used in merge selections and CLI args
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Code => "code",
            Self::ParentId => "parent_id",
            Self::CategoryId => "category_id",
            Self::Quantity => "quantity",
            Self::PriceCents => "price_cents",
            Self::Notes => "notes",
        }
    }
}

impl fmt::Display for ScalarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(Self::Name),
            "code" => Ok(Self::Code),
            "parent_id" => Ok(Self::ParentId),
            "category_id" => Ok(Self::CategoryId),
            "quantity" => Ok(Self::Quantity),
            "price_cents" => Ok(Self::PriceCents),
            "notes" => Ok(Self::Notes),
            other => Err(Error::InvalidInput(format!("Unknown field: {other}"))),
        }
    }
}

/// Full state of an entity at a point in time.
///
/// Snapshots travel in queue events, conflict records, and the remote
/// contract. The identifier may be offline-form until a mapping is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Offline or real identifier
    pub id: String,
    /// Entity kind
    pub kind: EntityKind,
    /// Display name
    pub name: String,
    /// Natural key (scanned code), unique per kind when present
    pub code: Option<String>,
    /// Containing container/location reference
    pub parent_id: Option<String>,
    /// Category reference
    pub category_id: Option<String>,
    /// Stock count
    pub quantity: i64,
    /// Unit price in cents
    pub price_cents: Option<i64>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl EntitySnapshot {
    /// Read one scalar field as a JSON value
    #[must_use]
    pub fn field(&self, field: ScalarField) -> Value {
        fn opt_text(value: &Option<String>) -> Value {
            value.clone().map_or(Value::Null, Value::String)
        }
        match field {
            ScalarField::Name => Value::String(self.name.clone()),
            ScalarField::Code => opt_text(&self.code),
            ScalarField::ParentId => opt_text(&self.parent_id),
            ScalarField::CategoryId => opt_text(&self.category_id),
            ScalarField::Quantity => Value::from(self.quantity),
            ScalarField::PriceCents => self.price_cents.map_or(Value::Null, Value::from),
            ScalarField::Notes => opt_text(&self.notes),
        }
    }

    /// Write one scalar field from a JSON value
    pub fn set_field(&mut self, field: ScalarField, value: Value) -> Result<()> {
        fn as_opt_text(field: ScalarField, value: Value) -> Result<Option<String>> {
            match value {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s)),
                other => Err(Error::InvalidInput(format!(
                    "Field {field} expects text, got {other}"
                ))),
            }
        }
        fn as_int(field: ScalarField, value: &Value) -> Result<i64> {
            value
                .as_i64()
                .ok_or_else(|| Error::InvalidInput(format!("Field {field} expects an integer")))
        }
        match field {
            ScalarField::Name => match value {
                Value::String(s) => self.name = s,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "Field name expects text, got {other}"
                    )))
                }
            },
            ScalarField::Code => self.code = as_opt_text(field, value)?,
            ScalarField::ParentId => self.parent_id = as_opt_text(field, value)?,
            ScalarField::CategoryId => self.category_id = as_opt_text(field, value)?,
            ScalarField::Quantity => self.quantity = as_int(field, &value)?,
            ScalarField::PriceCents => {
                self.price_cents = match value {
                    Value::Null => None,
                    other => Some(as_int(field, &other)?),
                };
            }
            ScalarField::Notes => self.notes = as_opt_text(field, value)?,
        }
        Ok(())
    }

    /// Scalar fields whose values differ between two snapshots
    #[must_use]
    pub fn diverging_fields(a: &Self, b: &Self) -> Vec<ScalarField> {
        ScalarField::ALL
            .into_iter()
            .filter(|field| a.field(*field) != b.field(*field))
            .collect()
    }

    /// Validate the payload before it may be written or enqueued.
    ///
    /// Rejections here are `ValidationError`s: they surface synchronously to
    /// the caller and never produce a queue event.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("Entity name must not be empty".into()));
        }
        if let Some(code) = &self.code {
            if !is_valid_code(code) {
                return Err(Error::InvalidInput(format!("Invalid code syntax: {code}")));
            }
        }
        if self.quantity < 0 {
            return Err(Error::InvalidInput("Quantity must not be negative".into()));
        }
        if matches!(self.price_cents, Some(price) if price < 0) {
            return Err(Error::InvalidInput("Price must not be negative".into()));
        }
        if self.kind == EntityKind::Category && self.parent_id.is_some() {
            return Err(Error::InvalidInput("Categories cannot have a parent".into()));
        }
        Ok(())
    }
}

/// Check scanned-code syntax: alphanumeric start, then `[A-Za-z0-9_:-]`,
/// 3 to 64 characters total.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:-]{2,63}$").expect("Invalid regex");
    re.is_match(code)
}

/// Local copy of an entity held by the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// Current local state
    pub snapshot: EntitySnapshot,
    /// Sync state relative to the remote service
    pub sync_status: SyncStatus,
    /// True while the identifier is still offline-form
    pub is_offline: bool,
}
