use std::borrow::Cow;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use fleetops_core::{
    DomainResult, Entity, ItemGroupId, ItemId, MachineId, SiteId, UnitId, UserId, require_text,
};
use fleetops_listing::Listable;

/// Common contract for reference records served by the generic CRUD routes.
pub trait Reference:
    Entity + Listable + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection name, used for routes and log fields (e.g. "items").
    const COLLECTION: &'static str;

    /// Check required fields before the record is stored.
    fn validate(&self) -> DomainResult<()>;

    /// Replace the identifier (PUT uses the id from the path).
    fn set_id(&mut self, id: Self::Id);
}

fn opt(value: &Option<impl ToString>) -> Option<Cow<'static, str>> {
    value.as_ref().map(|v| Cow::Owned(v.to_string()))
}

/// A unit of measure (bags, litres, cubic metres, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    #[serde(default)]
    pub id: UnitId,
    pub name: String,
    pub symbol: String,
}

/// A category of stock items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGroup {
    #[serde(default)]
    pub id: ItemGroupId,
    pub name: String,
}

/// A stock item that can be requested, stored and purchased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: ItemId,
    pub name: String,
    pub code: String,
    pub group_id: Option<ItemGroupId>,
    pub unit_id: Option<UnitId>,
    #[serde(default)]
    pub description: String,
}

/// A project site, yard or central store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub id: SiteId,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub location: String,
}

/// A back-office user. Authentication lives elsewhere; this is the directory
/// entry shown in pickers and audit trails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: String,
    pub site_id: Option<SiteId>,
}

/// A machine or vehicle tracked in the logbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    #[serde(default)]
    pub id: MachineId,
    pub name: String,
    pub registration_no: String,
    #[serde(default)]
    pub kind: String,
    pub site_id: Option<SiteId>,
}

macro_rules! impl_entity {
    ($t:ty, $id:ty, $label:ident) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> &Self::Id {
                &self.id
            }

            fn label(&self) -> &str {
                &self.$label
            }
        }
    };
}

impl_entity!(Unit, UnitId, name);
impl_entity!(ItemGroup, ItemGroupId, name);
impl_entity!(Item, ItemId, name);
impl_entity!(Site, SiteId, name);
impl_entity!(User, UserId, name);
impl_entity!(Machine, MachineId, name);

impl Reference for Unit {
    const COLLECTION: &'static str = "units";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("symbol", &self.symbol)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Reference for ItemGroup {
    const COLLECTION: &'static str = "item-groups";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Reference for Item {
    const COLLECTION: &'static str = "items";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("code", &self.code)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Reference for Site {
    const COLLECTION: &'static str = "sites";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("code", &self.code)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Reference for User {
    const COLLECTION: &'static str = "users";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("role", &self.role)?;
        if !self.email.contains('@') {
            return Err(fleetops_core::DomainError::validation(
                "email must contain '@'",
            ));
        }
        Ok(())
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Reference for Machine {
    const COLLECTION: &'static str = "machines";

    fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("registration_no", &self.registration_no)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.id = id;
    }
}

impl Listable for Unit {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name), Cow::Borrowed(&self.symbol)]
    }

    fn field(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}

impl Listable for ItemGroup {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name)]
    }

    fn field(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}

impl Listable for Item {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.name),
            Cow::Borrowed(&self.code),
            Cow::Borrowed(&self.description),
        ]
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "group" => opt(&self.group_id),
            "unit" => opt(&self.unit_id),
            _ => None,
        }
    }
}

impl Listable for Site {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.name),
            Cow::Borrowed(&self.code),
            Cow::Borrowed(&self.location),
        ]
    }

    fn field(&self, _name: &str) -> Option<Cow<'_, str>> {
        None
    }
}

impl Listable for User {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(&self.name), Cow::Borrowed(&self.email)]
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "role" => Some(Cow::Borrowed(&self.role)),
            "site" => opt(&self.site_id),
            _ => None,
        }
    }
}

impl Listable for Machine {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(&self.name),
            Cow::Borrowed(&self.registration_no),
            Cow::Borrowed(&self.kind),
        ]
    }

    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "kind" => Some(Cow::Borrowed(&self.kind)),
            "site" => opt(&self.site_id),
            _ => None,
        }
    }
}
